//! Stamps out clients that share telemetry settings.

use crate::client::{Client, ClientBuilder};
use crate::request::{BoxError, Callback, Request};
use crate::response::Response;
use crate::telemetry::Info;
use crate::Result;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Binds a business unit and a completion callback into every client it builds.
///
/// Each generated client also carries the service and request identifiers it
/// was generated for, so one callback can attribute every attempt.
///
/// # Examples
///
/// ```
/// use duplex::{Client, ClientGenerator};
///
/// # fn example() -> Result<(), duplex::Error> {
/// let generator = ClientGenerator::new()
///     .business_unit("payments")
///     .callback(|_request, response, info| {
///         tracing::info!(
///             service = ?info.extra.service_id,
///             status = %response.status,
///             elapsed_ms = info.request_time_ms() as u64,
///             "call finished"
///         );
///         Ok(())
///     });
///
/// let client = generator.get(
///     Client::rest().base_url("https://ledger.internal"),
///     Some("ledger"),
///     Some("req-42"),
/// )?;
/// assert_eq!(client.extra().business_unit.as_deref(), Some("payments"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct ClientGenerator {
    business_unit: Option<String>,
    callback: Option<Callback>,
}

impl ClientGenerator {
    /// Creates a generator with no shared settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the business unit recorded in every generated client.
    pub fn business_unit(mut self, business_unit: impl Into<String>) -> Self {
        self.business_unit = Some(business_unit.into());
        self
    }

    /// Sets the completion callback installed in every generated client.
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Request, &Response<Value>, &Info) -> std::result::Result<(), BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Builds a client from `builder` with the shared settings applied.
    ///
    /// The generator's callback replaces one set on the builder. Additional
    /// data already present in the builder's extras is kept.
    ///
    /// # Errors
    ///
    /// Whatever [`ClientBuilder::build`] reports.
    pub fn get(
        &self,
        builder: ClientBuilder,
        service_id: Option<&str>,
        request_id: Option<&str>,
    ) -> Result<Client> {
        let mut builder = builder;
        {
            let extra = builder.extra_mut();
            extra.service_id = service_id.map(str::to_string);
            extra.request_id = request_id.map(str::to_string);
            extra.business_unit = self.business_unit.clone();
        }
        if let Some(callback) = &self.callback {
            builder = builder.shared_callback(Arc::clone(callback));
        }
        builder.build()
    }
}

impl fmt::Debug for ClientGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientGenerator")
            .field("business_unit", &self.business_unit)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
