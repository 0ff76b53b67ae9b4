//! The transport capability and its REST and SOAP adapters.
//!
//! An adapter executes exactly one call against one protocol and reports the
//! outcome as a [`Response`]. Timeouts, connection failures and error statuses
//! are part of that response, never an `Err`. Adapters only fail for
//! configuration problems discovered at call time.

pub mod rest;
pub mod soap;

use crate::request::Request;
use crate::response::Response;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

pub use rest::RestAdapter;
pub use soap::{
    ServiceClient, SoapAdapter, SoapCall, SoapClientOptions, SoapFault, SoapReply, SoapTransport,
};

/// Timeout applied when neither the client nor the request sets one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(120_000);

/// A raw response body delivered chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Which protocol a client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// HTTP/REST
    Rest,
    /// SOAP
    Soap,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Rest => f.write_str("rest"),
            TransportKind::Soap => f.write_str("soap"),
        }
    }
}

/// Executes one call and normalizes its outcome.
///
/// Implement this trait to plug a custom protocol, or a scripted fake, into
/// [`Client::with_transport`](crate::Client::with_transport).
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use duplex::{Request, Response, Transport, TransportKind};
/// use http::{HeaderMap, StatusCode};
/// use serde_json::{json, Value};
///
/// struct AlwaysOk;
///
/// #[async_trait]
/// impl Transport for AlwaysOk {
///     fn kind(&self) -> TransportKind {
///         TransportKind::Rest
///     }
///
///     async fn request(&self, _request: &Request) -> duplex::Result<Response<Value>> {
///         Ok(Response::new(json!({ "ok": true }), StatusCode::OK, HeaderMap::new()))
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// The protocol this transport speaks.
    fn kind(&self) -> TransportKind;

    /// Executes one call.
    ///
    /// # Errors
    ///
    /// Only configuration errors. Transport-level failures are reported in
    /// the returned response.
    async fn request(&self, request: &Request) -> Result<Response<Value>>;

    /// Executes one call and hands back the unread body stream.
    ///
    /// The default implementation reports [`Error::NotImplemented`].
    async fn stream(&self, request: &Request) -> Result<Response<ByteStream>> {
        let _ = request;
        Err(Error::NotImplemented(format!(
            "streaming responses over {} transport",
            self.kind()
        )))
    }
}

pub(crate) fn wrong_variant(expected: TransportKind, request: &Request) -> Error {
    Error::ClientBadConfiguration(format!(
        "{} transport cannot execute a {} request",
        expected,
        request.kind()
    ))
}
