//! Correlation data handed to completion callbacks.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, SystemTime};

/// Correlation identifiers bound to a client at construction time.
///
/// The same values are passed to every callback invocation of that client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Extra {
    /// Identifier of the originating request.
    pub request_id: Option<String>,
    /// Identifier of the remote service.
    pub service_id: Option<String>,
    /// Business unit issuing the call.
    pub business_unit: Option<String>,
    /// Free-form additional data.
    pub additional: Option<Value>,
}

impl Extra {
    /// Creates empty correlation data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request identifier.
    pub fn request_id(mut self, request_id: impl ToString) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    /// Sets the service identifier.
    pub fn service_id(mut self, service_id: impl ToString) -> Self {
        self.service_id = Some(service_id.to_string());
        self
    }

    /// Sets the business unit.
    pub fn business_unit(mut self, business_unit: impl Into<String>) -> Self {
        self.business_unit = Some(business_unit.into());
        self
    }

    /// Sets the additional data.
    pub fn additional(mut self, additional: impl Into<Value>) -> Self {
        self.additional = Some(additional.into());
        self
    }
}

/// What a completion callback learns about one attempt.
#[derive(Debug, Clone)]
pub struct Info {
    /// The client's correlation data.
    pub extra: Extra,
    /// Wall-clock time the attempt started.
    pub request_date: SystemTime,
    /// Time the attempt took.
    pub request_time: Duration,
    /// Attempt number, starting at 1.
    pub attempt: usize,
    /// Whether the attempt was classified as a success.
    pub is_successful: bool,
}

impl Info {
    /// The attempt duration in whole milliseconds.
    pub fn request_time_ms(&self) -> u128 {
        self.request_time.as_millis()
    }
}
