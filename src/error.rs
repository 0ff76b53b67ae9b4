//! Error types for orchestrated REST and SOAP calls.
//!
//! Failures fall into three families. Configuration errors point at the call
//! site and are never retried. [`Error::BodyParserFail`] points at a body
//! parser and is never retried either. [`Error::RequestFail`] is what is left
//! once the retry policy has given up on a transport-level failure.

use crate::request::{BoxError, Request};
use crate::response::Response;
use crate::transport::TransportKind;
use http::StatusCode;
use serde_json::Value;

/// The main error type for client calls.
///
/// # Examples
///
/// ```no_run
/// use duplex::{Client, Error, RestRequest};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::rest().base_url("https://api.example.com").build()?;
///
/// match client.request::<serde_json::Value>(RestRequest::get("/users")).await {
///     Ok(response) => println!("Success: {:?}", response.body),
///     Err(Error::RequestFail(failure)) => {
///         eprintln!("Gave up with status {}: {}", failure.response.status, failure.cause);
///     }
///     Err(Error::BodyParserFail(cause)) => eprintln!("Fix the parser: {}", cause),
///     Err(e) if e.is_configuration_error() => eprintln!("Fix the call site: {}", e),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The client is missing a base URL or WSDL, or was handed a request
    /// for the wrong transport.
    #[error("Client bad configuration: {0}")]
    ClientBadConfiguration(String),

    /// A `{name}` placeholder in the request path had no matching path parameter.
    #[error("Missing path parameters - {param}")]
    MissingPathParameter {
        /// The joined URL that still contained the placeholder
        url: String,
        /// The placeholder name
        param: String,
    },

    /// A mandatory request field was missing or had the wrong shape.
    #[error("Missing or invalid mandatory parameter - {0}")]
    MissingMandatoryParameter(String),

    /// The SOAP service description has no operation with this name.
    #[error("Missing method \"{0}\" inside of WSDL")]
    MissingSoapMethod(String),

    /// The retry policy asked for a negative number of retries.
    #[error("Invalid request max retry {0}")]
    InvalidMaxRetry(i32),

    /// The bound transport does not support the requested operation.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// The body parser rejected the response body.
    ///
    /// Always fatal: the request is not retried.
    #[error("Body parser fail: {0}")]
    BodyParserFail(#[source] BoxError),

    /// The request still failed after the retry policy was exhausted.
    #[error("{0}")]
    RequestFail(Box<RequestFailure>),

    /// A completion callback returned an error.
    #[error("Completion callback failed: {0}")]
    Callback(#[source] BoxError),

    /// The resolved request URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The request body could not be serialized to JSON.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// Reading a streamed response body failed.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Everything known about a request that failed for good.
#[derive(thiserror::Error, Debug)]
#[error("Request Fail - {} - {cause}", .response.status.as_u16())]
pub struct RequestFailure {
    /// The transport the client is bound to.
    pub transport: TransportKind,
    /// The logical request as the caller issued it.
    pub request: Request,
    /// The last response observed, body parsed when the parser ran.
    pub response: Response<Value>,
    /// Why the last attempt counted as a failure.
    #[source]
    pub cause: BoxError,
}

impl Error {
    /// Returns `true` for errors caused by how the client or request was configured.
    ///
    /// These are raised before any retry decision is made and retrying them
    /// cannot help.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::ClientBadConfiguration(_)
                | Error::MissingPathParameter { .. }
                | Error::MissingMandatoryParameter(_)
                | Error::MissingSoapMethod(_)
                | Error::InvalidMaxRetry(_)
                | Error::NotImplemented(_)
                | Error::InvalidUrl(_)
                | Error::SerializationFailed(_)
        )
    }

    /// Returns `true` if retrying the whole call later might succeed.
    ///
    /// Only [`Error::RequestFail`] and stream read errors qualify.
    ///
    /// # Examples
    ///
    /// ```
    /// use duplex::Error;
    ///
    /// assert!(!Error::InvalidMaxRetry(-1).is_retryable());
    /// assert!(!Error::BodyParserFail("bad json".into()).is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RequestFail(_) | Error::Network(_))
    }

    /// Returns the status code of the last response, if one was observed.
    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(|response| response.status)
    }

    /// Returns the last response observed before giving up.
    pub fn response(&self) -> Option<&Response<Value>> {
        match self {
            Error::RequestFail(failure) => Some(&failure.response),
            _ => None,
        }
    }
}

/// A specialized `Result` type for client calls.
pub type Result<T> = std::result::Result<T, Error>;
