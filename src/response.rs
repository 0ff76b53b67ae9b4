//! Normalized response shared by every transport.
//!
//! Transports fill in the status, headers and body of a [`Response`]. The
//! client adds the latency and attempt count once the call resolves.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A response in the same shape regardless of the transport that produced it.
///
/// `status` is always populated. A transport that failed before receiving a
/// real response reports `500 Internal Server Error` and puts the transport
/// error text in `message`.
///
/// # Type Parameters
///
/// * `T` - The type of the response body
///
/// # Examples
///
/// ```no_run
/// use duplex::{Client, RestRequest};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), duplex::Error> {
/// let client = Client::rest().base_url("https://api.example.com").build()?;
///
/// let response = client.request::<User>(RestRequest::get("/users/123")).await?;
///
/// println!("User: {}", response.body.name);
/// println!("Request took {:?}", response.latency);
/// println!("Status: {}", response.status);
/// println!("Attempts: {}", response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The response body.
    pub body: T,

    /// The status code. SOAP calls that succeed report `200 OK`.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// Diagnostic message from the transport, set when the call itself failed.
    pub message: Option<String>,

    /// The URL the request was finally sent to, if the transport knows it.
    pub url: Option<String>,

    /// Snapshot of the request payload. Diagnostic only.
    pub raw_request: Option<String>,

    /// Snapshot of the response payload. Diagnostic only.
    pub raw_response: Option<String>,

    /// The raw payload of a binary download.
    pub bytes: Option<Bytes>,

    /// Time from the start of the first attempt until the call resolved.
    pub latency: Duration,

    /// The number of attempts made to complete this call.
    pub attempts: usize,
}

impl<T> Response<T> {
    /// Creates a response with the given body, status and headers.
    pub fn new(body: T, status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            body,
            status,
            headers,
            message: None,
            url: None,
            raw_request: None,
            raw_response: None,
            bytes: None,
            latency: Duration::ZERO,
            attempts: 1,
        }
    }

    /// Sets the diagnostic message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Maps the body to a different type, keeping the metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// # use duplex::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// let response = Response::new(42, StatusCode::OK, HeaderMap::new());
    ///
    /// let string_response = response.map(|n| n.to_string());
    /// assert_eq!(string_response.body, "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            body: f(self.body),
            status: self.status,
            headers: self.headers,
            message: self.message,
            url: self.url,
            raw_request: self.raw_request,
            raw_response: self.raw_response,
            bytes: self.bytes,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Like [`Response::map`], for fallible conversions.
    pub fn try_map<U, E, F>(self, f: F) -> Result<Response<U>, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        let Response {
            body,
            status,
            headers,
            message,
            url,
            raw_request,
            raw_response,
            bytes,
            latency,
            attempts,
        } = self;
        Ok(Response {
            body: f(body)?,
            status,
            headers,
            message,
            url,
            raw_request,
            raw_response,
            bytes,
            latency,
            attempts,
        })
    }

    /// Returns `true` for 200, 201 and 202.
    ///
    /// Only success-like responses reach the body parser and the success
    /// classifier by default.
    pub fn is_success_like(&self) -> bool {
        is_success_like(self.status)
    }

    /// Returns `true` if the call took more than one attempt.
    ///
    /// # Examples
    ///
    /// ```
    /// # use duplex::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// let mut response = Response::new((), StatusCode::OK, HeaderMap::new());
    /// response.attempts = 3;
    ///
    /// assert!(response.was_retried());
    /// ```
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name.
    ///
    /// # Examples
    ///
    /// ```
    /// # use duplex::Response;
    /// # use http::{HeaderMap, HeaderValue, StatusCode};
    /// let mut headers = HeaderMap::new();
    /// headers.insert("content-type", HeaderValue::from_static("application/json"));
    ///
    /// let response = Response::new((), StatusCode::OK, headers);
    ///
    /// assert_eq!(response.header("content-type").unwrap(), "application/json");
    /// ```
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.body
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.body
    }
}

/// Returns `true` for the statuses that gate default parsing and classification.
pub fn is_success_like(status: StatusCode) -> bool {
    matches!(status.as_u16(), 200..=202)
}
