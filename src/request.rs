//! Logical request types and the per-call hooks that travel with them.
//!
//! A [`Request`] is either a [`RestRequest`] or a [`SoapRequest`]. Both carry
//! a [`Hooks`] value whose fields, when set, win over the client-level hooks
//! of the same name.

use crate::auth::Security;
use crate::response::Response;
use crate::retry::RetryPredicate;
use crate::telemetry::Info;
use crate::transport::TransportKind;
use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Boxed error returned by caller-supplied hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Transforms a raw response body before it is handed back to the caller.
pub type BodyParser = Arc<dyn Fn(Value) -> std::result::Result<Value, BoxError> + Send + Sync>;

/// Decides whether a response counts as a success.
pub type SuccessClassifier = Arc<dyn Fn(&Response<Value>) -> Verdict + Send + Sync>;

/// Describes a failed response when the success classifier is skipped.
///
/// `Ok(message)` becomes the failure message, `Err(error)` the failure cause.
pub type ErrorHandler =
    Arc<dyn Fn(&Response<Value>) -> std::result::Result<String, BoxError> + Send + Sync>;

/// Observes every attempt, successful or not.
pub type Callback =
    Arc<dyn Fn(&Request, &Response<Value>, &Info) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Outcome of classifying one response.
///
/// # Examples
///
/// ```
/// use duplex::Verdict;
///
/// assert!(Verdict::from(true).is_success());
/// assert!(matches!(Verdict::from("quota exceeded"), Verdict::Message(_)));
/// ```
#[derive(Debug)]
pub enum Verdict {
    /// The response is a success.
    Success,
    /// The response is a failure with no further explanation.
    Failure,
    /// The response is a failure described by this message.
    Message(String),
    /// The response is a failure caused by this error.
    Error(BoxError),
}

impl Verdict {
    /// Returns `true` only for [`Verdict::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success)
    }
}

impl From<bool> for Verdict {
    fn from(success: bool) -> Self {
        if success {
            Verdict::Success
        } else {
            Verdict::Failure
        }
    }
}

impl From<String> for Verdict {
    fn from(message: String) -> Self {
        Verdict::Message(message)
    }
}

impl From<&str> for Verdict {
    fn from(message: &str) -> Self {
        Verdict::Message(message.to_string())
    }
}

/// Overridable behaviour shared by client configuration and individual requests.
///
/// Every field is optional. The orchestrator reads the request's value first,
/// then the client's, then falls back to its built-in default.
///
/// # Examples
///
/// ```
/// use duplex::{Hooks, Verdict};
///
/// let hooks = Hooks::new()
///     .is_successful(|response| Verdict::from(response.body["ok"] == true))
///     .avoid_body_parser(false);
/// assert_eq!(hooks.avoid_body_parser, Some(false));
/// ```
#[derive(Clone, Default)]
pub struct Hooks {
    /// Success classifier. Default: status is 200 or 201.
    pub is_successful: Option<SuccessClassifier>,
    /// Retry predicate. Default: the client's status-class allow and deny lists.
    pub should_retry: Option<Arc<dyn RetryPredicate>>,
    /// Completion callback invoked once per attempt.
    pub callback: Option<Callback>,
    /// Body parser. Default: identity.
    pub body_parser: Option<BodyParser>,
    /// Skip the body parser on non success-like statuses. Default: `true`.
    pub avoid_body_parser: Option<bool>,
    /// Skip the success classifier on non success-like statuses. Default: `true`.
    pub avoid_is_successful: Option<bool>,
    /// Error handler used when the success classifier is skipped.
    pub error_handler: Option<ErrorHandler>,
    /// Credentials turned into an `Authorization` header.
    pub security: Option<Security>,
}

impl Hooks {
    /// Creates an empty set of hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the success classifier.
    pub fn is_successful<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&Response<Value>) -> Verdict + Send + Sync + 'static,
    {
        self.is_successful = Some(Arc::new(classifier));
        self
    }

    /// Sets the retry predicate.
    pub fn should_retry(mut self, predicate: impl RetryPredicate + 'static) -> Self {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Sets the completion callback.
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

    /// Sets the body parser.
    pub fn body_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.body_parser = Some(Arc::new(parser));
        self
    }

    /// Enables or disables skipping the body parser on non success-like statuses.
    pub fn avoid_body_parser(mut self, avoid: bool) -> Self {
        self.avoid_body_parser = Some(avoid);
        self
    }

    /// Enables or disables skipping the success classifier on non success-like statuses.
    pub fn avoid_is_successful(mut self, avoid: bool) -> Self {
        self.avoid_is_successful = Some(avoid);
        self
    }

    /// Sets the error handler.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Response<Value>) -> std::result::Result<String, BoxError> + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Sets the credentials.
    pub fn security(mut self, security: Security) -> Self {
        self.security = Some(security);
        self
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("is_successful", &self.is_successful.is_some())
            .field("should_retry", &self.should_retry.is_some())
            .field("callback", &self.callback.is_some())
            .field("body_parser", &self.body_parser.is_some())
            .field("avoid_body_parser", &self.avoid_body_parser)
            .field("avoid_is_successful", &self.avoid_is_successful)
            .field("error_handler", &self.error_handler.is_some())
            .field("security", &self.security.as_ref().map(Security::scheme))
            .finish()
    }
}

/// How the REST transport should read the response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseType {
    /// Buffer the body and parse it as JSON, falling back to a JSON string.
    #[default]
    Json,
    /// Buffer the body as raw bytes, exposed through [`Response::bytes`].
    Binary,
    /// Hand the raw byte stream to the caller.
    Stream,
    /// Split the byte stream into consecutive JSON objects.
    JsonStream,
}

/// A call against a REST endpoint.
///
/// # Examples
///
/// ```
/// use duplex::RestRequest;
/// use http::Method;
///
/// let request = RestRequest::new(Method::GET, "/users/{id}/posts")
///     .with_path_param("id", 42)
///     .with_query_param("page", "2");
/// assert_eq!(request.path_params["id"], "42");
/// ```
#[derive(Debug, Clone)]
pub struct RestRequest {
    /// Path relative to the base URL; may contain `{name}` placeholders.
    pub path: String,
    /// Replaces the client's base URL for this call.
    pub base_url: Option<String>,
    /// The HTTP method.
    pub method: Method,
    /// Values substituted into `{name}` placeholders.
    pub path_params: HashMap<String, String>,
    /// Query parameters, in insertion order.
    pub query_params: Vec<(String, String)>,
    /// JSON request body.
    pub body: Option<Value>,
    /// How to read the response body.
    pub response_type: ResponseType,
    /// Additional request headers.
    pub headers: HeaderMap,
    /// Replaces the client's request timeout for this call.
    pub timeout: Option<Duration>,
    /// Per-request hook overrides.
    pub hooks: Hooks,
}

impl RestRequest {
    /// Creates a request with the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            base_url: None,
            method,
            path_params: HashMap::new(),
            query_params: Vec::new(),
            body: None,
            response_type: ResponseType::default(),
            headers: HeaderMap::new(),
            timeout: None,
            hooks: Hooks::default(),
        }
    }

    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Creates a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Overrides the client's base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Adds a path parameter.
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path_params.insert(name.into(), value.to_string());
        self
    }

    /// Adds a query parameter.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query_params.push((key.into(), value.to_string()));
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `body` to JSON and sets it as the request body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if `body` cannot be represented as JSON.
    pub fn with_json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        let value =
            serde_json::to_value(body).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Sets how the response body should be read.
    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the per-request hooks.
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }
}

/// A call to one operation of a SOAP service.
///
/// # Examples
///
/// ```
/// use duplex::SoapRequest;
/// use serde_json::json;
///
/// let request = SoapRequest::new("Add", json!({ "intA": 1, "intB": 2 }))
///     .with_endpoint("http://calculator.internal/calculator.asmx");
/// assert_eq!(request.method, "Add");
/// ```
#[derive(Debug, Clone)]
pub struct SoapRequest {
    /// The operation name.
    pub method: String,
    /// The operation input; must be a JSON object or array.
    pub body: Value,
    /// Builds a fresh service client from this WSDL instead of the cached one.
    pub wsdl: Option<String>,
    /// Replaces the service endpoint for this call.
    pub endpoint: Option<String>,
    /// Additional options passed through to the SOAP transport.
    pub options: Map<String, Value>,
    /// SOAP header entries, in insertion order.
    pub soap_headers: Vec<(String, Value)>,
    /// Additional HTTP headers.
    pub headers: HeaderMap,
    /// Replaces the client's request timeout for this call.
    pub timeout: Option<Duration>,
    /// Per-request hook overrides.
    pub hooks: Hooks,
}

impl SoapRequest {
    /// Creates a call to `method` with the given input.
    pub fn new(method: impl Into<String>, body: impl Into<Value>) -> Self {
        Self {
            method: method.into(),
            body: body.into(),
            wsdl: None,
            endpoint: None,
            options: Map::new(),
            soap_headers: Vec::new(),
            headers: HeaderMap::new(),
            timeout: None,
            hooks: Hooks::default(),
        }
    }

    /// Uses a different WSDL for this call.
    pub fn with_wsdl(mut self, wsdl: impl Into<String>) -> Self {
        self.wsdl = Some(wsdl.into());
        self
    }

    /// Sends this call to a different endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Adds a transport option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Adds a SOAP header entry.
    pub fn with_soap_header(mut self, name: impl Into<String>, entry: impl Into<Value>) -> Self {
        self.soap_headers.push((name.into(), entry.into()));
        self
    }

    /// Adds an HTTP header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the per-request hooks.
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }
}

/// A logical request for either transport.
#[derive(Debug, Clone)]
pub enum Request {
    /// A REST call.
    Rest(RestRequest),
    /// A SOAP call.
    Soap(SoapRequest),
}

impl Request {
    /// The transport this request is meant for.
    pub fn kind(&self) -> TransportKind {
        match self {
            Request::Rest(_) => TransportKind::Rest,
            Request::Soap(_) => TransportKind::Soap,
        }
    }

    /// The per-request hook overrides.
    pub fn hooks(&self) -> &Hooks {
        match self {
            Request::Rest(request) => &request.hooks,
            Request::Soap(request) => &request.hooks,
        }
    }

    /// The per-request timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Request::Rest(request) => request.timeout,
            Request::Soap(request) => request.timeout,
        }
    }

    /// Returns the REST request, if this is one.
    pub fn as_rest(&self) -> Option<&RestRequest> {
        match self {
            Request::Rest(request) => Some(request),
            Request::Soap(_) => None,
        }
    }

    /// Returns the SOAP request, if this is one.
    pub fn as_soap(&self) -> Option<&SoapRequest> {
        match self {
            Request::Soap(request) => Some(request),
            Request::Rest(_) => None,
        }
    }
}

impl From<RestRequest> for Request {
    fn from(request: RestRequest) -> Self {
        Request::Rest(request)
    }
}

impl From<SoapRequest> for Request {
    fn from(request: SoapRequest) -> Self {
        Request::Soap(request)
    }
}

pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::try_from(name)
        .map_err(|e| Error::ClientBadConfiguration(format!("Invalid header name: {}", e)))?;
    let value = HeaderValue::try_from(value)
        .map_err(|e| Error::ClientBadConfiguration(format!("Invalid header value: {}", e)))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_hooks_follow_variant() {
        let rest: Request = RestRequest::get("/a")
            .with_hooks(Hooks::new().avoid_body_parser(false))
            .into();
        let soap: Request = SoapRequest::new("Add", serde_json::json!({}))
            .with_hooks(Hooks::new().avoid_is_successful(false))
            .into();

        assert_eq!(rest.kind(), TransportKind::Rest);
        assert_eq!(rest.hooks().avoid_body_parser, Some(false));
        assert_eq!(soap.kind(), TransportKind::Soap);
        assert_eq!(soap.hooks().avoid_is_successful, Some(false));
        assert!(rest.as_soap().is_none());
    }

    #[test]
    fn test_invalid_header_is_configuration_error() {
        let result = RestRequest::get("/a").with_header("bad header", "x");
        assert!(matches!(result, Err(Error::ClientBadConfiguration(_))));
    }

    #[test]
    fn test_query_params_keep_insertion_order() {
        let request = RestRequest::get("/a")
            .with_query_param("b", 1)
            .with_query_param("a", 2);
        assert_eq!(
            request.query_params,
            vec![("b".to_string(), "1".to_string()), ("a".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_hooks_debug_hides_closures() {
        let hooks = Hooks::new().body_parser(|body| Ok(body));
        let debug = format!("{:?}", hooks);
        assert!(debug.contains("body_parser: true"));
        assert!(debug.contains("callback: false"));
    }
}
