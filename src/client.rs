//! The request orchestrator.
//!
//! A [`Client`] is bound to one [`Transport`] for its lifetime. Every call
//! goes through the same attempt loop: execute, parse the body, classify the
//! response, notify the completion callback, then either resolve, retry or
//! give up with a [`RequestFailure`].

use crate::request::{BoxError, Callback, Hooks, Request, ResponseType, RestRequest, Verdict};
use crate::response::Response;
use crate::retry::{RetryPolicy, RetryPredicate};
use crate::stream::JsonStream;
use crate::telemetry::{Extra, Info};
use crate::tls::SslConfig;
use crate::transport::{ByteStream, RestAdapter, SoapAdapter, SoapTransport, Transport, TransportKind};
use crate::{auth::Security, Error, RequestFailure, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// A REST or SOAP client with retry, classification and body parsing.
///
/// The client is cheap to clone and designed to be reused: clones share the
/// transport, so a SOAP client builds its service client once.
///
/// # Examples
///
/// ```no_run
/// use duplex::{Client, Hooks, RestRequest, RetryPolicy, Security};
/// use duplex::retry::StatusClass;
/// use serde::Deserialize;
/// use std::time::Duration;
///
/// #[derive(Deserialize)]
/// struct Page {
///     data: Vec<serde_json::Value>,
/// }
///
/// # async fn example() -> Result<(), duplex::Error> {
/// let client = Client::rest()
///     .base_url("https://api.example.com/v1")
///     .security(Security::bearer("my-token"))
///     .timeout(Duration::from_secs(30))
///     .retry(
///         RetryPolicy::new(3)
///             .on([StatusClass::ServerErrors])
///             .delay_in_seconds(0.5),
///     )
///     .build()?;
///
/// let page = client
///     .request::<Page>(RestRequest::get("/users").with_query_param("page", 2))
///     .await?;
/// println!("{} users after {} attempt(s)", page.body.data.len(), page.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    hooks: Hooks,
    extra: Extra,
}

/// Request-level hooks layered over client-level hooks.
struct Layered<'a> {
    request: &'a Hooks,
    client: &'a Hooks,
}

impl<'a> Layered<'a> {
    /// Reads a field from the request hooks, falling back to the client's.
    fn pick<T>(&self, field: impl Fn(&'a Hooks) -> Option<T>) -> Option<T> {
        field(self.request).or_else(|| field(self.client))
    }
}

impl Client {
    /// Starts configuring a REST client.
    pub fn rest() -> ClientBuilder {
        ClientBuilder::new(TransportSettings::Rest)
    }

    /// Starts configuring a SOAP client backed by `transport`.
    pub fn soap(transport: Arc<dyn SoapTransport>) -> ClientBuilder {
        ClientBuilder::new(TransportSettings::Soap(transport))
    }

    /// Starts configuring a client over a caller-provided transport.
    ///
    /// Base URL, WSDL, TLS, credentials and timeout settings only configure
    /// the built-in adapters and are ignored here.
    pub fn with_transport(transport: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder::new(TransportSettings::Custom(transport))
    }

    /// The protocol this client speaks.
    pub fn kind(&self) -> TransportKind {
        self.inner.transport.kind()
    }

    /// The correlation data passed to every callback.
    pub fn extra(&self) -> &Extra {
        &self.inner.extra
    }

    /// Executes a request and converts the parsed body to `T`.
    ///
    /// Use `serde_json::Value` as `T` to keep the body untyped.
    ///
    /// # Errors
    ///
    /// * Configuration errors, before any attempt or from the transport
    /// * [`Error::BodyParserFail`] if the body parser fails or the parsed
    ///   body does not convert to `T`; never retried
    /// * [`Error::Callback`] if the completion callback fails
    /// * [`Error::RequestFail`] once the retry policy gives up
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use duplex::{Client, SoapRequest};
    /// use serde_json::{json, Value};
    /// # use std::sync::Arc;
    ///
    /// # async fn example(transport: Arc<dyn duplex::SoapTransport>) -> Result<(), duplex::Error> {
    /// let client = Client::soap(transport)
    ///     .wsdl("http://calculator.internal/calculator.asmx?WSDL")
    ///     .build()?;
    ///
    /// let response = client
    ///     .request::<Value>(SoapRequest::new("Add", json!({ "intA": 1, "intB": 2 })))
    ///     .await?;
    /// assert_eq!(response.body["AddResult"], 3);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn request<T>(&self, request: impl Into<Request>) -> Result<Response<T>>
    where
        T: DeserializeOwned,
    {
        let request = request.into();
        self.execute(&request, |body| serde_json::from_value(body).map_err(BoxError::from))
            .await
    }

    /// Downloads a binary payload through the full attempt loop.
    ///
    /// The body parser and classifiers see a `null` body; the payload is only
    /// available in the returned response.
    ///
    /// # Errors
    ///
    /// Same as [`Client::request`], plus [`Error::NotImplemented`] on SOAP clients.
    pub async fn download(&self, request: RestRequest) -> Result<Response<Bytes>> {
        self.ensure_rest("binary downloads")?;
        let request = Request::Rest(request.with_response_type(ResponseType::Binary));

        let mut response = self.execute(&request, |_| Ok(())).await?;
        let payload = response.bytes.take().unwrap_or_default();
        Ok(response.map(|()| payload))
    }

    /// Sends a request and hands back the raw body stream.
    ///
    /// This is a single attempt: there is no retry, classification or callback,
    /// and an error status is returned as-is for the caller to inspect.
    ///
    /// # Errors
    ///
    /// Configuration errors only, including [`Error::NotImplemented`] on SOAP clients.
    pub async fn stream_bytes(&self, request: RestRequest) -> Result<Response<ByteStream>> {
        self.ensure_rest("streaming responses")?;
        let request = Request::Rest(request.with_response_type(ResponseType::Stream));

        let started = Instant::now();
        let mut response = self.inner.transport.stream(&request).await?;
        response.latency = started.elapsed();
        Ok(response)
    }

    /// Sends a request whose body is a sequence of JSON objects.
    ///
    /// Like [`Client::stream_bytes`] this is a single attempt. Objects are
    /// decoded as they arrive; see [`JsonStream`].
    ///
    /// # Errors
    ///
    /// Configuration errors only, including [`Error::NotImplemented`] on SOAP clients.
    pub async fn stream_request<T>(&self, request: RestRequest) -> Result<Response<JsonStream<T>>>
    where
        T: DeserializeOwned,
    {
        self.ensure_rest("streaming responses")?;
        let request = Request::Rest(request.with_response_type(ResponseType::JsonStream));

        let started = Instant::now();
        let mut response = self.inner.transport.stream(&request).await?;
        response.latency = started.elapsed();
        Ok(response.map(JsonStream::new))
    }

    fn ensure_rest(&self, operation: &str) -> Result<()> {
        match self.kind() {
            TransportKind::Rest => Ok(()),
            kind => Err(Error::NotImplemented(format!("{} over {} transport", operation, kind))),
        }
    }

    /// Runs the attempt loop and returns the parsed response.
    ///
    /// `convert` turns the final body of a successful attempt into the
    /// caller's type. It runs before the callback, so a body that does not
    /// convert is reported as an unsuccessful attempt.
    async fn execute<T, F>(&self, request: &Request, convert: F) -> Result<Response<T>>
    where
        F: Fn(Value) -> std::result::Result<T, BoxError>,
    {
        let max_attempts = self.inner.retry.max_attempts()?;
        let kind = self.kind();
        let hooks = Layered {
            request: request.hooks(),
            client: &self.inner.hooks,
        };
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            let request_date = SystemTime::now();
            let attempt_started = Instant::now();
            tracing::debug!(
                transport = %kind,
                attempt = attempt + 1,
                max_attempts = max_attempts,
                "Starting attempt"
            );

            let mut response = self.inner.transport.request(request).await?;
            let request_time = attempt_started.elapsed();

            let mut parsed = parse_body(&hooks, &response);
            let mut verdict = match &parsed {
                Some(Err(_)) => Verdict::Failure,
                _ => classify(&hooks, &response),
            };

            let mut converted = None;
            if verdict.is_success() {
                let body = match parsed.take() {
                    Some(Ok(body)) => body,
                    _ => response.body.clone(),
                };
                match convert(body) {
                    Ok(body) => converted = Some(body),
                    Err(cause) => {
                        parsed = Some(Err(cause));
                        verdict = Verdict::Failure;
                    }
                }
            }

            if let Some(callback) = hooks.pick(|h| h.callback.as_ref()) {
                let info = Info {
                    extra: self.inner.extra.clone(),
                    request_date,
                    request_time,
                    attempt: attempt + 1,
                    is_successful: verdict.is_success(),
                };
                callback(request, &response, &info).map_err(Error::Callback)?;
            }

            match parsed {
                Some(Err(cause)) => {
                    tracing::error!(
                        error = %cause,
                        status = response.status.as_u16(),
                        "Body parser failed"
                    );
                    return Err(Error::BodyParserFail(cause));
                }
                Some(Ok(body)) => response.body = body,
                None => {}
            }

            response.latency = started.elapsed();
            response.attempts = attempt + 1;

            if let Some(body) = converted {
                tracing::debug!(
                    status = response.status.as_u16(),
                    attempts = response.attempts,
                    latency_ms = response.latency.as_millis(),
                    "Request succeeded"
                );
                return Ok(response.map(|_| body));
            }

            tracing::warn!(
                transport = %kind,
                status = response.status.as_u16(),
                attempt = attempt + 1,
                "Attempt failed"
            );

            if attempt + 1 >= max_attempts || !self.should_retry(&hooks, request, &response) {
                let cause = failure_cause(verdict, &response);
                return Err(Error::RequestFail(Box::new(RequestFailure {
                    transport: kind,
                    request: request.clone(),
                    response,
                    cause,
                })));
            }

            attempt += 1;
            if let Some(delay) = self.inner.retry.backoff.delay_for_attempt(attempt) {
                tracing::info!(
                    delay_ms = delay.as_millis(),
                    attempt = attempt + 1,
                    "Retrying request after delay"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    fn should_retry(&self, hooks: &Layered<'_>, request: &Request, response: &Response<Value>) -> bool {
        match hooks.pick(|h| h.should_retry.as_ref()) {
            Some(predicate) => predicate.should_retry(request, response),
            None => self.inner.retry.should_retry(request, response),
        }
    }
}

/// Runs the body parser, unless the status gates it out.
///
/// `None` means parsing was skipped and the raw body stays.
fn parse_body(
    hooks: &Layered<'_>,
    response: &Response<Value>,
) -> Option<std::result::Result<Value, BoxError>> {
    let avoid = hooks.pick(|h| h.avoid_body_parser).unwrap_or(true);
    if avoid && !response.is_success_like() {
        return None;
    }

    let body = response.body.clone();
    Some(match hooks.pick(|h| h.body_parser.as_ref()) {
        Some(parser) => parser(body),
        None => Ok(body),
    })
}

fn classify(hooks: &Layered<'_>, response: &Response<Value>) -> Verdict {
    let avoid = hooks.pick(|h| h.avoid_is_successful).unwrap_or(true);
    if avoid && !response.is_success_like() {
        return match hooks.pick(|h| h.error_handler.as_ref()) {
            Some(handler) => match handler(response) {
                Ok(message) => Verdict::Message(message),
                Err(cause) => Verdict::Error(cause),
            },
            None => Verdict::Failure,
        };
    }

    match hooks.pick(|h| h.is_successful.as_ref()) {
        Some(classifier) => classifier(response),
        None => Verdict::from(matches!(response.status.as_u16(), 200 | 201)),
    }
}

/// Picks the cause reported once retries are exhausted.
fn failure_cause(verdict: Verdict, response: &Response<Value>) -> BoxError {
    match verdict {
        Verdict::Error(cause) => cause,
        Verdict::Message(message) => message.into(),
        Verdict::Success | Verdict::Failure => match &response.body {
            Value::Null => "unknown error".into(),
            body => serde_json::to_string(body)
                .unwrap_or_else(|_| "unknown error".to_string())
                .into(),
        },
    }
}

enum TransportSettings {
    Rest,
    Soap(Arc<dyn SoapTransport>),
    Custom(Arc<dyn Transport>),
}

/// Builder for configuring and creating a [`Client`].
///
/// Hooks set here apply to every request; the same hooks set on a request
/// win over them.
///
/// # Examples
///
/// ```no_run
/// use duplex::{Client, Extra, RetryPolicy, Verdict};
///
/// # fn example() -> Result<(), duplex::Error> {
/// let client = Client::rest()
///     .base_url("https://api.example.com")
///     .retry(RetryPolicy::new(2))
///     .is_successful(|response| Verdict::from(response.body["status"] == "ok"))
///     .callback(|_request, response, info| {
///         tracing::info!(status = %response.status, attempt = info.attempt, "call finished");
///         Ok(())
///     })
///     .extra(Extra::new().service_id("users"))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    transport: TransportSettings,
    base_url: Option<String>,
    wsdl: Option<String>,
    ssl: Option<SslConfig>,
    timeout: Option<Duration>,
    retry: RetryPolicy,
    hooks: Hooks,
    extra: Extra,
}

impl ClientBuilder {
    fn new(transport: TransportSettings) -> Self {
        Self {
            transport,
            base_url: None,
            wsdl: None,
            ssl: None,
            timeout: None,
            retry: RetryPolicy::default(),
            hooks: Hooks::default(),
            extra: Extra::default(),
        }
    }

    /// Sets the base URL of a REST client.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the service description of a SOAP client.
    pub fn wsdl(mut self, wsdl: impl Into<String>) -> Self {
        self.wsdl = Some(wsdl.into());
        self
    }

    /// Sets the TLS settings.
    pub fn ssl(mut self, ssl: SslConfig) -> Self {
        self.ssl = Some(ssl);
        self
    }

    /// Sets the default credentials.
    pub fn security(mut self, security: Security) -> Self {
        self.hooks.security = Some(security);
        self
    }

    /// Sets the default request timeout. Defaults to 120 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry policy. Defaults to no retries.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the retry policy's status lists with a custom predicate.
    pub fn retry_predicate(mut self, predicate: impl RetryPredicate + 'static) -> Self {
        self.hooks.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Sets the default success classifier.
    pub fn is_successful<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&Response<Value>) -> Verdict + Send + Sync + 'static,
    {
        self.hooks = self.hooks.is_successful(classifier);
        self
    }

    /// Sets the default body parser.
    pub fn body_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.hooks = self.hooks.body_parser(parser);
        self
    }

    /// Sets the default error handler.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Response<Value>) -> std::result::Result<String, BoxError> + Send + Sync + 'static,
    {
        self.hooks = self.hooks.error_handler(handler);
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
        self.hooks = self.hooks.callback(callback);
        self
    }

    /// Enables or disables skipping the body parser on non success-like statuses.
    pub fn avoid_body_parser(mut self, avoid: bool) -> Self {
        self.hooks.avoid_body_parser = Some(avoid);
        self
    }

    /// Enables or disables skipping the success classifier on non success-like statuses.
    pub fn avoid_is_successful(mut self, avoid: bool) -> Self {
        self.hooks.avoid_is_successful = Some(avoid);
        self
    }

    /// Replaces all client-level hooks at once.
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sets the correlation data passed to every callback.
    pub fn extra(mut self, extra: Extra) -> Self {
        self.extra = extra;
        self
    }

    pub(crate) fn extra_mut(&mut self) -> &mut Extra {
        &mut self.extra
    }

    pub(crate) fn shared_callback(mut self, callback: Callback) -> Self {
        self.hooks.callback = Some(callback);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientBadConfiguration`] if a REST client is given a
    /// WSDL, a SOAP client a base URL, or the TLS settings cannot be applied.
    pub fn build(self) -> Result<Client> {
        let security = self.hooks.security.clone();
        let transport: Arc<dyn Transport> = match self.transport {
            TransportSettings::Rest => {
                if self.wsdl.is_some() {
                    return Err(Error::ClientBadConfiguration(
                        "wsdl is not used by rest clients".to_string(),
                    ));
                }
                Arc::new(RestAdapter::new(
                    self.base_url,
                    self.ssl.as_ref(),
                    security,
                    self.timeout,
                )?)
            }
            TransportSettings::Soap(soap) => {
                if self.base_url.is_some() {
                    return Err(Error::ClientBadConfiguration(
                        "baseUrl is not used by soap clients".to_string(),
                    ));
                }
                Arc::new(SoapAdapter::new(
                    soap,
                    self.wsdl,
                    self.ssl,
                    security,
                    self.timeout,
                ))
            }
            TransportSettings::Custom(transport) => transport,
        };

        tracing::debug!(
            transport = %transport.kind(),
            max_retry = self.retry.max_retry,
            "Built client"
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                transport,
                retry: self.retry,
                hooks: self.hooks,
                extra: self.extra,
            }),
        })
    }
}
