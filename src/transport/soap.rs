//! SOAP adapter over a pluggable SOAP transport.
//!
//! Building envelopes and reading service descriptions is the job of a
//! [`SoapTransport`] implementation. The adapter validates the call, caches
//! the service client built from the configured WSDL, injects credentials,
//! and maps replies and faults into a [`Response`].

use super::{wrong_variant, Transport, TransportKind, DEFAULT_REQUEST_TIMEOUT};
use crate::auth::{resolve_authorization, Security};
use crate::request::{Request, SoapRequest};
use crate::response::Response;
use crate::tls::SslConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Options used when building a service client from a WSDL.
#[derive(Debug, Clone, Default)]
pub struct SoapClientOptions {
    /// Headers sent when fetching the WSDL itself.
    pub wsdl_headers: HeaderMap,
    /// TLS settings for the service.
    pub ssl: Option<SslConfig>,
}

/// One operation invocation.
///
/// Everything that varies per call travels here, so a cached service client
/// is never mutated by concurrent requests.
#[derive(Debug, Clone)]
pub struct SoapCall {
    /// The operation name.
    pub operation: String,
    /// The operation input.
    pub body: Value,
    /// Endpoint to use instead of the one declared by the WSDL.
    pub endpoint: Option<String>,
    /// HTTP headers, credentials included.
    pub http_headers: HeaderMap,
    /// SOAP header entries, in order.
    pub soap_headers: Vec<(String, Value)>,
    /// Additional transport options.
    pub options: Map<String, Value>,
    /// Time allowed for the call.
    pub timeout: Duration,
}

/// A successful operation result.
#[derive(Debug, Clone)]
pub struct SoapReply {
    /// The decoded operation output.
    pub result: Value,
    /// HTTP response headers.
    pub headers: HeaderMap,
    /// The envelope that was sent.
    pub raw_request: Option<String>,
    /// The envelope that was received.
    pub raw_response: Option<String>,
}

impl SoapReply {
    /// Creates a reply with only a result.
    pub fn new(result: Value) -> Self {
        Self {
            result,
            headers: HeaderMap::new(),
            raw_request: None,
            raw_response: None,
        }
    }
}

/// A failed operation: a SOAP fault or a failure of the underlying HTTP call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct SoapFault {
    /// Human readable description.
    pub message: String,
    /// HTTP status of the underlying call, when there was one.
    pub status: Option<u16>,
    /// Decoded fault details.
    pub body: Value,
    /// HTTP response headers.
    pub headers: HeaderMap,
    /// The envelope that was sent.
    pub raw_request: Option<String>,
    /// The payload that was received.
    pub raw_response: Option<String>,
}

impl SoapFault {
    /// Creates a fault with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            body: Value::Null,
            headers: HeaderMap::new(),
            raw_request: None,
            raw_response: None,
        }
    }

    /// Sets the HTTP status of the underlying call.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the decoded fault details.
    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = body.into();
        self
    }
}

/// Builds service clients from service descriptions.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    /// Loads `wsdl` and returns a client for the service it describes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientBadConfiguration`] if the description cannot
    /// be loaded.
    async fn build_client(
        &self,
        wsdl: &str,
        options: &SoapClientOptions,
    ) -> Result<Arc<dyn ServiceClient>>;
}

/// A client for one SOAP service.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Returns `true` if the service declares this operation.
    fn has_operation(&self, operation: &str) -> bool;

    /// Invokes an operation.
    async fn invoke(&self, call: SoapCall) -> std::result::Result<SoapReply, SoapFault>;
}

/// Executes [`SoapRequest`]s through a [`SoapTransport`].
///
/// The service client built from the configured WSDL is created on first use
/// and shared by every later call. Requests that carry their own WSDL get a
/// fresh client that is not cached.
pub struct SoapAdapter {
    transport: Arc<dyn SoapTransport>,
    wsdl: Option<String>,
    ssl: Option<SslConfig>,
    security: Option<Security>,
    timeout: Duration,
    service_client: OnceCell<Arc<dyn ServiceClient>>,
}

impl SoapAdapter {
    /// Creates an adapter.
    ///
    /// `wsdl` may be left out when every request carries its own.
    pub fn new(
        transport: Arc<dyn SoapTransport>,
        wsdl: Option<String>,
        ssl: Option<SslConfig>,
        security: Option<Security>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            wsdl,
            ssl,
            security,
            timeout: timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            service_client: OnceCell::new(),
        }
    }

    async fn service_client(&self, request: &SoapRequest) -> Result<Arc<dyn ServiceClient>> {
        if let Some(wsdl) = &request.wsdl {
            let options = SoapClientOptions {
                wsdl_headers: request.headers.clone(),
                ssl: self.ssl.clone(),
            };
            return self.transport.build_client(wsdl, &options).await;
        }

        let wsdl = self.wsdl.as_deref().ok_or_else(|| {
            Error::ClientBadConfiguration("Missing wsdl and overwriteWsdl".to_string())
        })?;
        let client = self
            .service_client
            .get_or_try_init(|| async {
                tracing::debug!(wsdl = wsdl, "Building SOAP service client");
                let options = SoapClientOptions {
                    wsdl_headers: HeaderMap::new(),
                    ssl: self.ssl.clone(),
                };
                self.transport.build_client(wsdl, &options).await
            })
            .await?;
        Ok(Arc::clone(client))
    }
}

#[async_trait]
impl Transport for SoapAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Soap
    }

    async fn request(&self, request: &Request) -> Result<Response<Value>> {
        let Request::Soap(soap) = request else {
            return Err(wrong_variant(TransportKind::Soap, request));
        };

        let client = self.service_client(soap).await?;
        if soap.method.trim().is_empty() {
            return Err(Error::MissingMandatoryParameter("method".to_string()));
        }
        if !(soap.body.is_object() || soap.body.is_array()) {
            return Err(Error::MissingMandatoryParameter("body".to_string()));
        }
        if !client.has_operation(&soap.method) {
            return Err(Error::MissingSoapMethod(soap.method.clone()));
        }

        let mut http_headers = soap.headers.clone();
        if let Some(authorization) =
            resolve_authorization(soap.hooks.security.as_ref(), self.security.as_ref())
        {
            let value = HeaderValue::try_from(authorization).map_err(|e| {
                Error::ClientBadConfiguration(format!("Invalid authorization header: {}", e))
            })?;
            http_headers.insert(AUTHORIZATION, value);
        }

        let call = SoapCall {
            operation: soap.method.clone(),
            body: soap.body.clone(),
            endpoint: soap.endpoint.clone(),
            http_headers,
            soap_headers: soap.soap_headers.clone(),
            options: soap.options.clone(),
            timeout: soap.timeout.unwrap_or(self.timeout),
        };
        tracing::debug!(
            operation = %call.operation,
            endpoint = ?call.endpoint,
            "Invoking SOAP operation"
        );

        let response = match client.invoke(call).await {
            Ok(reply) => {
                let mut response = Response::new(reply.result, StatusCode::OK, reply.headers);
                response.raw_request = reply.raw_request;
                response.raw_response = reply.raw_response;
                response
            }
            Err(fault) => {
                tracing::debug!(error = %fault, status = ?fault.status, "SOAP operation failed");
                let status = fault
                    .status
                    .and_then(|status| StatusCode::from_u16(status).ok())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let mut response =
                    Response::new(fault.body, status, fault.headers).with_message(fault.message);
                response.raw_request = fault.raw_request;
                response.raw_response = fault.raw_response;
                response
            }
        };
        Ok(Response {
            url: soap.endpoint.clone(),
            ..response
        })
    }
}
