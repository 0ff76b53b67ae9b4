//! REST adapter built on `reqwest`.

use super::{wrong_variant, ByteStream, Transport, TransportKind, DEFAULT_REQUEST_TIMEOUT};
use crate::auth::{resolve_authorization, Security};
use crate::path::build_url;
use crate::request::{Request, ResponseType, RestRequest};
use crate::response::Response;
use crate::tls::SslConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use futures_util::{stream, StreamExt, TryStreamExt};
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Executes [`RestRequest`]s over HTTP.
///
/// The adapter owns one `reqwest` client, so TLS settings are fixed when it
/// is built and connections are pooled across calls.
#[derive(Debug, Clone)]
pub struct RestAdapter {
    http_client: reqwest::Client,
    base_url: Option<String>,
    security: Option<Security>,
    timeout: Duration,
}

/// A request with its URL, headers and timeout resolved.
struct PreparedCall {
    url: Url,
    headers: HeaderMap,
    timeout: Duration,
    raw_request: Option<String>,
}

impl RestAdapter {
    /// Creates an adapter.
    ///
    /// `base_url` may be left out when every request carries its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS material cannot be loaded or the HTTP
    /// client cannot be built.
    pub fn new(
        base_url: Option<String>,
        ssl: Option<&SslConfig>,
        security: Option<Security>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(ssl) = ssl {
            builder = ssl.apply(builder)?;
        }
        let http_client = builder.build().map_err(|e| {
            Error::ClientBadConfiguration(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            http_client,
            base_url,
            security,
            timeout: timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        })
    }

    fn prepare(&self, request: &RestRequest) -> Result<PreparedCall> {
        let base_url = request
            .base_url
            .as_deref()
            .or(self.base_url.as_deref())
            .ok_or_else(|| {
                Error::ClientBadConfiguration("Missing baseUrl and overwriteBaseUrl".to_string())
            })?;

        let mut url = Url::parse(&build_url(base_url, &request.path, &request.path_params)?)?;
        if !request.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query_params {
                pairs.append_pair(key, value);
            }
        }

        let mut headers = request.headers.clone();
        if let Some(authorization) =
            resolve_authorization(request.hooks.security.as_ref(), self.security.as_ref())
        {
            let value = HeaderValue::try_from(authorization).map_err(|e| {
                Error::ClientBadConfiguration(format!("Invalid authorization header: {}", e))
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        Ok(PreparedCall {
            url,
            headers,
            timeout: request.timeout.unwrap_or(self.timeout),
            raw_request: request.body.as_ref().map(Value::to_string),
        })
    }

    async fn send(
        &self,
        request: &RestRequest,
        call: &PreparedCall,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        tracing::debug!(
            method = %request.method,
            url = %call.url,
            "Executing REST request"
        );

        let mut builder = self
            .http_client
            .request(request.method.clone(), call.url.clone())
            .headers(call.headers.clone())
            .timeout(call.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder.send().await
    }
}

#[async_trait]
impl Transport for RestAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Rest
    }

    async fn request(&self, request: &Request) -> Result<Response<Value>> {
        let Request::Rest(rest) = request else {
            return Err(wrong_variant(TransportKind::Rest, request));
        };
        let call = self.prepare(rest)?;

        let response = match self.send(rest, &call).await {
            Ok(response) => response,
            Err(e) => return Ok(transport_failure(Value::Null, &e, None, rest.response_type, call)),
        };

        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().to_string();
        tracing::debug!(status = status.as_u16(), url = %final_url, "Received REST response");

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                let received = Some((status, headers));
                return Ok(transport_failure(Value::Null, &e, received, rest.response_type, call));
            }
        };

        let mut normalized = if rest.response_type == ResponseType::Binary {
            let mut normalized = Response::new(Value::Null, status, headers);
            normalized.bytes = Some(bytes);
            normalized
        } else {
            let raw_response = String::from_utf8_lossy(&bytes).into_owned();
            let mut normalized = Response::new(parse_body(&bytes, &raw_response), status, headers);
            normalized.raw_response = Some(raw_response);
            normalized
        };
        normalized.url = Some(final_url);
        normalized.raw_request = call.raw_request;
        Ok(normalized)
    }

    async fn stream(&self, request: &Request) -> Result<Response<ByteStream>> {
        let Request::Rest(rest) = request else {
            return Err(wrong_variant(TransportKind::Rest, request));
        };
        let call = self.prepare(rest)?;

        match self.send(rest, &call).await {
            Ok(response) => {
                let status = response.status();
                let headers = response.headers().clone();
                let final_url = response.url().to_string();
                let body: ByteStream = response.bytes_stream().map_err(Error::from).boxed();

                let mut normalized = Response::new(body, status, headers);
                normalized.url = Some(final_url);
                normalized.raw_request = call.raw_request;
                Ok(normalized)
            }
            Err(e) => {
                let empty: ByteStream = stream::empty().boxed();
                Ok(transport_failure(empty, &e, None, rest.response_type, call))
            }
        }
    }
}

/// Parses a buffered body as JSON, keeping non-JSON payloads as a string.
fn parse_body(bytes: &[u8], text: &str) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Builds the response for a call that never produced a readable reply.
///
/// `received` holds the status line and headers when the server answered
/// before the failure; they are kept as they are. Otherwise the status falls
/// back to the error's own, then 500.
fn transport_failure<T>(
    body: T,
    error: &reqwest::Error,
    received: Option<(StatusCode, HeaderMap)>,
    response_type: ResponseType,
    call: PreparedCall,
) -> Response<T> {
    tracing::debug!(error = %error, url = %call.url, "REST transport failed");

    let (status, headers) = received.unwrap_or_else(|| {
        let status = error.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, HeaderMap::new())
    });
    let mut response = Response::new(body, status, headers)
        .with_message(format_error_message(response_type, &error.to_string()));
    response.url = Some(call.url.to_string());
    response.raw_request = call.raw_request;
    response
}

/// Transport error text as reported to callers.
pub(crate) fn format_error_message(response_type: ResponseType, message: &str) -> String {
    if response_type == ResponseType::Binary {
        "Error downloading array buffer".to_string()
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::SoapRequest;

    fn adapter(base_url: Option<&str>) -> RestAdapter {
        RestAdapter::new(base_url.map(str::to_string), None, None, None).unwrap()
    }

    #[test]
    fn test_prepare_resolves_url_and_query() {
        let request = RestRequest::get("/v1/users/{id}/posts")
            .with_path_param("id", 7)
            .with_query_param("page", 2)
            .with_query_param("q", "a b");
        let call = adapter(Some("https://api.example.com/")).prepare(&request).unwrap();

        assert_eq!(
            call.url.as_str(),
            "https://api.example.com/v1/users/7/posts?page=2&q=a+b"
        );
        assert_eq!(call.timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_prepare_prefers_request_base_url_and_timeout() {
        let request = RestRequest::get("/x")
            .with_base_url("https://override.example.com")
            .with_timeout(Duration::from_secs(3));
        let call = adapter(Some("https://api.example.com")).prepare(&request).unwrap();

        assert_eq!(call.url.as_str(), "https://override.example.com/x");
        assert_eq!(call.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_prepare_without_base_url() {
        let result = adapter(None).prepare(&RestRequest::get("/x"));
        assert!(matches!(result, Err(Error::ClientBadConfiguration(_))));
    }

    #[test]
    fn test_prepare_injects_authorization() {
        let adapter = RestAdapter::new(
            Some("https://api.example.com".to_string()),
            None,
            Some(Security::bearer("client-token")),
            None,
        )
        .unwrap();

        let call = adapter.prepare(&RestRequest::get("/x")).unwrap();
        assert_eq!(call.headers[AUTHORIZATION], "Bearer client-token");

        let request = RestRequest::get("/x").with_hooks(
            crate::request::Hooks::new().security(Security::basic("user", "pass")),
        );
        let call = adapter.prepare(&request).unwrap();
        assert_eq!(call.headers[AUTHORIZATION], "Basic dXNlcjpwYXNz");
    }

    #[tokio::test]
    async fn test_rejects_soap_request() {
        let request: Request = SoapRequest::new("Add", serde_json::json!({})).into();
        let result = adapter(Some("https://api.example.com")).request(&request).await;
        assert!(matches!(result, Err(Error::ClientBadConfiguration(_))));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b"", ""), Value::Null);
        assert_eq!(parse_body(b"{\"a\":1}", "{\"a\":1}"), serde_json::json!({ "a": 1 }));
        assert_eq!(parse_body(b"plain", "plain"), Value::String("plain".to_string()));
    }

    #[test]
    fn test_binary_error_message() {
        assert_eq!(
            format_error_message(ResponseType::Binary, "Mock awesome error"),
            "Error downloading array buffer"
        );
        assert_eq!(
            format_error_message(ResponseType::Json, "Mock awesome error"),
            "Mock awesome error"
        );
    }
}
