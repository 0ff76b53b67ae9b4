//! # Duplex - one request client over REST and SOAP
//!
//! Duplex puts a single retry-aware request pipeline in front of two very
//! different transports. A [`Client`] is bound to either a REST adapter built
//! on `reqwest` or a SOAP adapter over a pluggable [`SoapTransport`], and
//! every call goes through the same attempt loop: execute, parse the body,
//! classify the response, notify the completion callback, then resolve, retry
//! or fail with a typed error.
//!
//! ## Quick Start
//!
//! ```no_run
//! use duplex::{Client, RestRequest, RetryPolicy, Security};
//! use duplex::retry::StatusClass;
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), duplex::Error> {
//!     let client = Client::rest()
//!         .base_url("https://gorest.co.in/public/v1")
//!         .security(Security::bearer("my-token"))
//!         .retry(RetryPolicy::new(3).not_on([StatusClass::ClientErrors]))
//!         .build()?;
//!
//!     let users = client
//!         .request::<Value>(RestRequest::get("/users").with_query_param("page", 2))
//!         .await?;
//!     println!("page {}", users.body["meta"]["pagination"]["page"]);
//!     println!("took {:?} over {} attempt(s)", users.latency, users.attempts);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Two transports, one pipeline** - REST and SOAP calls share retry, classification and telemetry
//! - **Retry policy** - Retry budget, allow and deny lists of status classes, custom predicates, fixed or exponential backoff
//! - **Success classification** - Per-client and per-request classifiers, error handlers and body parsers
//! - **Authentication** - Basic and bearer credentials injected as an `Authorization` header
//! - **TLS** - PEM client certificates, PKCS#12 bundles, or just turning verification off
//! - **Streaming** - Raw byte streams and back-to-back JSON object streams
//! - **Telemetry callbacks** - Per-attempt timing and correlation identifiers
//!
//! ## Error Handling
//!
//! Errors say who has to act:
//!
//! ```no_run
//! use duplex::{Client, Error, RestRequest};
//!
//! # async fn example(client: Client) {
//! match client.request::<serde_json::Value>(RestRequest::get("/users/{id}")).await {
//!     Ok(response) => println!("Success: {}", response.body),
//!     Err(Error::RequestFail(failure)) => {
//!         // transient, may be retried later
//!         eprintln!("{} (after {} attempts)", failure, failure.response.attempts);
//!     }
//!     Err(Error::BodyParserFail(cause)) => eprintln!("parser bug: {}", cause),
//!     Err(e) if e.is_configuration_error() => eprintln!("call site bug: {}", e),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # }
//! ```

mod auth;
mod client;
mod error;
mod generator;
pub mod path;
mod request;
mod response;
pub mod retry;
mod stream;
mod telemetry;
mod tls;
pub mod transport;

pub use auth::{resolve_authorization, Security};
pub use client::{Client, ClientBuilder};
pub use error::{Error, RequestFailure, Result};
pub use generator::ClientGenerator;
pub use request::{
    BodyParser, BoxError, Callback, ErrorHandler, Hooks, Request, ResponseType, RestRequest,
    SoapRequest, SuccessClassifier, Verdict,
};
pub use response::Response;
pub use retry::{Backoff, RetryPolicy, RetryPredicate};
pub use stream::JsonStream;
pub use telemetry::{Extra, Info};
pub use tls::{SslConfig, TlsMaterial};
pub use transport::{
    ByteStream, ServiceClient, SoapCall, SoapClientOptions, SoapFault, SoapReply, SoapTransport,
    Transport, TransportKind,
};
