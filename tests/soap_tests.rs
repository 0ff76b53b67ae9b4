//! SOAP client tests against an in-memory calculator service.

use async_trait::async_trait;
use duplex::retry::StatusClass;
use duplex::{
    Client, Error, Hooks, RestRequest, RetryPolicy, Security, ServiceClient, SoapCall,
    SoapClientOptions, SoapFault, SoapReply, SoapRequest, SoapTransport,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WSDL: &str = "http://calculator.internal/calculator.asmx?WSDL";

#[derive(Default)]
struct Calculator {
    builds: AtomicUsize,
    built_from: Mutex<Vec<(String, SoapClientOptions)>>,
    calls: Arc<Mutex<Vec<SoapCall>>>,
}

impl Calculator {
    fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn last_call(&self) -> SoapCall {
        self.calls.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl SoapTransport for Calculator {
    async fn build_client(
        &self,
        wsdl: &str,
        options: &SoapClientOptions,
    ) -> duplex::Result<Arc<dyn ServiceClient>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.built_from
            .lock()
            .unwrap()
            .push((wsdl.to_string(), options.clone()));
        if wsdl.contains("unreachable") {
            return Err(Error::ClientBadConfiguration(format!("cannot load {}", wsdl)));
        }
        Ok(Arc::new(CalculatorService {
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct CalculatorService {
    calls: Arc<Mutex<Vec<SoapCall>>>,
}

#[async_trait]
impl ServiceClient for CalculatorService {
    fn has_operation(&self, operation: &str) -> bool {
        matches!(operation, "Add" | "Divide" | "Busy")
    }

    async fn invoke(&self, call: SoapCall) -> Result<SoapReply, SoapFault> {
        self.calls.lock().unwrap().push(call.clone());
        let a = call.body["intA"].as_i64().unwrap_or_default();
        let b = call.body["intB"].as_i64().unwrap_or_default();

        match call.operation.as_str() {
            "Add" => {
                let mut reply = SoapReply::new(json!({ "AddResult": a + b }));
                reply.raw_response = Some(format!("<AddResult>{}</AddResult>", a + b));
                Ok(reply)
            }
            "Divide" if b == 0 => Err(SoapFault::new("Division by zero")
                .with_body(json!({ "faultcode": "soap:Server", "faultstring": "Division by zero" }))),
            "Divide" => Ok(SoapReply::new(json!({ "DivideResult": a / b }))),
            _ => Err(SoapFault::new("Service Unavailable").with_status(503)),
        }
    }
}

fn soap_client(calculator: &Arc<Calculator>) -> Client {
    Client::soap(calculator.clone()).wsdl(WSDL).build().unwrap()
}

#[tokio::test]
async fn test_add_operation() {
    let calculator = Arc::new(Calculator::default());
    let client = soap_client(&calculator);

    let response = client
        .request::<Value>(SoapRequest::new("Add", json!({ "intA": 1, "intB": 2 })))
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.body["AddResult"], 3);
    assert_eq!(response.raw_response.as_deref(), Some("<AddResult>3</AddResult>"));
    assert_eq!(calculator.last_call().timeout, Duration::from_millis(120_000));
}

#[tokio::test]
async fn test_service_client_is_built_once() {
    let calculator = Arc::new(Calculator::default());
    let client = soap_client(&calculator);

    let mut handles = Vec::new();
    for i in 0..5 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .request::<Value>(SoapRequest::new("Add", json!({ "intA": i, "intB": 1 })))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(calculator.builds(), 1);
    assert_eq!(calculator.built_from.lock().unwrap()[0].0, WSDL);
}

#[tokio::test]
async fn test_wsdl_override_bypasses_cache() {
    let calculator = Arc::new(Calculator::default());
    let client = soap_client(&calculator);
    let other = "http://calculator-b.internal/calculator.asmx?WSDL";

    for _ in 0..2 {
        let request = SoapRequest::new("Add", json!({ "intA": 1, "intB": 1 }))
            .with_wsdl(other)
            .with_header("x-tenant", "acme")
            .unwrap();
        client.request::<Value>(request).await.unwrap();
    }
    client
        .request::<Value>(SoapRequest::new("Add", json!({ "intA": 1, "intB": 1 })))
        .await
        .unwrap();

    let built_from = calculator.built_from.lock().unwrap();
    assert_eq!(built_from.len(), 3);
    assert_eq!(built_from[0].0, other);
    assert_eq!(built_from[0].1.wsdl_headers["x-tenant"], "acme");
    assert_eq!(built_from[2].0, WSDL);
}

#[tokio::test]
async fn test_call_carries_endpoint_headers_and_credentials() {
    let calculator = Arc::new(Calculator::default());
    let client = Client::soap(calculator.clone())
        .wsdl(WSDL)
        .security(Security::basic("user", "pass"))
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let request = SoapRequest::new("Add", json!({ "intA": 2, "intB": 2 }))
        .with_endpoint("http://calculator-2.internal/calculator.asmx")
        .with_soap_header("AuthHeader", json!({ "tenant": "acme" }))
        .with_option("forceSoap12Headers", true);
    let response = client.request::<Value>(request).await.unwrap();

    assert_eq!(
        response.url.as_deref(),
        Some("http://calculator-2.internal/calculator.asmx")
    );
    let call = calculator.last_call();
    assert_eq!(call.http_headers["authorization"], "Basic dXNlcjpwYXNz");
    assert_eq!(call.soap_headers, vec![("AuthHeader".to_string(), json!({ "tenant": "acme" }))]);
    assert_eq!(call.options["forceSoap12Headers"], true);
    assert_eq!(call.timeout, Duration::from_secs(5));
}

#[tokio::test]
async fn test_request_security_overrides_client() {
    let calculator = Arc::new(Calculator::default());
    let client = Client::soap(calculator.clone())
        .wsdl(WSDL)
        .security(Security::basic("user", "pass"))
        .build()
        .unwrap();

    let request = SoapRequest::new("Add", json!({ "intA": 1, "intB": 1 }))
        .with_hooks(Hooks::new().security(Security::bearer("Bearer per-call")));
    client.request::<Value>(request).await.unwrap();

    assert_eq!(calculator.last_call().http_headers["authorization"], "Bearer per-call");
}

#[tokio::test]
async fn test_missing_method() {
    let calculator = Arc::new(Calculator::default());
    let result = soap_client(&calculator)
        .request::<Value>(SoapRequest::new("", json!({})))
        .await;

    match result {
        Err(Error::MissingMandatoryParameter(name)) => assert_eq!(name, "method"),
        other => panic!("Expected MissingMandatoryParameter, got {:?}", other.map(|r| r.body)),
    }
}

#[tokio::test]
async fn test_body_must_be_structured() {
    let calculator = Arc::new(Calculator::default());
    let client = soap_client(&calculator);

    for body in [Value::Null, json!(42), json!("intA=1")] {
        let result = client.request::<Value>(SoapRequest::new("Add", body)).await;
        match result {
            Err(Error::MissingMandatoryParameter(name)) => assert_eq!(name, "body"),
            other => panic!("Expected MissingMandatoryParameter, got {:?}", other.map(|r| r.body)),
        }
    }
    assert!(calculator.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_array_body_is_accepted() {
    let calculator = Arc::new(Calculator::default());
    let response = soap_client(&calculator)
        .request::<Value>(SoapRequest::new("Add", json!([1, 2])))
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(calculator.last_call().body, json!([1, 2]));
}

#[tokio::test]
async fn test_unknown_operation() {
    let calculator = Arc::new(Calculator::default());
    let client = Client::soap(calculator.clone())
        .wsdl(WSDL)
        .retry(RetryPolicy::new(3))
        .build()
        .unwrap();

    let result = client
        .request::<Value>(SoapRequest::new("Multiply", json!({ "intA": 2, "intB": 3 })))
        .await;

    match result {
        Err(Error::MissingSoapMethod(name)) => assert_eq!(name, "Multiply"),
        other => panic!("Expected MissingSoapMethod, got {:?}", other.map(|r| r.body)),
    }
    assert!(calculator.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_wsdl() {
    let calculator = Arc::new(Calculator::default());
    let client = Client::soap(calculator.clone()).build().unwrap();

    let result = client
        .request::<Value>(SoapRequest::new("Add", json!({ "intA": 1, "intB": 2 })))
        .await;

    assert!(matches!(result, Err(Error::ClientBadConfiguration(_))));
    assert_eq!(calculator.builds(), 0);
}

#[tokio::test]
async fn test_failed_build_is_not_cached() {
    let calculator = Arc::new(Calculator::default());
    let client = Client::soap(calculator.clone())
        .wsdl("http://unreachable.internal/?WSDL")
        .build()
        .unwrap();

    for _ in 0..2 {
        let result = client
            .request::<Value>(SoapRequest::new("Add", json!({ "intA": 1, "intB": 2 })))
            .await;
        assert!(matches!(result, Err(Error::ClientBadConfiguration(_))));
    }
    assert_eq!(calculator.builds(), 2);
}

#[tokio::test]
async fn test_fault_without_status_maps_to_500() {
    let calculator = Arc::new(Calculator::default());
    let result = soap_client(&calculator)
        .request::<Value>(SoapRequest::new("Divide", json!({ "intA": 1, "intB": 0 })))
        .await;

    match result {
        Err(Error::RequestFail(failure)) => {
            assert_eq!(failure.response.status.as_u16(), 500);
            assert_eq!(failure.response.message.as_deref(), Some("Division by zero"));
            assert_eq!(failure.response.body["faultcode"], "soap:Server");
            assert!(failure.request.as_soap().is_some());
            assert!(failure.cause.to_string().contains("soap:Server"));
        }
        other => panic!("Expected RequestFail, got {:?}", other.map(|r| r.body)),
    }
}

#[tokio::test]
async fn test_fault_status_drives_retry_policy() {
    let calculator = Arc::new(Calculator::default());
    let client = Client::soap(calculator.clone())
        .wsdl(WSDL)
        .retry(RetryPolicy::new(2).on([StatusClass::Code(503)]))
        .build()
        .unwrap();

    let error = client
        .request::<Value>(SoapRequest::new("Busy", json!({})))
        .await
        .unwrap_err();

    assert_eq!(error.status().map(|s| s.as_u16()), Some(503));
    assert_eq!(calculator.calls.lock().unwrap().len(), 3);
    assert_eq!(calculator.builds(), 1);
}

#[tokio::test]
async fn test_streaming_is_not_implemented() {
    let calculator = Arc::new(Calculator::default());
    let result = soap_client(&calculator)
        .stream_request::<Value>(RestRequest::get("/events"))
        .await;

    assert!(matches!(result, Err(Error::NotImplemented(_))));
}

#[tokio::test]
async fn test_rest_request_is_rejected() {
    let calculator = Arc::new(Calculator::default());
    let result = soap_client(&calculator)
        .request::<Value>(RestRequest::get("/users"))
        .await;

    assert!(matches!(result, Err(Error::ClientBadConfiguration(_))));
}

#[test]
fn test_soap_client_rejects_base_url() {
    let calculator = Arc::new(Calculator::default());
    let result = Client::soap(calculator).base_url("http://x").build();
    assert!(matches!(result, Err(Error::ClientBadConfiguration(_))));
}
