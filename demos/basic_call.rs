//! Basic example: a paginated REST listing with retries and a telemetry callback.
//!
//! Run with: `cargo run --example basic_call`

use duplex::retry::StatusClass;
use duplex::{Client, ClientGenerator, Error, RestRequest, RetryPolicy};
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("duplex=debug,basic_call=info")
        .init();

    let generator = ClientGenerator::new()
        .business_unit("demo")
        .callback(|_request, response, info| {
            println!(
                "attempt {} -> {} in {}ms (success: {})",
                info.attempt,
                response.status,
                info.request_time_ms(),
                info.is_successful
            );
            Ok(())
        });

    let client = generator.get(
        Client::rest()
            .base_url("https://gorest.co.in/public/v1")
            .retry(
                RetryPolicy::new(2)
                    .not_on([StatusClass::ClientErrors])
                    .delay_in_seconds(1.0),
            ),
        Some("gorest"),
        None,
    )?;

    println!("=== Paginated listing ===");
    let response = client
        .request::<Value>(RestRequest::get("/users").with_query_param("page", 2))
        .await?;

    println!("Status: {}", response.status);
    println!("Page: {}", response.body["meta"]["pagination"]["page"]);
    println!("Users on page: {}", response.body["data"].as_array().map_or(0, Vec::len));
    println!("Latency: {:?} over {} attempt(s)", response.latency, response.attempts);
    println!();

    println!("=== Missing path parameter ===");
    match client.request::<Value>(RestRequest::get("/users/{id}")).await {
        Err(e) if e.is_configuration_error() => println!("Caught before sending: {}", e),
        other => println!("Unexpected: {:?}", other.map(|r| r.status)),
    }

    Ok(())
}
