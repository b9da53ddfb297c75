//! AWS Lambda entry point for the ride-request API.
//!
//! API Gateway invokes the function with REST proxy events. Each event is
//! converted into an [`ApiRequest`](wildrydes_lib::ApiRequest), dispatched
//! through a [`RideApi`] built once at cold start, and returned as a proxy
//! response.

#![deny(warnings)]

mod proxy;
mod tracing_init;

use std::time::Instant;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::{info, warn};
use wildrydes_lib::{Config, RideApi};

pub use proxy::{handle_proxy_event, ProxyRequest, ProxyRequestContext, ProxyResponse};
pub use tracing_init::init_tracing;

/// Build the ride API from the environment and serve invocations until the
/// runtime shuts down.
pub async fn run() -> Result<(), Error> {
    init_tracing();

    let start = Instant::now();
    let config = Config::from_env()?;
    let api = RideApi::from_config(&config).await?;
    match api.verifier().keys().warm().await {
        Ok(count) => info!(count, "signing keys loaded"),
        Err(e) => warn!(error = %e, "could not load signing keys at cold start, will retry on demand"),
    }
    info!(
        issuer = %config.issuer_url,
        total_init_ms = start.elapsed().as_millis() as u64,
        "ride API initialized"
    );

    let api = &api;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handler(api, event).await
    }))
    .await
}

/// Handle one invocation. Always answers with a proxy response.
pub async fn handler(api: &RideApi, event: LambdaEvent<Value>) -> Result<ProxyResponse, Error> {
    let invocation_id = event.context.request_id.clone();
    Ok(handle_proxy_event(api, event.payload, &invocation_id).await)
}
