//! Prometheus metrics.
//!
//! - [`MetricsConfig`]: whether to export and where
//! - [`init_metrics`]: installs the global Prometheus recorder
//! - [`metrics_handler`]: axum handler rendering the exposition text
//! - [`record_outcome`]: business counters for ride requests
//!
//! # Business Metrics
//!
//! - `wildrydes_rides_created_total`
//! - `wildrydes_ride_failures_total{reason}`
//! - `wildrydes_auth_failures_total{reason}`

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wildrydes_lib::Outcome;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Path for the metrics endpoint (e.g., "/metrics").
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

impl MetricsConfig {
    /// - `METRICS_ENABLED`: "true" or "false" (default: true)
    /// - `METRICS_PATH`: Path for metrics endpoint (default: "/metrics")
    pub fn from_env() -> Self {
        let enabled = std::env::var("METRICS_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let path = std::env::var("METRICS_PATH").unwrap_or_else(|_| "/metrics".to_string());

        Self { enabled, path }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MetricsError {
    #[error("metrics are disabled")]
    Disabled,

    #[error("metrics recorder already initialized")]
    AlreadyInitialized,

    #[error("failed to install metrics recorder: {0}")]
    InstallFailed(String),
}

/// Install the Prometheus recorder. Call once at startup.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Err(MetricsError::Disabled);
    }
    if PROMETHEUS_HANDLE.get().is_some() {
        return Err(MetricsError::AlreadyInitialized);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::InstallFailed(e.to_string()))?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::AlreadyInitialized)
}

/// Axum handler for the metrics endpoint.
pub async fn metrics_handler() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_else(|| "# Metrics not initialized\n".to_string())
}

/// Count a dispatched request by its outcome.
///
/// Preflight and unknown-route requests are only counted by the HTTP layer.
pub fn record_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Created => record_ride_created(),
        Outcome::Unauthorized(reason) => record_auth_failure(reason.reason()),
        Outcome::BadPayload
        | Outcome::PayloadTooLarge
        | Outcome::StorageUnavailable
        | Outcome::StorageInternal => record_ride_failure(outcome.label()),
        Outcome::Preflight | Outcome::NotFound => {}
    }
}

pub fn record_ride_created() {
    metrics::counter!("wildrydes_rides_created_total").increment(1);
}

/// `reason` is an [`Outcome`] label such as `bad_payload` or `storage_unavailable`.
pub fn record_ride_failure(reason: &'static str) {
    metrics::counter!("wildrydes_ride_failures_total", "reason" => reason).increment(1);
}

/// `reason` is an auth rejection label such as `expired` or `invalid_signature`.
pub fn record_auth_failure(reason: &'static str) {
    metrics::counter!("wildrydes_auth_failures_total", "reason" => reason).increment(1);
}
