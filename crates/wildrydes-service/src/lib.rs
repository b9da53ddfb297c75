//! HTTP front end for the Wild Rydes ride-request API.
//!
//! - [`build_router`]: axum router with health, metrics and the ride API fallback
//! - [`AppState`]: the shared [`RideApi`](wildrydes_lib::RideApi) plus body limit
//! - [`health`]: liveness and readiness probes
//! - [`metrics`]: Prometheus exporter and ride business counters
//! - [`logging`]: JSON or text tracing output
//! - [`middleware`]: request ids and HTTP metrics
//!
//! Routing, authentication and persistence all live in `wildrydes-lib`; this
//! crate only moves requests in and responses out.

#![deny(warnings)]

mod app;
mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
mod state;

pub use app::{build_router, dispatch_handler};
pub use health::{health_live, health_ready, HealthStatus};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{
    init_metrics, metrics_handler, record_auth_failure, record_outcome, record_ride_created,
    record_ride_failure, MetricsConfig, MetricsError,
};
pub use middleware::{extract_or_generate_request_id, MetricsLayer, RequestId};
pub use state::{AppState, ServiceConfig, ServiceConfigError};
