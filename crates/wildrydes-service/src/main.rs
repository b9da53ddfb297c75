//! Wild Rydes ride-request HTTP service.
//!
//! # Endpoints
//!
//! - `POST /ride` - Record a ride request for the authenticated caller
//! - `OPTIONS *` - CORS preflight
//! - `GET /metrics` - Prometheus metrics endpoint
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe (signing keys loaded)
//!
//! # Configuration
//!
//! - `WILDRYDES_*` - see `wildrydes_lib::config`
//! - `SERVICE_PORT` - HTTP port (default: 8080)
//! - `MAX_BODY_BYTES` - Request body limit (default: 65536)
//! - `RUST_LOG` - Log level (default: info)
//! - `LOG_FORMAT` - Log format: json (default) or text

use std::net::SocketAddr;

use tokio::signal;
use tracing::{error, info, warn};

use wildrydes_lib::{Config, RideApi};
use wildrydes_service::{
    build_router, init_logging, init_metrics, AppState, LoggingConfig, MetricsConfig,
    ServiceConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_config = LoggingConfig::from_env().with_service("wildrydes-service");
    init_logging(&logging_config);

    let metrics_config = MetricsConfig::from_env();
    if let Err(e) = init_metrics(&metrics_config) {
        warn!(error = %e, "failed to initialize metrics, continuing without metrics");
    }

    let config = Config::from_env().map_err(|e| {
        error!(error = %e, "invalid configuration");
        e
    })?;
    let service_config = ServiceConfig::from_env()?;

    info!(
        issuer = %config.issuer_url,
        table = %config.table_name,
        port = service_config.port,
        "starting ride service"
    );

    let api = RideApi::from_config(&config).await?;
    match api.verifier().keys().warm().await {
        Ok(count) => info!(count, "signing keys loaded"),
        Err(e) => warn!(error = %e, "could not load signing keys at startup, will retry on demand"),
    }

    let state = AppState::new(api, service_config.max_body_bytes);
    let app = build_router(state, &metrics_config);

    let addr = SocketAddr::from(([0, 0, 0, 0], service_config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("ride service stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
