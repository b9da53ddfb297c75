//! Liveness and readiness probes.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// "ok", or "not_ready: <reason>".
    pub status: String,
    pub service: String,
    pub version: String,

    /// Signing keys currently cached (readiness only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_keys: Option<usize>,
}

impl HealthStatus {
    pub fn alive(service: &str, version: &str) -> Self {
        Self {
            status: "ok".to_string(),
            service: service.to_string(),
            version: version.to_string(),
            signing_keys: None,
        }
    }

    pub fn ready(service: &str, version: &str, signing_keys: usize) -> Self {
        Self {
            signing_keys: Some(signing_keys),
            ..Self::alive(service, version)
        }
    }

    pub fn not_ready(service: &str, version: &str, reason: &str) -> Self {
        Self {
            status: format!("not_ready: {}", reason),
            signing_keys: Some(0),
            ..Self::alive(service, version)
        }
    }
}

/// `GET /health/live`: 200 whenever the process is serving.
pub async fn health_live() -> impl IntoResponse {
    let status = HealthStatus::alive(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    (StatusCode::OK, Json(status))
}

/// `GET /health/ready`: 200 once the signing-key cache holds at least one
/// key, 503 before that.
pub async fn health_ready(State(state): State<AppState>) -> Response {
    let service = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");

    let keys = state.api().verifier().keys().key_count().await;
    if keys == 0 {
        let status = HealthStatus::not_ready(service, version, "signing keys not loaded");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response();
    }

    (StatusCode::OK, Json(HealthStatus::ready(service, version, keys))).into_response()
}
