//! Shared application state and service settings.

use std::sync::Arc;

use thiserror::Error;
use wildrydes_lib::RideApi;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// HTTP listener settings.
///
/// - `SERVICE_PORT`: listen port (default: 8080)
/// - `MAX_BODY_BYTES`: request body limit (default: 65536)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub port: u16,
    pub max_body_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ServiceConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup("SERVICE_PORT") {
            config.port = value.trim().parse().map_err(|_| ServiceConfigError::Invalid {
                name: "SERVICE_PORT",
                value,
            })?;
        }
        if let Some(value) = lookup("MAX_BODY_BYTES") {
            config.max_body_bytes = value
                .trim()
                .parse()
                .ok()
                .filter(|n: &usize| *n > 0)
                .ok_or(ServiceConfigError::Invalid {
                    name: "MAX_BODY_BYTES",
                    value,
                })?;
        }
        Ok(config)
    }
}

/// Shared state for all axum handlers. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Debug)]
struct AppStateInner {
    api: RideApi,
    max_body_bytes: usize,
}

impl AppState {
    pub fn new(api: RideApi, max_body_bytes: usize) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                api,
                max_body_bytes,
            }),
        }
    }

    pub fn api(&self) -> &RideApi {
        &self.inner.api
    }

    pub fn max_body_bytes(&self) -> usize {
        self.inner.max_body_bytes
    }
}
