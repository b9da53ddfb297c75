//! Service configuration.
//!
//! All settings come from environment variables. [`Config::from_lookup`]
//! accepts any key lookup so tests can supply values without touching the
//! process environment.
//!
//! # Environment Variables
//!
//! - `WILDRYDES_ISSUER_URL`: Identity provider issuer (required)
//! - `WILDRYDES_AUDIENCE`: Expected token audience / app client id (required)
//! - `WILDRYDES_JWKS_URL`: Signing key endpoint (default: `{issuer}/.well-known/jwks.json`)
//! - `WILDRYDES_JWKS_ALLOW_HTTP`: Permit a plain-http JWKS URL (default: false)
//! - `WILDRYDES_JWKS_MAX_AGE_SECS`: Key cache lifetime (default: 3600)
//! - `WILDRYDES_JWKS_MIN_REFRESH_SECS`: Minimum gap between unknown-key refetches (default: 10)
//! - `WILDRYDES_CLOCK_SKEW_SECS`: Leeway applied to `exp`/`nbf` (default: 0)
//! - `WILDRYDES_STORAGE_BACKEND`: `dynamodb` (default) or `memory`
//! - `WILDRYDES_STORAGE_ENDPOINT`: Storage endpoint override (optional)
//! - `WILDRYDES_TABLE_NAME`: Rides table name (default: `Rides`)
//! - `WILDRYDES_REQUEST_TIMEOUT_MS`: Bound on each external call (default: 3000)
//! - `WILDRYDES_STORAGE_MAX_ATTEMPTS`: Total write attempts (default: 3)
//! - `WILDRYDES_CORS_ALLOW_ORIGIN`: `Access-Control-Allow-Origin` value (default: `*`)

use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_ISSUER_URL: &str = "WILDRYDES_ISSUER_URL";
pub const ENV_AUDIENCE: &str = "WILDRYDES_AUDIENCE";
pub const ENV_JWKS_URL: &str = "WILDRYDES_JWKS_URL";
pub const ENV_JWKS_ALLOW_HTTP: &str = "WILDRYDES_JWKS_ALLOW_HTTP";
pub const ENV_JWKS_MAX_AGE_SECS: &str = "WILDRYDES_JWKS_MAX_AGE_SECS";
pub const ENV_JWKS_MIN_REFRESH_SECS: &str = "WILDRYDES_JWKS_MIN_REFRESH_SECS";
pub const ENV_CLOCK_SKEW_SECS: &str = "WILDRYDES_CLOCK_SKEW_SECS";
pub const ENV_STORAGE_BACKEND: &str = "WILDRYDES_STORAGE_BACKEND";
pub const ENV_STORAGE_ENDPOINT: &str = "WILDRYDES_STORAGE_ENDPOINT";
pub const ENV_TABLE_NAME: &str = "WILDRYDES_TABLE_NAME";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "WILDRYDES_REQUEST_TIMEOUT_MS";
pub const ENV_STORAGE_MAX_ATTEMPTS: &str = "WILDRYDES_STORAGE_MAX_ATTEMPTS";
pub const ENV_CORS_ALLOW_ORIGIN: &str = "WILDRYDES_CORS_ALLOW_ORIGIN";

pub const DEFAULT_TABLE_NAME: &str = "Rides";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_STORAGE_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_JWKS_MAX_AGE_SECS: u64 = 3_600;
pub const DEFAULT_JWKS_MIN_REFRESH_SECS: u64 = 10;

/// Which [`RideStore`](crate::storage::RideStore) implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    DynamoDb,
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "dynamodb" | "dynamo" => Some(Self::DynamoDb),
            "memory" | "in-memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Runtime configuration for the ride-request write path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Expected `iss` claim, without a trailing slash.
    pub issuer_url: String,
    /// Expected `aud` (or `client_id`) claim.
    pub audience: String,
    pub jwks_url: String,
    pub jwks_allow_http: bool,
    pub jwks_max_age: Duration,
    pub jwks_min_refresh_interval: Duration,
    pub clock_skew: Duration,
    pub storage_backend: StorageBackend,
    pub storage_endpoint: Option<String>,
    pub table_name: String,
    pub request_timeout: Duration,
    pub storage_max_attempts: u32,
    pub cors_allow_origin: String,
}

impl Config {
    /// Create a configuration with defaults for everything but the identity
    /// provider settings.
    pub fn new(issuer_url: impl Into<String>, audience: impl Into<String>) -> Self {
        let issuer_url = trim_issuer(&issuer_url.into());
        Self {
            jwks_url: default_jwks_url(&issuer_url),
            issuer_url,
            audience: audience.into(),
            jwks_allow_http: false,
            jwks_max_age: Duration::from_secs(DEFAULT_JWKS_MAX_AGE_SECS),
            jwks_min_refresh_interval: Duration::from_secs(DEFAULT_JWKS_MIN_REFRESH_SECS),
            clock_skew: Duration::ZERO,
            storage_backend: StorageBackend::DynamoDb,
            storage_endpoint: None,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            storage_max_attempts: DEFAULT_STORAGE_MAX_ATTEMPTS,
            cors_allow_origin: "*".to_string(),
        }
    }

    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let issuer_url = get(ENV_ISSUER_URL).ok_or(ConfigError::Missing {
            name: ENV_ISSUER_URL,
        })?;
        let audience = get(ENV_AUDIENCE).ok_or(ConfigError::Missing { name: ENV_AUDIENCE })?;
        validate_url(ENV_ISSUER_URL, &issuer_url, true)?;

        let mut config = Self::new(issuer_url, audience.trim());

        config.jwks_allow_http = match get(ENV_JWKS_ALLOW_HTTP) {
            Some(value) => parse_bool(ENV_JWKS_ALLOW_HTTP, &value)?,
            None => false,
        };
        if let Some(url) = get(ENV_JWKS_URL) {
            config.jwks_url = url.trim().to_string();
        }
        validate_url(ENV_JWKS_URL, &config.jwks_url, config.jwks_allow_http)?;

        if let Some(value) = get(ENV_JWKS_MAX_AGE_SECS) {
            config.jwks_max_age = Duration::from_secs(parse_u64(ENV_JWKS_MAX_AGE_SECS, &value)?);
        }
        if let Some(value) = get(ENV_JWKS_MIN_REFRESH_SECS) {
            config.jwks_min_refresh_interval =
                Duration::from_secs(parse_u64(ENV_JWKS_MIN_REFRESH_SECS, &value)?);
        }
        if let Some(value) = get(ENV_CLOCK_SKEW_SECS) {
            config.clock_skew = Duration::from_secs(parse_u64(ENV_CLOCK_SKEW_SECS, &value)?);
        }
        if let Some(value) = get(ENV_STORAGE_BACKEND) {
            config.storage_backend =
                StorageBackend::parse(&value).ok_or_else(|| ConfigError::Invalid {
                    name: ENV_STORAGE_BACKEND,
                    value: value.clone(),
                    reason: "expected 'dynamodb' or 'memory'".to_string(),
                })?;
        }
        if let Some(endpoint) = get(ENV_STORAGE_ENDPOINT) {
            validate_url(ENV_STORAGE_ENDPOINT, &endpoint, true)?;
            config.storage_endpoint = Some(endpoint.trim().to_string());
        }
        if let Some(table) = get(ENV_TABLE_NAME) {
            config.table_name = table.trim().to_string();
        }
        if let Some(value) = get(ENV_REQUEST_TIMEOUT_MS) {
            let millis = parse_u64(ENV_REQUEST_TIMEOUT_MS, &value)?;
            if millis == 0 {
                return Err(invalid(ENV_REQUEST_TIMEOUT_MS, &value, "must be positive"));
            }
            config.request_timeout = Duration::from_millis(millis);
        }
        if let Some(value) = get(ENV_STORAGE_MAX_ATTEMPTS) {
            let attempts = parse_u64(ENV_STORAGE_MAX_ATTEMPTS, &value)?;
            if attempts == 0 || attempts > 10 {
                return Err(invalid(
                    ENV_STORAGE_MAX_ATTEMPTS,
                    &value,
                    "must be between 1 and 10",
                ));
            }
            config.storage_max_attempts = attempts as u32;
        }
        if let Some(origin) = get(ENV_CORS_ALLOW_ORIGIN) {
            config.cors_allow_origin = origin.trim().to_string();
        }

        Ok(config)
    }
}

/// Cognito publishes its key set under the issuer URL.
pub fn default_jwks_url(issuer_url: &str) -> String {
    format!("{}/.well-known/jwks.json", trim_issuer(issuer_url))
}

fn trim_issuer(issuer_url: &str) -> String {
    issuer_url.trim().trim_end_matches('/').to_string()
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_u64(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(name, value, "expected a non-negative integer"))
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(invalid(name, value, "expected true or false")),
    }
}

fn validate_url(name: &'static str, value: &str, allow_http: bool) -> Result<(), ConfigError> {
    let parsed = reqwest::Url::parse(value.trim())
        .map_err(|e| invalid(name, value, &format!("not a URL: {}", e)))?;
    match parsed.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        "http" => Err(invalid(name, value, "must use https")),
        other => Err(invalid(name, value, &format!("unsupported scheme '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const ISSUER: &str = "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_Example";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config =
            Config::from_lookup(lookup(&[(ENV_ISSUER_URL, ISSUER), (ENV_AUDIENCE, "client")]))
                .unwrap();

        assert_eq!(config.issuer_url, ISSUER);
        assert_eq!(config.audience, "client");
        assert_eq!(config.jwks_url, format!("{}/.well-known/jwks.json", ISSUER));
        assert_eq!(config.table_name, "Rides");
        assert_eq!(config.request_timeout, Duration::from_millis(3_000));
        assert_eq!(config.storage_max_attempts, 3);
        assert_eq!(config.storage_backend, StorageBackend::DynamoDb);
        assert_eq!(config.clock_skew, Duration::ZERO);
        assert_eq!(config.cors_allow_origin, "*");
        assert!(config.storage_endpoint.is_none());
    }

    #[test]
    fn missing_issuer_is_rejected() {
        let err = Config::from_lookup(lookup(&[(ENV_AUDIENCE, "client")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing {
                name: ENV_ISSUER_URL
            }
        );
    }

    #[test]
    fn blank_audience_counts_as_missing() {
        let err = Config::from_lookup(lookup(&[(ENV_ISSUER_URL, ISSUER), (ENV_AUDIENCE, "  ")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing { name: ENV_AUDIENCE });
    }

    #[test]
    fn trailing_slash_on_issuer_is_trimmed() {
        let issuer = format!("{}/", ISSUER);
        let config =
            Config::from_lookup(lookup(&[(ENV_ISSUER_URL, issuer.as_str()), (ENV_AUDIENCE, "client")]))
                .unwrap();
        assert_eq!(config.issuer_url, ISSUER);
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup(&[
            (ENV_ISSUER_URL, ISSUER),
            (ENV_AUDIENCE, "client"),
            (ENV_TABLE_NAME, "RidesStaging"),
            (ENV_REQUEST_TIMEOUT_MS, "1500"),
            (ENV_STORAGE_MAX_ATTEMPTS, "5"),
            (ENV_STORAGE_BACKEND, "memory"),
            (ENV_STORAGE_ENDPOINT, "http://localhost:8000"),
            (ENV_CLOCK_SKEW_SECS, "30"),
            (ENV_CORS_ALLOW_ORIGIN, "https://wildrydes.example"),
        ]))
        .unwrap();

        assert_eq!(config.table_name, "RidesStaging");
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert_eq!(config.storage_max_attempts, 5);
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(
            config.storage_endpoint.as_deref(),
            Some("http://localhost:8000")
        );
        assert_eq!(config.clock_skew, Duration::from_secs(30));
        assert_eq!(config.cors_allow_origin, "https://wildrydes.example");
    }

    #[test]
    fn http_jwks_url_requires_opt_in() {
        let pairs = [
            (ENV_ISSUER_URL, ISSUER),
            (ENV_AUDIENCE, "client"),
            (ENV_JWKS_URL, "http://127.0.0.1:9000/jwks.json"),
        ];
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid {
                name: ENV_JWKS_URL,
                ..
            })
        ));

        let mut allowed = pairs.to_vec();
        allowed.push((ENV_JWKS_ALLOW_HTTP, "true"));
        let config = Config::from_lookup(lookup(&allowed)).unwrap();
        assert_eq!(config.jwks_url, "http://127.0.0.1:9000/jwks.json");
    }

    #[test]
    fn zero_attempts_is_invalid() {
        let err = Config::from_lookup(lookup(&[
            (ENV_ISSUER_URL, ISSUER),
            (ENV_AUDIENCE, "client"),
            (ENV_STORAGE_MAX_ATTEMPTS, "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(ENV_STORAGE_MAX_ATTEMPTS));
    }

    #[test]
    fn non_numeric_timeout_is_invalid() {
        let err = Config::from_lookup(lookup(&[
            (ENV_ISSUER_URL, ISSUER),
            (ENV_AUDIENCE, "client"),
            (ENV_REQUEST_TIMEOUT_MS, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: ENV_REQUEST_TIMEOUT_MS,
                ..
            }
        ));
    }

    #[test]
    fn unknown_backend_is_invalid() {
        let err = Config::from_lookup(lookup(&[
            (ENV_ISSUER_URL, ISSUER),
            (ENV_AUDIENCE, "client"),
            (ENV_STORAGE_BACKEND, "postgres"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("postgres"));
    }
}
