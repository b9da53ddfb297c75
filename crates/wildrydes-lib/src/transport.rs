//! Transport-neutral request and response types.
//!
//! The HTTP service and the Lambda function both translate their native
//! request shapes into an [`ApiRequest`], hand it to
//! [`RideApi::dispatch`](crate::RideApi::dispatch), and translate the
//! resulting [`ApiResponse`] back.

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::ConfigError;

/// Request header carrying the caller-supplied correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// An inbound API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Request path, optionally including a query string.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Correlation id used in logs and problem `instance` fields.
    pub request_id: String,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            request_id: String::new(),
        }
    }

    /// Add a header. Names or values that are not valid HTTP are dropped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// The `Authorization` header, if present and valid UTF-8.
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }
}

/// An outbound API response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Serialize `value` as the body with the given content type.
    pub fn json<T: Serialize>(
        status: StatusCode,
        value: &T,
        content_type: &'static str,
    ) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => {
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
                Self {
                    status,
                    headers,
                    body,
                }
            }
            Err(e) => {
                error!(error = %e, "failed to serialize response body");
                Self::empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parse the body as JSON. Intended for tests and logging.
    pub fn body_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Cross-origin headers added to every API response.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    allow_origin: HeaderValue,
    max_age_secs: u32,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: HeaderValue::from_static("*"),
            max_age_secs: 600,
        }
    }
}

impl CorsConfig {
    pub fn new(allow_origin: &str) -> Result<Self, ConfigError> {
        let allow_origin =
            HeaderValue::from_str(allow_origin.trim()).map_err(|_| ConfigError::Invalid {
                name: crate::config::ENV_CORS_ALLOW_ORIGIN,
                value: allow_origin.to_string(),
                reason: "not a valid header value".to_string(),
            })?;
        Ok(Self {
            allow_origin,
            ..Self::default()
        })
    }

    /// Add `Access-Control-Allow-Origin`, plus the preflight headers when
    /// `preflight` is set.
    pub fn apply(&self, headers: &mut HeaderMap, preflight: bool) {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            self.allow_origin.clone(),
        );
        if preflight {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("POST, OPTIONS"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Authorization, Content-Type"),
            );
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(self.max_age_secs));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_header_is_read() {
        let request = ApiRequest::new(Method::POST, "/ride").with_header("Authorization", "Bearer t");
        assert_eq!(request.authorization(), Some("Bearer t"));
        assert_eq!(ApiRequest::new(Method::POST, "/ride").authorization(), None);
    }

    #[test]
    fn invalid_header_is_dropped() {
        let request = ApiRequest::new(Method::POST, "/ride").with_header("bad header", "x");
        assert!(request.headers.is_empty());
    }

    #[test]
    fn preflight_adds_method_and_header_lists() {
        let cors = CorsConfig::new("https://wildrydes.example").unwrap();
        let mut simple = HeaderMap::new();
        cors.apply(&mut simple, false);
        assert_eq!(simple.len(), 1);
        assert_eq!(
            simple.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://wildrydes.example"
        );

        let mut preflight = HeaderMap::new();
        cors.apply(&mut preflight, true);
        assert_eq!(
            preflight.get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
            "Authorization, Content-Type"
        );
        assert_eq!(preflight.get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "600");
    }

    #[test]
    fn control_characters_in_origin_are_rejected() {
        assert!(CorsConfig::new("bad\norigin").is_err());
    }
}
