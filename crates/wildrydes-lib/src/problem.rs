//! RFC 9457 Problem Details for HTTP APIs.
//!
//! Every error response body is a [`ProblemDetails`] document served as
//! `application/problem+json`. Details are written for callers; backend and
//! identity provider error text never appears in them.
//! See: <https://www.rfc-editor.org/rfc/rfc9457.html>

use http::header::{HeaderValue, WWW_AUTHENTICATE};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::transport::ApiResponse;

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// Problem type URI for missing or rejected credentials.
pub const PROBLEM_UNAUTHORIZED: &str = "/problems/unauthorized";

/// Problem type URI for invalid request bodies.
pub const PROBLEM_INVALID_REQUEST: &str = "/problems/invalid-request";

/// Problem type URI for unknown method and path combinations.
pub const PROBLEM_NOT_FOUND: &str = "/problems/not-found";

/// Problem type URI for bodies over the size limit.
pub const PROBLEM_PAYLOAD_TOO_LARGE: &str = "/problems/payload-too-large";

/// Problem type URI for transient storage failures.
pub const PROBLEM_SERVICE_UNAVAILABLE: &str = "/problems/service-unavailable";

/// Problem type URI for non-retryable storage failures.
pub const PROBLEM_STORAGE_FAILURE: &str = "/problems/storage-failure";

/// Problem type URI for unexpected errors.
pub const PROBLEM_INTERNAL_ERROR: &str = "/problems/internal-error";

/// RFC 9457 Problem Details response structure.
///
/// # Example
///
/// ```
/// use wildrydes_lib::{ProblemDetails, PROBLEM_INVALID_REQUEST};
/// use http::StatusCode;
///
/// let problem = ProblemDetails::new(
///     PROBLEM_INVALID_REQUEST,
///     "Invalid Request",
///     StatusCode::BAD_REQUEST,
/// )
/// .with_detail("request body must be a JSON object")
/// .with_request_id("req-12345");
/// assert_eq!(problem.status, 400);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// URI reference identifying the problem type (relative).
    #[serde(rename = "type")]
    pub type_uri: String,

    /// Short, human-readable summary of the problem.
    pub title: String,

    pub status: u16,

    /// Human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// The request id, when one is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ProblemDetails {
    pub fn new(type_uri: impl Into<String>, title: impl Into<String>, status: StatusCode) -> Self {
        Self {
            type_uri: type_uri.into(),
            title: title.into(),
            status: status.as_u16(),
            detail: None,
            instance: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set `instance` to the request id. Empty ids are ignored.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        if !request_id.is_empty() {
            self.instance = Some(request_id);
        }
        self
    }

    /// 401. The rejection reason is never included.
    pub fn unauthorized(request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_UNAUTHORIZED,
            "Unauthorized",
            StatusCode::UNAUTHORIZED,
        )
        .with_detail("a valid bearer token is required")
        .with_request_id(request_id)
    }

    pub fn bad_request(detail: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_INVALID_REQUEST,
            "Invalid Request",
            StatusCode::BAD_REQUEST,
        )
        .with_detail(detail)
        .with_request_id(request_id)
    }

    pub fn not_found(method: &str, path: &str, request_id: impl Into<String>) -> Self {
        Self::new(PROBLEM_NOT_FOUND, "Not Found", StatusCode::NOT_FOUND)
            .with_detail(format!("no resource for {} {}", method, path))
            .with_request_id(request_id)
    }

    pub fn payload_too_large(limit: usize, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_PAYLOAD_TOO_LARGE,
            "Payload Too Large",
            StatusCode::PAYLOAD_TOO_LARGE,
        )
        .with_detail(format!("request body exceeds {} bytes", limit))
        .with_request_id(request_id)
    }

    /// 503 for a storage failure that may succeed if retried later.
    pub fn service_unavailable(request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_SERVICE_UNAVAILABLE,
            "Service Unavailable",
            StatusCode::SERVICE_UNAVAILABLE,
        )
        .with_detail("ride storage is temporarily unavailable, try again")
        .with_request_id(request_id)
    }

    /// 502 for a storage failure that retrying will not fix.
    pub fn storage_failure(request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_STORAGE_FAILURE,
            "Bad Gateway",
            StatusCode::BAD_GATEWAY,
        )
        .with_detail("the ride could not be recorded")
        .with_request_id(request_id)
    }

    pub fn internal_error(detail: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_INTERNAL_ERROR,
            "Internal Error",
            StatusCode::INTERNAL_SERVER_ERROR,
        )
        .with_detail(detail)
        .with_request_id(request_id)
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Render as an `application/problem+json` response. 401 responses also
    /// carry `WWW-Authenticate: Bearer`.
    pub fn into_response(self) -> ApiResponse {
        let status = self.status_code();
        let mut response = ApiResponse::json(status, &self, PROBLEM_CONTENT_TYPE);
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl std::fmt::Display for ProblemDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.title,
            self.detail.as_deref().unwrap_or("")
        )
    }
}

impl std::error::Error for ProblemDetails {}
