use thiserror::Error;

/// Convenient result alias for the Wild Rydes library.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a bearer token was rejected.
///
/// Every variant maps to the same `401 Unauthorized` response; the variant is
/// only used for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The token is missing, not a JWT, or its claims could not be parsed.
    #[error("token is malformed")]
    Malformed,

    /// The signature could not be verified against the provider's keys.
    #[error("token signature is invalid")]
    InvalidSignature,

    /// The current time is outside the token's validity window.
    #[error("token is expired or not yet valid")]
    Expired,

    /// The token was issued for a different audience.
    #[error("token audience does not match")]
    WrongAudience,

    /// The token was issued by a different identity provider.
    #[error("token issuer does not match")]
    WrongIssuer,
}

impl AuthError {
    /// Stable label used in logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "expired",
            Self::WrongAudience => "wrong_audience",
            Self::WrongIssuer => "wrong_issuer",
        }
    }
}

/// Raised when no route matches a method and path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no route for {method} {path}")]
    NotFound { method: String, path: String },
}

/// Raised when a request body cannot be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid ride request payload: {message}")]
    BadPayload { message: String },
}

/// Failures reported by the storage client.
///
/// The message is for logs only and never reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Connectivity, timeout, or throttling failure; safe to retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure.
    #[error("storage failure: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Stable label used in logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "storage_unavailable",
            Self::Internal(_) => "storage_internal",
        }
    }
}

/// Raised when configuration is missing or invalid at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("required setting {name} is not set")]
    Missing { name: &'static str },

    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Raised when the JWKS HTTP client cannot be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
