//! Wild Rydes ride-request library.
//!
//! Everything the write path needs, independent of how requests arrive:
//!
//! - [`auth`]: bearer token verification against the identity provider's JWKS
//! - [`Router`]: method and path routing, with CORS preflight on any path
//! - [`RideHandler`]: payload validation, ride id assignment and persistence
//! - [`storage`]: the [`RideStore`] contract, DynamoDB and in-memory backends,
//!   and the retrying [`StorageClient`]
//! - [`RideApi`]: ties the above together behind one `dispatch` call
//!
//! The HTTP service and the Lambda function are thin adapters that convert
//! their native requests into [`ApiRequest`] and back.
//!
//! ```text
//! ApiRequest -> Router -> TokenVerifier -> RideHandler -> StorageClient -> RideStore
//!                  |            |               |               |
//!                 404          401             400          503 / 502
//! ```

#![deny(warnings)]

mod api;
pub mod auth;
pub mod config;
pub mod error;
mod problem;
pub mod ride;
mod router;
pub mod storage;
mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use api::{Dispatch, Outcome, RideApi};
pub use auth::{bearer_token, TokenVerifier, VerifiedIdentity};
pub use config::{Config, StorageBackend};
pub use error::{
    AuthError, ConfigError, Error, Result, RouteError, StorageError, ValidationError,
};
pub use problem::{
    ProblemDetails, PROBLEM_CONTENT_TYPE, PROBLEM_INTERNAL_ERROR, PROBLEM_INVALID_REQUEST,
    PROBLEM_NOT_FOUND, PROBLEM_PAYLOAD_TOO_LARGE, PROBLEM_SERVICE_UNAVAILABLE,
    PROBLEM_STORAGE_FAILURE, PROBLEM_UNAUTHORIZED,
};
pub use ride::{RideCreated, RideError, RideHandler, RideId, RideRequest};
pub use router::{Handler, RouteMatch, Router};
pub use storage::{RetryPolicy, RideStore, StorageClient};
pub use transport::{ApiRequest, ApiResponse, CorsConfig, REQUEST_ID_HEADER};
