//! The ride-request API: routing, authentication, handling and error
//! translation behind a single [`RideApi::dispatch`] entry point.

use http::StatusCode;
use tracing::{debug, info, warn};

use crate::auth::{bearer_token, TokenVerifier, VerifiedIdentity};
use crate::config::Config;
use crate::error::{AuthError, Error, StorageError};
use crate::problem::ProblemDetails;
use crate::ride::{RideError, RideHandler};
use crate::router::{Handler, Router};
use crate::storage::StorageClient;
use crate::transport::{ApiRequest, ApiResponse, CorsConfig};

/// How a request was resolved. Transports log and count these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Preflight,
    NotFound,
    Unauthorized(AuthError),
    BadPayload,
    PayloadTooLarge,
    StorageUnavailable,
    StorageInternal,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Preflight => "preflight",
            Self::NotFound => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::BadPayload => "bad_payload",
            Self::PayloadTooLarge => "payload_too_large",
            Self::StorageUnavailable => "storage_unavailable",
            Self::StorageInternal => "storage_internal",
        }
    }

    /// The auth rejection reason, for `Unauthorized` outcomes.
    pub fn auth_reason(&self) -> Option<&'static str> {
        match self {
            Self::Unauthorized(err) => Some(err.reason()),
            _ => None,
        }
    }
}

/// A response together with the outcome that produced it.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub response: ApiResponse,
    pub outcome: Outcome,
}

/// Front door for ride requests.
///
/// Holds no per-request state; share one instance across all requests.
#[derive(Debug, Clone)]
pub struct RideApi {
    router: Router,
    verifier: TokenVerifier,
    handler: RideHandler,
    cors: CorsConfig,
}

impl RideApi {
    pub fn new(verifier: TokenVerifier, handler: RideHandler, cors: CorsConfig) -> Self {
        Self {
            router: Router::new(),
            verifier,
            handler,
            cors,
        }
    }

    /// Wire up the verifier, storage backend and CORS policy from configuration.
    pub async fn from_config(config: &Config) -> Result<Self, Error> {
        let verifier = TokenVerifier::from_config(config)?;
        let storage = StorageClient::from_config(config).await;
        let cors = CorsConfig::new(&config.cors_allow_origin)?;
        Ok(Self::new(verifier, RideHandler::new(storage), cors))
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Route, authenticate and handle one request.
    ///
    /// Never fails: every error becomes a problem response. CORS headers are
    /// present on every response.
    pub async fn dispatch(&self, request: ApiRequest) -> Dispatch {
        let matched = match self.router.route(&request.method, &request.path) {
            Ok(matched) => matched,
            Err(e) => {
                debug!(request_id = %request.request_id, error = %e, "no route");
                let problem = ProblemDetails::not_found(
                    request.method.as_str(),
                    &request.path,
                    &request.request_id,
                );
                return self.finish(&request, problem.into_response(), Outcome::NotFound);
            }
        };

        let identity = if matched.requires_auth {
            match self.authenticate(&request).await {
                Ok(identity) => Some(identity),
                Err(e) => return self.unauthorized(&request, e),
            }
        } else {
            None
        };

        match (matched.handler, identity) {
            (Handler::Preflight, _) => {
                let mut response = ApiResponse::empty(StatusCode::NO_CONTENT);
                self.cors.apply(&mut response.headers, true);
                self.finish(&request, response, Outcome::Preflight)
            }
            (Handler::CreateRide, Some(identity)) => self.create_ride(&request, &identity).await,
            (Handler::CreateRide, None) => self.unauthorized(&request, AuthError::Malformed),
        }
    }

    /// Response for a request the transport rejected before dispatch, such as
    /// an oversized or unreadable body.
    pub fn reject(&self, problem: ProblemDetails, outcome: Outcome) -> Dispatch {
        let mut response = problem.into_response();
        self.cors.apply(&mut response.headers, false);
        Dispatch { response, outcome }
    }

    pub fn payload_too_large(&self, request_id: &str, limit: usize) -> Dispatch {
        self.reject(
            ProblemDetails::payload_too_large(limit, request_id),
            Outcome::PayloadTooLarge,
        )
    }

    async fn authenticate(&self, request: &ApiRequest) -> Result<VerifiedIdentity, AuthError> {
        let token = bearer_token(request.authorization())?;
        self.verifier.verify(token).await
    }

    async fn create_ride(&self, request: &ApiRequest, identity: &VerifiedIdentity) -> Dispatch {
        match self.handler.handle(identity, &request.body).await {
            Ok(created) => {
                let response = ApiResponse::json(StatusCode::CREATED, &created, "application/json");
                self.finish(request, response, Outcome::Created)
            }
            Err(RideError::Validation(e)) => {
                let problem = ProblemDetails::bad_request(e.to_string(), &request.request_id);
                self.finish(request, problem.into_response(), Outcome::BadPayload)
            }
            Err(RideError::Storage(StorageError::Unavailable(_))) => {
                let problem = ProblemDetails::service_unavailable(&request.request_id);
                self.finish(request, problem.into_response(), Outcome::StorageUnavailable)
            }
            Err(RideError::Storage(StorageError::Internal(_))) => {
                let problem = ProblemDetails::storage_failure(&request.request_id);
                self.finish(request, problem.into_response(), Outcome::StorageInternal)
            }
        }
    }

    fn unauthorized(&self, request: &ApiRequest, reason: AuthError) -> Dispatch {
        warn!(
            request_id = %request.request_id,
            reason = reason.reason(),
            "request rejected"
        );
        let problem = ProblemDetails::unauthorized(&request.request_id);
        self.finish(request, problem.into_response(), Outcome::Unauthorized(reason))
    }

    fn finish(&self, request: &ApiRequest, mut response: ApiResponse, outcome: Outcome) -> Dispatch {
        if outcome != Outcome::Preflight {
            self.cors.apply(&mut response.headers, false);
        }
        info!(
            request_id = %request.request_id,
            method = %request.method,
            path = %request.path,
            status = response.status.as_u16(),
            outcome = outcome.label(),
            "request handled"
        );
        Dispatch { response, outcome }
    }
}
