//! axum router and the adapter into [`RideApi::dispatch`](wildrydes_lib::RideApi::dispatch).

use axum::{
    body::{Body, Bytes},
    extract::{
        rejection::{BytesRejection, FailedToBufferBody},
        DefaultBodyLimit, FromRequest, Request, State,
    },
    response::Response,
    routing::get,
    Router,
};
use tracing::{debug, warn};
use wildrydes_lib::{ApiRequest, ApiResponse, Dispatch, Outcome, ProblemDetails};

use crate::health::{health_live, health_ready};
use crate::metrics::{metrics_handler, record_outcome, MetricsConfig};
use crate::middleware::{extract_or_generate_request_id, MetricsLayer, RequestId};
use crate::state::AppState;

/// Build the service router.
///
/// Health and metrics endpoints answer `GET` directly; `OPTIONS` on them and
/// every other request go to the ride API.
pub fn build_router(state: AppState, metrics: &MetricsConfig) -> Router {
    let mut router = Router::new()
        .route("/health/live", get(health_live).options(dispatch_handler))
        .route("/health/ready", get(health_ready).options(dispatch_handler));
    if metrics.enabled {
        router = router.route(&metrics.path, get(metrics_handler).options(dispatch_handler));
    }

    let body_limit = state.max_body_bytes();
    router
        .fallback(dispatch_handler)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(MetricsLayer)
        .with_state(state)
}

/// Fallback handler: buffer the body and hand the request to the ride API.
pub async fn dispatch_handler(State(state): State<AppState>, request: Request) -> Response {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_else(|| extract_or_generate_request_id(request.headers()));
    let method = request.method().clone();
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let headers = request.headers().clone();

    let body = match Bytes::from_request(request, &state).await {
        Ok(body) => body,
        Err(rejection) => {
            let dispatch = reject_body(&state, request_id.as_str(), rejection);
            record_outcome(&dispatch.outcome);
            return into_response(dispatch.response);
        }
    };

    let api_request = ApiRequest {
        method,
        path,
        headers,
        body: body.to_vec(),
        request_id: request_id.to_string(),
    };

    let dispatch = state.api().dispatch(api_request).await;
    record_outcome(&dispatch.outcome);
    into_response(dispatch.response)
}

fn reject_body(state: &AppState, request_id: &str, rejection: BytesRejection) -> Dispatch {
    let api = state.api();
    match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            debug!(request_id, limit = state.max_body_bytes(), "request body too large");
            api.payload_too_large(request_id, state.max_body_bytes())
        }
        other => {
            warn!(request_id, error = %other, "failed to read request body");
            api.reject(
                ProblemDetails::bad_request("request body could not be read", request_id),
                Outcome::BadPayload,
            )
        }
    }
}

fn into_response(api_response: ApiResponse) -> Response {
    let mut response = Response::new(Body::from(api_response.body));
    *response.status_mut() = api_response.status;
    *response.headers_mut() = api_response.headers;
    response
}
