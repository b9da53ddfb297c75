use std::collections::HashSet;
use std::sync::Arc;

use http::{Method, StatusCode};
use wildrydes_lib::test_utils::{
    bearer, mint_token, mint_token_with_key, test_api, FailingStore, RecordingStore, TestClaims,
    UNTRUSTED_PRIVATE_KEY_PEM,
};
use wildrydes_lib::{ApiRequest, AuthError, Outcome, RideId};

fn post_ride(token: &str, body: &str) -> ApiRequest {
    ApiRequest::new(Method::POST, "/ride")
        .with_header("Authorization", &bearer(token))
        .with_header("Content-Type", "application/json")
        .with_body(body)
}

#[tokio::test]
async fn concurrent_rides_get_distinct_ids() {
    let store = Arc::new(RecordingStore::default());
    let api = Arc::new(test_api(store.clone()));
    let token = mint_token(&TestClaims::valid("rider-42"));

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let api = Arc::clone(&api);
            let request = post_ride(&token, &format!(r#"{{"Seat":{}}}"#, i));
            tokio::spawn(async move { api.dispatch(request).await })
        })
        .collect();

    let mut ids = HashSet::new();
    for task in tasks {
        let dispatch = task.await.expect("task completes");
        assert_eq!(dispatch.response.status, StatusCode::CREATED);
        let body = dispatch.response.body_json().expect("json body");
        ids.insert(body["rideId"].as_str().expect("rideId").to_string());
    }

    assert_eq!(ids.len(), 50);
    assert_eq!(store.len(), 50);
    for id in &ids {
        let record = store.get(&RideId::from(id.as_str())).expect("stored");
        assert_eq!(record.user_id, "rider-42");
    }
}

#[tokio::test]
async fn rejected_tokens_never_write() {
    let store = Arc::new(RecordingStore::default());
    let api = test_api(store.clone());

    let mut expired = TestClaims::valid("rider-1");
    expired.exp = chrono::Utc::now().timestamp() - 1;
    let mut wrong_issuer = TestClaims::valid("rider-1");
    wrong_issuer.iss = "https://issuer.invalid".to_string();

    let cases = [
        ("not-a-token".to_string(), AuthError::Malformed),
        (mint_token(&expired), AuthError::Expired),
        (mint_token(&wrong_issuer), AuthError::WrongIssuer),
        (
            mint_token_with_key(&TestClaims::valid("rider-1"), UNTRUSTED_PRIVATE_KEY_PEM),
            AuthError::InvalidSignature,
        ),
    ];

    for (token, reason) in cases {
        let dispatch = api.dispatch(post_ride(&token, "{}")).await;
        assert_eq!(dispatch.response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(dispatch.outcome, Outcome::Unauthorized(reason));
    }
    assert_eq!(store.attempts(), 0);
}

#[tokio::test]
async fn basic_auth_is_rejected() {
    let api = test_api(Arc::new(RecordingStore::default()));
    let request = ApiRequest::new(Method::POST, "/ride")
        .with_header("Authorization", "Basic cmlkZXI6c2VjcmV0")
        .with_body("{}");

    let dispatch = api.dispatch(request).await;

    assert_eq!(dispatch.outcome, Outcome::Unauthorized(AuthError::Malformed));
}

#[tokio::test]
async fn bare_token_is_accepted() {
    let api = test_api(Arc::new(RecordingStore::default()));
    let token = mint_token(&TestClaims::valid("rider-1"));
    let request = ApiRequest::new(Method::POST, "/ride")
        .with_header("Authorization", &token)
        .with_body("{}");

    assert_eq!(api.dispatch(request).await.outcome, Outcome::Created);
}

#[tokio::test]
async fn unavailable_store_is_tried_exactly_max_attempts() {
    let store = Arc::new(FailingStore::unavailable());
    let api = test_api(store.clone());
    let token = mint_token(&TestClaims::valid("rider-1"));

    let dispatch = api.dispatch(post_ride(&token, "{}")).await;

    assert_eq!(dispatch.response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(dispatch.outcome, Outcome::StorageUnavailable);
    assert_eq!(store.attempts(), 3);
}

#[tokio::test]
async fn every_response_allows_cross_origin() {
    let api = test_api(Arc::new(RecordingStore::default()));
    let token = mint_token(&TestClaims::valid("rider-1"));

    let requests = [
        post_ride(&token, "{}"),
        post_ride(&token, "[]"),
        ApiRequest::new(Method::POST, "/ride"),
        ApiRequest::new(Method::OPTIONS, "/ride"),
        ApiRequest::new(Method::DELETE, "/ride"),
    ];
    for request in requests {
        let dispatch = api.dispatch(request).await;
        assert_eq!(
            dispatch.response.header("access-control-allow-origin"),
            Some("*"),
            "outcome {:?}",
            dispatch.outcome
        );
    }
}
