//! Ride requests and the handler that records them.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::VerifiedIdentity;
use crate::error::{StorageError, ValidationError};
use crate::storage::StorageClient;

/// Globally unique ride identifier: 128 random bits, URL-safe base64 without
/// padding (22 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RideId(String);

impl RideId {
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RideId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RideId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One submitted ride, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RideRequest {
    pub ride_id: RideId,
    /// Subject of the verified token.
    pub user_id: String,
    /// Submitted fields, passed through untouched.
    pub payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Successful ride creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideCreated {
    pub ride_id: RideId,
}

/// Why a ride could not be recorded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RideError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Deepest accepted payload nesting. The payload object itself is level one;
/// the table rejects documents nested more than 32 levels.
pub const MAX_PAYLOAD_DEPTH: usize = 32;

/// Largest accepted body. Leaves headroom under the 400 KB item limit for the
/// record's own attributes.
pub const MAX_PAYLOAD_BYTES: usize = 384 * 1024;

/// Parse a request body into the opaque ride payload.
///
/// Any JSON object within [`MAX_PAYLOAD_BYTES`] and [`MAX_PAYLOAD_DEPTH`] is
/// accepted; its fields are not interpreted. Parser diagnostics are logged,
/// never returned.
pub fn parse_payload(body: &[u8]) -> Result<Map<String, Value>, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(bad_payload("request body is empty"));
    }
    if body.len() > MAX_PAYLOAD_BYTES {
        return Err(bad_payload(format!(
            "request body exceeds {} bytes",
            MAX_PAYLOAD_BYTES
        )));
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => {
            if map.values().any(|v| depth(v) >= MAX_PAYLOAD_DEPTH) {
                return Err(bad_payload(format!(
                    "request body nests deeper than {} levels",
                    MAX_PAYLOAD_DEPTH
                )));
            }
            Ok(map)
        }
        Ok(_) => Err(bad_payload("request body must be a JSON object")),
        Err(e) => {
            debug!(error = %e, "request body did not parse");
            Err(bad_payload("request body is not valid JSON"))
        }
    }
}

fn bad_payload(message: impl Into<String>) -> ValidationError {
    ValidationError::BadPayload {
        message: message.into(),
    }
}

/// Container levels in `value`; scalars are zero.
fn depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        Value::Object(fields) => 1 + fields.values().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Records ride requests for authenticated callers.
#[derive(Debug, Clone)]
pub struct RideHandler {
    storage: StorageClient,
}

impl RideHandler {
    pub fn new(storage: StorageClient) -> Self {
        Self { storage }
    }

    /// Validate `body`, assign a new [`RideId`] and persist the ride.
    ///
    /// Nothing is written unless the payload parses. The storage client is
    /// called exactly once.
    pub async fn handle(
        &self,
        identity: &VerifiedIdentity,
        body: &[u8],
    ) -> Result<RideCreated, RideError> {
        let payload = parse_payload(body)?;

        let record = RideRequest {
            ride_id: RideId::generate(),
            user_id: identity.subject.clone(),
            payload,
            created_at: Utc::now(),
        };

        if let Err(e) = self.storage.put(&record).await {
            warn!(ride_id = %record.ride_id, user_id = %record.user_id, error = %e, "failed to record ride");
            return Err(e.into());
        }

        info!(ride_id = %record.ride_id, user_id = %record.user_id, "ride recorded");

        Ok(RideCreated {
            ride_id: record.ride_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RetryPolicy;
    use crate::test_utils::{test_identity, FailingStore, RecordingStore};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn handler_with(store: Arc<dyn crate::storage::RideStore>) -> RideHandler {
        RideHandler::new(StorageClient::new(
            store,
            RetryPolicy::no_delay(3),
            Duration::from_secs(1),
        ))
    }

    #[test]
    fn ride_ids_are_22_url_safe_chars() {
        let id = RideId::generate();
        assert_eq!(id.as_str().len(), 22);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn ride_ids_do_not_repeat() {
        let ids: HashSet<RideId> = (0..10_000).map(|_| RideId::generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn payload_must_be_an_object() {
        assert!(parse_payload(br#"{"PickupLocation":{"Latitude":47.6,"Longitude":-122.3}}"#).is_ok());
        assert!(parse_payload(b"{}").is_ok());
        let bodies: [&[u8]; 7] = [b"", b"   ", b"[1,2]", b"\"ride\"", b"42", b"null", b"{\"a\":"];
        for body in bodies {
            assert!(
                matches!(parse_payload(body), Err(ValidationError::BadPayload { .. })),
                "body {:?}",
                String::from_utf8_lossy(body)
            );
        }
    }

    /// `{"a":{"a":...1}}` with `levels` objects.
    fn nested(levels: usize) -> String {
        format!("{}1{}", "{\"a\":".repeat(levels), "}".repeat(levels))
    }

    #[test]
    fn payload_nesting_is_capped() {
        assert!(parse_payload(nested(MAX_PAYLOAD_DEPTH).as_bytes()).is_ok());

        let err = parse_payload(nested(MAX_PAYLOAD_DEPTH + 1).as_bytes()).unwrap_err();
        assert!(err.to_string().contains("nests deeper"), "{}", err);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let body = format!(r#"{{"Note":"{}"}}"#, "x".repeat(MAX_PAYLOAD_BYTES));

        let err = parse_payload(body.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("exceeds"), "{}", err);
    }

    #[test]
    fn parser_diagnostics_are_not_returned() {
        let bodies: [&[u8]; 3] = [b"{\"a\":", b"{oops", b"{\"a\":1,}"];
        for body in bodies {
            let message = parse_payload(body).unwrap_err().to_string();
            assert_eq!(
                message,
                "invalid ride request payload: request body is not valid JSON"
            );
        }
    }

    #[tokio::test]
    async fn deeply_nested_payload_is_never_written() {
        let store = Arc::new(RecordingStore::default());
        let handler = handler_with(store.clone());

        let result = handler
            .handle(&test_identity("rider-1"), nested(40).as_bytes())
            .await;

        assert!(matches!(
            result,
            Err(RideError::Validation(ValidationError::BadPayload { .. }))
        ));
        assert_eq!(store.attempts(), 0);
    }

    #[test]
    fn ride_created_serializes_camel_case() {
        let created = RideCreated {
            ride_id: RideId::from("abc"),
        };
        assert_eq!(
            serde_json::to_value(&created).unwrap(),
            serde_json::json!({"rideId": "abc"})
        );
    }

    #[tokio::test]
    async fn handle_persists_record_for_subject() {
        let store = Arc::new(RecordingStore::default());
        let handler = handler_with(store.clone());
        let identity = test_identity("rider-1");

        let created = handler
            .handle(&identity, br#"{"PickupLocation":{"Latitude":1.0,"Longitude":2.0}}"#)
            .await
            .unwrap();

        let record = store.get(&created.ride_id).expect("record stored");
        assert_eq!(record.user_id, "rider-1");
        assert_eq!(record.ride_id, created.ride_id);
        assert!(record.payload.contains_key("PickupLocation"));
        assert_eq!(store.attempts(), 1);
    }

    #[tokio::test]
    async fn bad_payload_writes_nothing() {
        let store = Arc::new(RecordingStore::default());
        let handler = handler_with(store.clone());

        let err = handler
            .handle(&test_identity("rider-1"), b"{not json")
            .await
            .unwrap_err();

        assert!(matches!(err, RideError::Validation(_)));
        assert_eq!(store.attempts(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn storage_failure_is_returned() {
        let store = Arc::new(FailingStore::internal());
        let handler = handler_with(store.clone());

        let err = handler
            .handle(&test_identity("rider-1"), b"{}")
            .await
            .unwrap_err();

        assert!(matches!(err, RideError::Storage(StorageError::Internal(_))));
        assert_eq!(store.attempts(), 1);
    }
}
