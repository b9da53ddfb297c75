//! Test fixtures: a trusted signing key, token minting, and stores that
//! record or fail on demand.
//!
//! Enable the `test-utils` feature to use these from other crates.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::RideApi;
use crate::auth::{JwkSet, JwksCache, JwksConfig, TokenVerifier, VerifiedIdentity, VerifierConfig};
use crate::config::{Config, StorageBackend};
use crate::error::StorageError;
use crate::ride::{RideHandler, RideId, RideRequest};
use crate::storage::{MemoryRideStore, RetryPolicy, RideStore, StorageClient};
use crate::transport::CorsConfig;

/// Key id of the trusted fixture key.
pub const TEST_KEY_ID: &str = "wildrydes-test-key";

pub const TEST_ISSUER: &str = "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_WildRydesTest";

pub const TEST_AUDIENCE: &str = "wildrydes-test-client";

/// Private half of the key published in [`test_jwks`].
pub const TRUSTED_PRIVATE_KEY_PEM: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../docs/fixtures/auth/trusted-private-key.pem"
));

/// A key the verifier has never seen.
pub const UNTRUSTED_PRIVATE_KEY_PEM: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../docs/fixtures/auth/untrusted-private-key.pem"
));

const TEST_JWKS_JSON: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../docs/fixtures/auth/jwks.json"
));

pub fn test_jwks_json() -> &'static str {
    TEST_JWKS_JSON
}

pub fn test_jwks() -> JwkSet {
    serde_json::from_str(TEST_JWKS_JSON).expect("fixture JWKS parses")
}

/// Claims as an identity provider would issue them.
#[derive(Debug, Clone, Serialize)]
pub struct TestClaims {
    pub sub: String,
    pub iss: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl TestClaims {
    /// An ID token for `sub`, valid for the next hour.
    pub fn valid(sub: &str) -> Self {
        Self {
            sub: sub.to_string(),
            iss: TEST_ISSUER.to_string(),
            aud: Some(json!(TEST_AUDIENCE)),
            exp: Utc::now().timestamp() + 3600,
            nbf: None,
            client_id: None,
        }
    }
}

/// Sign `claims` with the trusted fixture key.
pub fn mint_token(claims: &TestClaims) -> String {
    mint_token_with_key(claims, TRUSTED_PRIVATE_KEY_PEM)
}

/// Sign `claims` with an arbitrary RSA key under the trusted key id.
pub fn mint_token_with_key(claims: &TestClaims, private_key_pem: &str) -> String {
    sign(claims, private_key_pem)
}

/// Sign an arbitrary claims document with the trusted fixture key.
pub fn mint_raw_token(claims: &Value) -> String {
    sign(claims, TRUSTED_PRIVATE_KEY_PEM)
}

fn sign<T: Serialize>(claims: &T, private_key_pem: &str) -> String {
    let mut header = Header::new(jsonwebtoken::Algorithm::RS256);
    header.kid = Some(TEST_KEY_ID.to_string());
    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes()).expect("fixture key parses");
    encode(&header, claims, &key).expect("token signs")
}

/// `Authorization` header value for `token`.
pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// A verifier trusting the fixture key. Its cache never needs to fetch.
pub fn test_verifier() -> TokenVerifier {
    let keys = JwksCache::with_keys(
        JwksConfig {
            url: "http://127.0.0.1:9/.well-known/jwks.json".to_string(),
            max_age: Duration::from_secs(3600),
            min_refresh_interval: Duration::from_secs(3600),
            timeout: Duration::from_millis(200),
        },
        &test_jwks(),
    )
    .expect("HTTP client builds");

    TokenVerifier::new(
        VerifierConfig {
            issuer: TEST_ISSUER.to_string(),
            audience: TEST_AUDIENCE.to_string(),
            leeway: Duration::ZERO,
        },
        Arc::new(keys),
    )
}

pub fn test_identity(subject: &str) -> VerifiedIdentity {
    VerifiedIdentity {
        subject: subject.to_string(),
        issuer: TEST_ISSUER.to_string(),
        expires_at: Utc::now() + chrono::Duration::hours(1),
    }
}

pub fn sample_record() -> RideRequest {
    let payload = json!({
        "PickupLocation": {"Latitude": 47.6174755835663, "Longitude": -122.28837066650185}
    });
    RideRequest {
        ride_id: RideId::generate(),
        user_id: "rider-1".to_string(),
        payload: payload.as_object().cloned().unwrap_or_default(),
        created_at: Utc::now(),
    }
}

/// Configuration for the fixture issuer with in-memory storage.
pub fn test_config() -> Config {
    let mut config = Config::new(TEST_ISSUER, TEST_AUDIENCE);
    config.storage_backend = StorageBackend::Memory;
    config
}

/// An API over `store` that trusts the fixture key and retries without delay.
pub fn test_api(store: Arc<dyn RideStore>) -> RideApi {
    let storage = StorageClient::new(store, RetryPolicy::no_delay(3), Duration::from_secs(1));
    RideApi::new(test_verifier(), RideHandler::new(storage), CorsConfig::default())
}

/// In-memory store that counts write attempts.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryRideStore,
    attempts: AtomicUsize,
}

impl RecordingStore {
    pub fn get(&self, ride_id: &RideId) -> Option<RideRequest> {
        self.inner.get(ride_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RideStore for RecordingStore {
    async fn put(&self, record: &RideRequest) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(record).await
    }
}

/// Store that fails every write with the same error.
#[derive(Debug)]
pub struct FailingStore {
    error: StorageError,
    attempts: AtomicUsize,
}

impl FailingStore {
    pub fn unavailable() -> Self {
        Self::with_error(StorageError::Unavailable(
            "simulated ThrottlingException".to_string(),
        ))
    }

    pub fn internal() -> Self {
        Self::with_error(StorageError::Internal(
            "simulated ValidationException".to_string(),
        ))
    }

    fn with_error(error: StorageError) -> Self {
        Self {
            error,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RideStore for FailingStore {
    async fn put(&self, _record: &RideRequest) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Store whose first `n` writes fail as unavailable.
#[derive(Debug)]
pub struct FlakyStore {
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
    inner: MemoryRideStore,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            inner: MemoryRideStore::default(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryRideStore {
        &self.inner
    }
}

#[async_trait]
impl RideStore for FlakyStore {
    async fn put(&self, record: &RideRequest) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StorageError::Unavailable("simulated outage".to_string()));
        }
        self.inner.put(record).await
    }
}

/// Store that takes `delay` to accept each write.
#[derive(Debug)]
pub struct SlowStore {
    delay: Duration,
    attempts: AtomicUsize,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RideStore for SlowStore {
    async fn put(&self, _record: &RideRequest) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Generate a unique request ID for testing.
pub fn test_request_id() -> String {
    format!("test-{}", RideId::generate())
}
