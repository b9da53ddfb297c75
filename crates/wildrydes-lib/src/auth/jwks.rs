//! Signing-key cache for the identity provider's JWKS endpoint.
//!
//! Keys are held in an immutable map behind an `Arc`. A refresh builds a new
//! map and swaps it in under the write lock, so readers always see either the
//! old or the new key set. A separate mutex coalesces refreshes: callers that
//! miss the cache queue on it and re-check before fetching. A caller that
//! waited through a failed refresh gets that failure instead of fetching
//! again, and failures are not retried within `min_refresh_interval`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;

/// Only RS256 keys are accepted; Cognito signs every token with RS256.
pub const ALLOWED_ALGORITHMS: &[Algorithm] = &[Algorithm::RS256];

/// Why a signing key could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyLookupError {
    #[error("key id '{0}' not present in JWKS")]
    UnknownKey(String),

    #[error("JWKS fetch failed: {0}")]
    Fetch(String),
}

/// JWKS cache configuration.
#[derive(Debug, Clone)]
pub struct JwksConfig {
    pub url: String,
    /// Keys older than this are refetched on next use.
    pub max_age: Duration,
    /// Minimum gap between refetches triggered by an unknown key id.
    pub min_refresh_interval: Duration,
    /// Bound on a single fetch.
    pub timeout: Duration,
}

impl JwksConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.jwks_url.clone(),
            max_age: config.jwks_max_age,
            min_refresh_interval: config.jwks_min_refresh_interval,
            timeout: config.request_timeout,
        }
    }
}

/// JWKS document (RFC 7517).
#[derive(Debug, Clone, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// A single JSON Web Key.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kid: Option<String>,
    pub kty: String,
    pub n: Option<String>,
    pub e: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    pub alg: Option<String>,
}

impl JwkSet {
    /// Convert usable RSA signing keys into decoding keys indexed by `kid`.
    ///
    /// Keys that are not RSA, not for signatures, use a disallowed algorithm,
    /// or lack a `kid` are skipped.
    pub fn decoding_keys(&self) -> HashMap<String, DecodingKey> {
        let mut keys = HashMap::new();
        for jwk in &self.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
                continue;
            }
            if let Some(alg) = &jwk.alg {
                let allowed = alg
                    .parse::<Algorithm>()
                    .map(|a| ALLOWED_ALGORITHMS.contains(&a))
                    .unwrap_or(false);
                if !allowed {
                    warn!(kid = ?jwk.kid, alg = %alg, "skipping JWKS key with disallowed algorithm");
                    continue;
                }
            }
            let (Some(kid), Some(n), Some(e)) = (&jwk.kid, &jwk.n, &jwk.e) else {
                continue;
            };

            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => {
                    keys.insert(kid.clone(), key);
                }
                Err(err) => {
                    warn!(kid = %kid, error = %err, "failed to parse JWKS key components");
                }
            }
        }
        keys
    }
}

struct CachedKeys {
    keys: Arc<HashMap<String, DecodingKey>>,
    fetched_at: Instant,
}

/// Process-wide cache of the identity provider's signing keys.
pub struct JwksCache {
    state: RwLock<Option<CachedKeys>>,
    /// Serializes refreshes; holds the most recent failed attempt.
    refresh_lock: Mutex<Option<(Instant, KeyLookupError)>>,
    /// Completed refresh attempts, successful or not.
    refresh_attempts: AtomicU64,
    config: JwksConfig,
    client: reqwest::Client,
}

impl JwksCache {
    /// Create an empty cache. Keys are fetched on first use or via [`warm`](Self::warm).
    pub fn new(config: JwksConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            state: RwLock::new(None),
            refresh_lock: Mutex::new(None),
            refresh_attempts: AtomicU64::new(0),
            config,
            client,
        })
    }

    /// Create a cache pre-populated with a key set.
    ///
    /// The cache still refetches from `config.url` once the keys age out or
    /// an unknown key id is presented.
    pub fn with_keys(config: JwksConfig, jwks: &JwkSet) -> Result<Self, reqwest::Error> {
        let mut cache = Self::new(config)?;
        cache.state = RwLock::new(Some(CachedKeys {
            keys: Arc::new(jwks.decoding_keys()),
            fetched_at: Instant::now(),
        }));
        Ok(cache)
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Number of cached keys (zero before the first successful fetch).
    pub async fn key_count(&self) -> usize {
        self.state
            .read()
            .await
            .as_ref()
            .map(|c| c.keys.len())
            .unwrap_or(0)
    }

    /// Fetch the key set now, replacing any cached keys.
    pub async fn warm(&self) -> Result<usize, KeyLookupError> {
        let mut last_failure = self.refresh_lock.lock().await;
        let keys = self.refresh(&mut last_failure).await?;
        Ok(keys.len())
    }

    /// Look up the decoding key for `kid`, fetching the key set if needed.
    pub async fn key(&self, kid: &str) -> Result<DecodingKey, KeyLookupError> {
        if let Some(key) = self.fresh_key(kid).await {
            return Ok(key);
        }

        let seen_attempts = self.refresh_attempts.load(Ordering::Acquire);
        let mut last_failure = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(key) = self.fresh_key(kid).await {
            return Ok(key);
        }

        let (stale, recently_fetched) = {
            let state = self.state.read().await;
            match state.as_ref() {
                Some(cached) => (
                    Some(Arc::clone(&cached.keys)),
                    cached.fetched_at.elapsed() < self.config.min_refresh_interval,
                ),
                None => (None, false),
            }
        };

        // A refresh failed while we waited, or failed too recently to retry.
        if let Some((failed_at, err)) = last_failure.as_ref() {
            let attempted_while_waiting =
                self.refresh_attempts.load(Ordering::Acquire) != seen_attempts;
            if attempted_while_waiting || failed_at.elapsed() < self.config.min_refresh_interval {
                debug!(kid = %kid, "reusing recent JWKS refresh failure");
                return stale_or(stale.as_deref(), kid, err.clone());
            }
        }

        if recently_fetched {
            // Key set is fresh and lacks this kid.
            debug!(kid = %kid, "unknown key id within refresh interval");
            return Err(KeyLookupError::UnknownKey(kid.to_string()));
        }

        match self.refresh(&mut last_failure).await {
            Ok(keys) => keys
                .get(kid)
                .cloned()
                .ok_or_else(|| KeyLookupError::UnknownKey(kid.to_string())),
            Err(err) => stale_or(stale.as_deref(), kid, err),
        }
    }

    async fn fresh_key(&self, kid: &str) -> Option<DecodingKey> {
        let state = self.state.read().await;
        let cached = state.as_ref()?;
        if cached.fetched_at.elapsed() >= self.config.max_age {
            return None;
        }
        cached.keys.get(kid).cloned()
    }

    /// Fetch and swap in a new key set, recording the outcome. Caller passes
    /// the guard of `refresh_lock`.
    async fn refresh(
        &self,
        last_failure: &mut Option<(Instant, KeyLookupError)>,
    ) -> Result<Arc<HashMap<String, DecodingKey>>, KeyLookupError> {
        let result = self.fetch().await;
        *last_failure = result.as_ref().err().map(|e| (Instant::now(), e.clone()));
        self.refresh_attempts.fetch_add(1, Ordering::Release);
        result
    }

    async fn fetch(&self) -> Result<Arc<HashMap<String, DecodingKey>>, KeyLookupError> {
        debug!(url = %self.config.url, "fetching JWKS");

        let response = self
            .client
            .get(&self.config.url)
            .send()
            .await
            .map_err(|e| KeyLookupError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.config.url, status = %status, "JWKS endpoint returned error");
            return Err(KeyLookupError::Fetch(format!("endpoint returned {}", status)));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| KeyLookupError::Fetch(format!("invalid JWKS document: {}", e)))?;

        let keys = Arc::new(jwks.decoding_keys());
        if keys.is_empty() {
            warn!(url = %self.config.url, "JWKS response contained no usable signing keys");
        } else {
            info!(count = keys.len(), "JWKS keys refreshed");
        }

        let mut state = self.state.write().await;
        *state = Some(CachedKeys {
            keys: Arc::clone(&keys),
            fetched_at: Instant::now(),
        });

        Ok(keys)
    }
}

/// Serve `kid` from previously cached keys, or report `err`.
fn stale_or(
    stale: Option<&HashMap<String, DecodingKey>>,
    kid: &str,
    err: KeyLookupError,
) -> Result<DecodingKey, KeyLookupError> {
    match stale.and_then(|keys| keys.get(kid)) {
        Some(key) => {
            warn!(kid = %kid, error = %err, "JWKS refresh failed, using cached key");
            Ok(key.clone())
        }
        None => Err(err),
    }
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("url", &self.config.url)
            .field("max_age", &self.config.max_age)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_jwks, test_jwks_json, TEST_KEY_ID};
    use httpmock::prelude::*;

    fn config(url: String) -> JwksConfig {
        JwksConfig {
            url,
            max_age: Duration::from_secs(3600),
            min_refresh_interval: Duration::ZERO,
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn decoding_keys_skips_unusable_entries() {
        let json = r#"{
            "keys": [
                {"kty": "EC", "kid": "ec-key", "use": "sig"},
                {"kty": "RSA", "kid": "enc-key", "use": "enc", "n": "AQAB", "e": "AQAB"},
                {"kty": "RSA", "kid": "hs-key", "alg": "HS256", "n": "AQAB", "e": "AQAB"},
                {"kty": "RSA", "use": "sig", "n": "AQAB", "e": "AQAB"}
            ]
        }"#;
        let jwks: JwkSet = serde_json::from_str(json).unwrap();
        assert!(jwks.decoding_keys().is_empty());
    }

    #[test]
    fn decoding_keys_accepts_fixture_key() {
        let keys = test_jwks().decoding_keys();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains_key(TEST_KEY_ID));
    }

    #[tokio::test]
    async fn fetches_once_and_serves_from_cache() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/.well-known/jwks.json");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(test_jwks_json());
            })
            .await;
        let cache = JwksCache::new(config(server.url("/.well-known/jwks.json"))).unwrap();

        assert_eq!(cache.key_count().await, 0);
        cache.key(TEST_KEY_ID).await.expect("first lookup fetches");
        cache.key(TEST_KEY_ID).await.expect("second lookup is cached");

        mock.assert_calls_async(1).await;
        assert_eq!(cache.key_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_kid_triggers_refetch_then_fails() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/jwks");
                then.status(200).body(test_jwks_json());
            })
            .await;
        let cache = JwksCache::with_keys(config(server.url("/jwks")), &test_jwks()).unwrap();

        let err = cache.key("rotated-key").await.err().expect("expected key lookup to fail");
        assert_eq!(err, KeyLookupError::UnknownKey("rotated-key".to_string()));
        mock.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn unknown_kid_within_refresh_interval_does_not_refetch() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/jwks");
                then.status(200).body(test_jwks_json());
            })
            .await;
        let mut cfg = config(server.url("/jwks"));
        cfg.min_refresh_interval = Duration::from_secs(60);
        let cache = JwksCache::with_keys(cfg, &test_jwks()).unwrap();

        for _ in 0..5 {
            assert!(cache.key("random-kid").await.is_err());
        }
        mock.assert_calls_async(0).await;
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/jwks");
                then.status(200)
                    .delay(Duration::from_millis(100))
                    .body(test_jwks_json());
            })
            .await;
        let cache = Arc::new(JwksCache::new(config(server.url("/jwks"))).unwrap());

        let lookups = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.key(TEST_KEY_ID).await })
        });
        for handle in lookups.collect::<Vec<_>>() {
            handle.await.unwrap().expect("lookup succeeds");
        }

        mock.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn endpoint_error_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/jwks");
                then.status(500);
            })
            .await;
        let cache = JwksCache::new(config(server.url("/jwks"))).unwrap();

        assert!(matches!(
            cache.key(TEST_KEY_ID).await,
            Err(KeyLookupError::Fetch(_))
        ));
        assert!(cache.warm().await.is_err());
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/jwks");
                then.status(200)
                    .delay(Duration::from_secs(2))
                    .body(test_jwks_json());
            })
            .await;
        let mut cfg = config(server.url("/jwks"));
        cfg.timeout = Duration::from_millis(200);
        let cache = JwksCache::new(cfg).unwrap();

        assert!(matches!(
            cache.key(TEST_KEY_ID).await,
            Err(KeyLookupError::Fetch(_))
        ));
    }

    #[tokio::test]
    async fn waiters_share_a_failed_refresh() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/jwks");
                then.status(200)
                    .delay(Duration::from_secs(5))
                    .body(test_jwks_json());
            })
            .await;
        let mut cfg = config(server.url("/jwks"));
        cfg.timeout = Duration::from_millis(300);
        let cache = Arc::new(JwksCache::new(cfg).unwrap());

        let started = Instant::now();
        let lookups = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.key(TEST_KEY_ID).await })
        });
        for handle in lookups.collect::<Vec<_>>() {
            assert!(matches!(
                handle.await.unwrap(),
                Err(KeyLookupError::Fetch(_))
            ));
        }

        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(900), "took {:?}", elapsed);
        mock.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn failed_refresh_is_not_retried_within_interval() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/jwks");
                then.status(500);
            })
            .await;
        let mut cfg = config(server.url("/jwks"));
        cfg.min_refresh_interval = Duration::from_secs(60);
        let cache = JwksCache::new(cfg).unwrap();

        for _ in 0..3 {
            assert!(matches!(
                cache.key(TEST_KEY_ID).await,
                Err(KeyLookupError::Fetch(_))
            ));
        }
        mock.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn stale_keys_survive_failed_refresh() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/jwks");
                then.status(503);
            })
            .await;
        let mut cfg = config(server.url("/jwks"));
        cfg.max_age = Duration::ZERO;
        let cache = JwksCache::with_keys(cfg, &test_jwks()).unwrap();

        cache
            .key(TEST_KEY_ID)
            .await
            .expect("stale key is used when refresh fails");
    }

    #[tokio::test]
    async fn warm_populates_cache() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/jwks");
                then.status(200).body(test_jwks_json());
            })
            .await;
        let cache = JwksCache::new(config(server.url("/jwks"))).unwrap();

        assert_eq!(cache.warm().await.unwrap(), 1);
        assert_eq!(cache.key_count().await, 1);
    }
}
