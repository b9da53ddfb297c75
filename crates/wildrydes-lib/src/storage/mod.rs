//! Ride persistence.
//!
//! [`RideStore`] is the narrow key-value contract (`put` only). The
//! [`StorageClient`] wraps a store with a per-attempt timeout and a small,
//! bounded retry loop for [`StorageError::Unavailable`] failures.

mod dynamo;
mod memory;

pub use dynamo::{record_to_item, DynamoRideStore};
pub use memory::MemoryRideStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{Config, StorageBackend};
use crate::error::StorageError;
use crate::ride::RideRequest;

/// Write-only key-value store for ride records, keyed by `RideId`.
///
/// `put` replaces any existing item under the same key in full; it never
/// merges attributes.
#[async_trait]
pub trait RideStore: Send + Sync + std::fmt::Debug {
    async fn put(&self, record: &RideRequest) -> Result<(), StorageError>;
}

/// Bounded exponential backoff for retryable storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_STORAGE_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }

    /// Retry immediately; used by tests.
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Retry-aware wrapper around a [`RideStore`].
#[derive(Debug, Clone)]
pub struct StorageClient {
    store: Arc<dyn RideStore>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl StorageClient {
    pub fn new(store: Arc<dyn RideStore>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            store,
            retry,
            timeout,
        }
    }

    /// Build the configured backend.
    ///
    /// The DynamoDB backend loads AWS credentials and region from the
    /// standard environment/profile chain.
    pub async fn from_config(config: &Config) -> Self {
        let store: Arc<dyn RideStore> = match config.storage_backend {
            StorageBackend::DynamoDb => Arc::new(DynamoRideStore::from_config(config).await),
            StorageBackend::Memory => {
                warn!("using in-memory ride storage; records are lost on exit");
                Arc::new(MemoryRideStore::default())
            }
        };
        info!(
            backend = ?config.storage_backend,
            table = %config.table_name,
            max_attempts = config.storage_max_attempts,
            timeout_ms = config.request_timeout.as_millis() as u64,
            "storage client configured"
        );
        Self::new(
            store,
            RetryPolicy::new(config.storage_max_attempts),
            config.request_timeout,
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Write `record`, retrying `Unavailable` failures up to the policy bound.
    ///
    /// Every attempt writes the same record under the same key, so a retry
    /// after an ambiguous failure overwrites rather than duplicates.
    pub async fn put(&self, record: &RideRequest) -> Result<(), StorageError> {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, self.store.put(record)).await {
                Ok(result) => result,
                Err(_) => Err(StorageError::Unavailable(format!(
                    "write timed out after {} ms",
                    self.timeout.as_millis()
                ))),
            };

            match result {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(ride_id = %record.ride_id, attempt, "write succeeded after retry");
                    }
                    return Ok(());
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        ride_id = %record.ride_id,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying ride write"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
