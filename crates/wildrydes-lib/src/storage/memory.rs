use async_trait::async_trait;
use dashmap::DashMap;

use super::RideStore;
use crate::error::StorageError;
use crate::ride::{RideId, RideRequest};

/// Process-local [`RideStore`] for development and tests.
#[derive(Debug, Default)]
pub struct MemoryRideStore {
    rides: DashMap<RideId, RideRequest>,
}

impl MemoryRideStore {
    pub fn get(&self, ride_id: &RideId) -> Option<RideRequest> {
        self.rides.get(ride_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.rides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }
}

#[async_trait]
impl RideStore for MemoryRideStore {
    async fn put(&self, record: &RideRequest) -> Result<(), StorageError> {
        self.rides.insert(record.ride_id.clone(), record.clone());
        Ok(())
    }
}
