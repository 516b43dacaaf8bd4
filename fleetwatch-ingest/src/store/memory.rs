use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use fleetwatch_core::{AlertEvent, DeviceId, DeviceStatus, TelemetryRecord};

use crate::store::Store;

/// In-memory store implementation.
/// This is primarily intended for testing and as a reference
/// implementation of the Store trait.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    telemetry: Vec<TelemetryRecord>,
    events: Vec<AlertEvent>,
    statuses: HashMap<DeviceId, DeviceStatus>,
}

/// Error type for MemoryStore
#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("mutex poisoned: {0}")]
    MutexPoisoned(String),
}

impl<T> From<PoisonError<T>> for MemoryStoreError {
    fn from(err: PoisonError<T>) -> Self {
        MemoryStoreError::MutexPoisoned(err.to_string())
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Error = MemoryStoreError;

    async fn insert_telemetry(&self, record: TelemetryRecord) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock()?;
        inner.telemetry.push(record);
        Ok(())
    }

    async fn latest_telemetry(&self, limit: usize) -> Result<Vec<TelemetryRecord>, Self::Error> {
        let inner = self.inner.lock()?;
        Ok(inner.telemetry.iter().rev().take(limit).cloned().collect())
    }

    async fn insert_event(&self, event: AlertEvent) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock()?;
        inner.events.push(event);
        Ok(())
    }

    async fn latest_events(&self, limit: usize) -> Result<Vec<AlertEvent>, Self::Error> {
        let inner = self.inner.lock()?;
        Ok(inner.events.iter().rev().take(limit).cloned().collect())
    }

    async fn get_status(&self, device_id: &DeviceId) -> Result<Option<DeviceStatus>, Self::Error> {
        let inner = self.inner.lock()?;
        Ok(inner.statuses.get(device_id).cloned())
    }

    async fn upsert_status(&self, status: DeviceStatus) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock()?;
        inner.statuses.insert(status.device_id.clone(), status);
        Ok(())
    }

    async fn list_statuses(&self, limit: usize) -> Result<Vec<DeviceStatus>, Self::Error> {
        let inner = self.inner.lock()?;
        let mut statuses: Vec<DeviceStatus> = inner.statuses.values().cloned().collect();
        statuses.sort_by(|a, b| b.last_update.cmp(&a.last_update));
        statuses.truncate(limit);
        Ok(statuses)
    }
}
