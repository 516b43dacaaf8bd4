pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use fleetwatch_core::{AlertEvent, DeviceId, DeviceStatus, TelemetryRecord};

/// Keyed-document store consumed by the pipeline and the API.
///
/// Telemetry and event collections are append-only; the status
/// collection is keyed by device id with upsert semantics. The rule
/// engine computes the full replacement record, so `upsert_status`
/// always writes a complete snapshot.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Error type specific to this store implementation
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append a raw-telemetry audit record.
    async fn insert_telemetry(&self, record: TelemetryRecord) -> Result<(), Self::Error>;

    /// Most recent telemetry records, newest first.
    async fn latest_telemetry(&self, limit: usize) -> Result<Vec<TelemetryRecord>, Self::Error>;

    /// Append an alert/event record.
    async fn insert_event(&self, event: AlertEvent) -> Result<(), Self::Error>;

    /// Most recent event records, newest first.
    async fn latest_events(&self, limit: usize) -> Result<Vec<AlertEvent>, Self::Error>;

    /// Current consolidated status for one device, if ever observed.
    async fn get_status(&self, device_id: &DeviceId) -> Result<Option<DeviceStatus>, Self::Error>;

    /// Create or replace the consolidated status for a device.
    async fn upsert_status(&self, status: DeviceStatus) -> Result<(), Self::Error>;

    /// Consolidated statuses across the fleet, most recently updated
    /// first.
    async fn list_statuses(&self, limit: usize) -> Result<Vec<DeviceStatus>, Self::Error>;
}
