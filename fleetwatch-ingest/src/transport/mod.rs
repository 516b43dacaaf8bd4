pub mod mock;
pub mod mqtt;

use std::convert::Infallible;

use async_trait::async_trait;
use fleetwatch_core::{DeviceId, JsonMap};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A decoded inbound message. `received_at` is stamped by the
/// listener at ingestion time, never taken from the sender.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub topic: Box<str>,
    pub body: JsonMap,
    pub received_at: jiff::Timestamp,
}

/// Trait for receiving raw messages from the fleet transport.
///
/// Implementations spawn background tasks that send decoded messages
/// to a bounded mpsc channel. The receiver is returned from `start`,
/// and the tasks run until the cancellation token fires.
#[async_trait]
pub trait TransportListener: Send + Sync + 'static {
    /// Error type for this listener implementation.
    type Error: std::error::Error + Send + Sync + 'static;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<RawMessage>, Self::Error>;
}

/// An outbound command destined for one device's control topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub params: JsonMap,
}

/// Capability for sending a command to a specific device.
#[async_trait]
pub trait CommandPublisher: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn publish_command(
        &self,
        device_id: &DeviceId,
        command: CommandRequest,
    ) -> Result<(), Self::Error>;
}

/// Publisher used with the mock transport, where there is no broker
/// to deliver commands to. Accepts and logs every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPublisher;

#[async_trait]
impl CommandPublisher for NullPublisher {
    type Error = Infallible;

    async fn publish_command(
        &self,
        device_id: &DeviceId,
        command: CommandRequest,
    ) -> Result<(), Self::Error> {
        info!(device_id = %device_id, command = %command.command, "Command dropped (no broker configured)");
        Ok(())
    }
}
