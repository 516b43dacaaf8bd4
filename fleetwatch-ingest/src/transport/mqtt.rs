use std::time::Duration;

use async_trait::async_trait;
use fleetwatch_core::DeviceId;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{CommandPublisher, CommandRequest, RawMessage, TransportListener};

/// Topic filter covering the whole fleet namespace.
const WILDCARD: &str = "#";

const CHANNEL_CAPACITY: usize = 100;
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Open one broker connection and split it into the two halves that
/// use it: the ingest listener and the command publisher. Lifecycle of
/// the connection belongs to the listener task; the publisher only
/// holds a cloned client handle.
pub fn connect(host: &str, port: u16, client_id: &str) -> (MqttListener, MqttCommandPublisher) {
    let mut options = MqttOptions::new(client_id, host, port);
    options.set_keep_alive(Duration::from_secs(30));

    let (client, eventloop) = AsyncClient::new(options, CHANNEL_CAPACITY);

    (
        MqttListener {
            client: client.clone(),
            eventloop: Mutex::new(Some(eventloop)),
        },
        MqttCommandPublisher { client },
    )
}

/// Listener over a persistent MQTT connection with a wildcard
/// subscription. The subscription is re-issued on every ConnAck so it
/// survives broker reconnects.
pub struct MqttListener {
    client: AsyncClient,
    eventloop: Mutex<Option<EventLoop>>,
}

#[derive(Debug, thiserror::Error)]
pub enum MqttListenerError {
    #[error("listener already started")]
    AlreadyStarted,
}

#[async_trait]
impl TransportListener for MqttListener {
    type Error = MqttListenerError;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<RawMessage>, Self::Error> {
        let mut eventloop = self
            .eventloop
            .lock()
            .await
            .take()
            .ok_or(MqttListenerError::AlreadyStarted)?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut backoff = Duration::from_secs(1);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("MQTT listener shutting down");
                        let _ = client.disconnect().await;
                        break;
                    }
                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            backoff = Duration::from_secs(1);
                            match client.subscribe(WILDCARD, QoS::AtMostOnce).await {
                                Ok(()) => info!(filter = WILDCARD, "Connected and subscribed"),
                                Err(e) => warn!(error = %e, "Failed to subscribe after connect"),
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let Some(raw) = decode(&publish.topic, &publish.payload) else {
                                continue;
                            };
                            if tx.send(raw).await.is_err() {
                                info!("Channel closed, MQTT listener shutting down");
                                let _ = client.disconnect().await;
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, backoff_secs = backoff.as_secs(), "MQTT connection error, will retry");
                            tokio::time::sleep(backoff).await;
                            backoff = (backoff * 2).min(MAX_BACKOFF);
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Decode a message body as a JSON object. Anything else is dropped
/// here with a log line and never reaches the pipeline.
fn decode(topic: &str, payload: &[u8]) -> Option<RawMessage> {
    match serde_json::from_slice::<serde_json::Value>(payload) {
        Ok(serde_json::Value::Object(body)) => Some(RawMessage {
            topic: topic.into(),
            body,
            received_at: jiff::Timestamp::now(),
        }),
        Ok(other) => {
            warn!(topic = %topic, kind = other_kind(&other), "Dropping non-object message body");
            None
        }
        Err(e) => {
            warn!(topic = %topic, error = %e, "Dropping undecodable message");
            None
        }
    }
}

fn other_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Command-publishing half of the broker connection.
#[derive(Clone)]
pub struct MqttCommandPublisher {
    client: AsyncClient,
}

#[derive(Debug, thiserror::Error)]
pub enum MqttPublishError {
    #[error("failed to serialize command: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to publish command: {0}")]
    Client(#[from] rumqttc::ClientError),
}

#[async_trait]
impl CommandPublisher for MqttCommandPublisher {
    type Error = MqttPublishError;

    async fn publish_command(
        &self,
        device_id: &DeviceId,
        command: CommandRequest,
    ) -> Result<(), Self::Error> {
        let topic = format!("commands/{device_id}");
        let body = serde_json::to_vec(&serde_json::json!({
            "device_id": device_id,
            "command": command.command,
            "params": command.params,
        }))?;

        self.client
            .publish(topic.clone(), QoS::AtLeastOnce, false, body)
            .await?;

        info!(topic = %topic, "Command published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_accepts_json_objects() {
        let raw = decode("sensors/gps/M1", br#"{"moto_id":"M1","payload":{"lat":1.0}}"#);
        let raw = raw.expect("object body should decode");
        assert_eq!(&*raw.topic, "sensors/gps/M1");
        assert_eq!(raw.body.get("moto_id").and_then(|v| v.as_str()), Some("M1"));
    }

    #[test]
    fn decode_drops_malformed_and_non_object_bodies() {
        assert!(decode("sensors/gps/M1", b"not json").is_none());
        assert!(decode("sensors/gps/M1", b"[1,2,3]").is_none());
        assert!(decode("sensors/gps/M1", b"42").is_none());
    }
}
