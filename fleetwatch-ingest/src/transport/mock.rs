use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use fleetwatch_core::JsonMap;
use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{RawMessage, TransportListener};

/// Mock transport that generates fake fleet traffic in-process,
/// shaped like the real topic namespace and payloads. Useful for
/// running the service without a broker.
pub struct MockListener {
    device_count: usize,
    interval: Duration,
}

impl MockListener {
    pub fn new(device_count: usize, interval_secs: u64) -> Self {
        Self {
            device_count,
            interval: Duration::from_secs(interval_secs),
        }
    }
}

#[async_trait]
impl TransportListener for MockListener {
    type Error = Infallible;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<RawMessage>, Self::Error> {
        let (tx, rx) = mpsc::channel(100);

        let mut devices: Vec<MockDevice> = (1..=self.device_count)
            .map(|n| MockDevice::new(format!("MOTO{n}")))
            .collect();
        let interval = self.interval;

        info!(
            device_count = devices.len(),
            interval_secs = interval.as_secs(),
            "Starting mock transport"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Mock transport shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        for device in devices.iter_mut() {
                            for message in device.tick() {
                                if tx.send(message).await.is_err() {
                                    info!("Channel closed, mock transport shutting down");
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// A simulated device with a position random-walking around the city
/// center and a slowly draining battery.
struct MockDevice {
    id: String,
    lat: f64,
    lon: f64,
    battery: f64,
}

impl MockDevice {
    fn new(id: String) -> Self {
        let mut rng = rand::rng();
        Self {
            id,
            lat: -23.550520 + rng.random_range(-0.01..0.01),
            lon: -46.633308 + rng.random_range(-0.01..0.01),
            battery: rng.random_range(30.0..100.0),
        }
    }

    /// One burst of messages: gps, accel, battery, occasionally a
    /// parking report, and a diagnostic frame that is faulty a small
    /// fraction of the time.
    fn tick(&mut self) -> Vec<RawMessage> {
        let mut rng = rand::rng();
        let mut messages = Vec::with_capacity(5);

        self.lat += (rng.random_range(0.0..1.0) - 0.5) * 0.0005;
        self.lon += (rng.random_range(0.0..1.0) - 0.5) * 0.0005;
        messages.push(self.message(
            &format!("sensors/gps/{}", self.id),
            "gps",
            serde_json::json!({
                "lat": self.lat,
                "lon": self.lon,
                "speed": rng.random_range(0.0..40.0),
            }),
        ));

        messages.push(self.message(
            &format!("sensors/accel/{}", self.id),
            "accel",
            serde_json::json!({ "accel": rng.random_range(0.0..3.5) }),
        ));

        self.battery = (self.battery - rng.random_range(0.01..0.2)).max(0.0);
        messages.push(self.message(
            &format!("sensors/battery/{}", self.id),
            "battery",
            serde_json::json!({ "battery": self.battery }),
        ));

        if rng.random_ratio(10, 100) {
            let spot_type = if rng.random_ratio(5, 100) {
                "maintenance"
            } else {
                "normal"
            };
            messages.push(self.message(
                &format!("parking/spot/{}", self.id),
                "parking",
                serde_json::json!({ "spot_type": spot_type }),
            ));
        }

        let diagnostic = match rng.random_range(0..100) {
            0..5 => serde_json::json!({
                "fault": true,
                "code": "engine_fail",
                "severity": "high",
                "description": "critical engine failure",
            }),
            5..15 => serde_json::json!({
                "fault": true,
                "code": "battery_degradation",
                "severity": "medium",
                "description": "battery wear detected",
            }),
            _ => serde_json::json!({ "fault": false }),
        };
        messages.push(self.message(
            &format!("sensors/diagnostic/{}", self.id),
            "diagnostic",
            diagnostic,
        ));

        messages
    }

    fn message(&self, topic: &str, kind: &str, payload: serde_json::Value) -> RawMessage {
        let now = jiff::Timestamp::now();
        let body: JsonMap = serde_json::json!({
            "moto_id": self.id,
            "type": kind,
            "timestamp": now.to_string(),
            "payload": payload,
        })
        .as_object()
        .cloned()
        .unwrap_or_default();

        RawMessage {
            topic: topic.into(),
            body,
            received_at: now,
        }
    }
}
