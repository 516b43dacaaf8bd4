use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

// We use `Box<str>` for fields that never change after construction.
// This keeps allocations compact and avoids accidental cloning of
// large values.
type BoxStr = Box<str>;

/// An untyped JSON object, the shape sensor payloads arrive in.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Identifier of a fleet device, as reported by the device itself.
///
/// Devices that cannot be identified normalize to the sentinel
/// [`DeviceId::UNKNOWN`] rather than an empty id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub BoxStr);

impl DeviceId {
    /// Sentinel id for messages that carry no resolvable device id.
    pub const UNKNOWN: &str = "unknown";

    pub fn new(id: impl Into<BoxStr>) -> Self {
        Self(id.into())
    }

    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for an appended event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Ulid);

/// Canonical classification of an inbound telemetry message.
///
/// Every raw message resolves to exactly one kind; messages that match
/// nothing resolve to [`EventKind::Unknown`], never to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Gps,
    Accel,
    Battery,
    Parking,
    Diagnostic,
    CvEvent,
    Unknown,
}

impl EventKind {
    /// Parse the wire spelling of a kind (`"gps"`, `"cv_event"`, ...).
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "gps" => Some(Self::Gps),
            "accel" => Some(Self::Accel),
            "battery" => Some(Self::Battery),
            "parking" => Some(Self::Parking),
            "diagnostic" => Some(Self::Diagnostic),
            "cv_event" => Some(Self::CvEvent),
            _ => None,
        }
    }
}

/// A normalized inbound observation, independent of its original
/// topic/transport framing. Transient: produced and consumed within a
/// single pipeline pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Source device, sentinel `"unknown"` when unresolvable.
    pub device_id: DeviceId,
    /// Canonical classification of this event.
    pub kind: EventKind,
    /// Per-kind payload fields, untyped.
    pub payload: JsonMap,
    /// Sender timestamp, or ingestion time when absent.
    pub timestamp: jiff::Timestamp,
}

/// Pass-through audit record of a successfully decoded raw message,
/// appended before any normalization or rule evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Topic the message arrived on.
    pub topic: BoxStr,
    /// Ingestion-time stamp, set by the listener.
    pub received_at: jiff::Timestamp,
    /// The decoded message body, untouched.
    pub body: JsonMap,
}

/// Consolidated health classification of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// No rule has classified this device yet.
    Unknown,
    Ok,
    MaintenanceNeeded,
    /// Maintenance pinned externally; the battery rule never clears it.
    MaintenanceForced,
    AlertOutOfArea,
    CriticalFault,
}

impl HealthState {
    /// Whether this state belongs to the alert class that a
    /// back-inside-geofence gps event is allowed to clear.
    pub fn is_alert(self) -> bool {
        matches!(self, Self::AlertOutOfArea)
    }
}

/// The consolidated per-device status record. Long-lived: created on
/// first observation, updated on every relevant event, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device_id: DeviceId,
    pub status: HealthState,
    /// Human-readable cause strings, deduplicated, insertion order.
    pub reasons: Vec<BoxStr>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub speed: Option<f64>,
    pub battery: Option<f64>,
    pub accel: Option<f64>,
    pub moving: Option<bool>,
    pub spot_type: Option<BoxStr>,
    /// Last diagnostic payload, verbatim.
    pub diagnostic: Option<JsonMap>,
    /// Timestamp of the last rule evaluation that touched this record.
    pub last_update: jiff::Timestamp,
}

impl DeviceStatus {
    /// Fresh record for a device seen for the first time.
    pub fn new(device_id: DeviceId, now: jiff::Timestamp) -> Self {
        Self {
            device_id,
            status: HealthState::Unknown,
            reasons: Vec::new(),
            lat: None,
            lng: None,
            speed: None,
            battery: None,
            accel: None,
            moving: None,
            spot_type: None,
            diagnostic: None,
            last_update: now,
        }
    }

    /// Append a reason unless an identical one is already present.
    pub fn push_reason(&mut self, reason: impl Into<BoxStr>) {
        let reason = reason.into();
        if !self.reasons.iter().any(|r| *r == reason) {
            self.reasons.push(reason);
        }
    }
}

/// Classification of an appended event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    MaintenanceAlert,
    GeoAlert,
    CriticalFault,
    ManualAlert,
    CvEvent,
}

/// An immutable record appended when a rule transition produces a
/// notable condition, a computer-vision event passes through, or an
/// operator registers a manual alert. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: EventId,
    pub device_id: DeviceId,
    pub kind: AlertKind,
    /// Cause string, where the triggering rule defines one.
    pub reason: Option<BoxStr>,
    /// Battery level that triggered a maintenance alert.
    pub battery: Option<f64>,
    /// Coordinates that triggered a geofence alert.
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Canonical payload, carried for pass-through cv events.
    pub payload: Option<JsonMap>,
    /// Origin of a manual alert (e.g. `"mobile"`).
    pub source: Option<BoxStr>,
    pub timestamp: jiff::Timestamp,
}

impl AlertEvent {
    /// New record with only the mandatory fields set.
    pub fn new(device_id: DeviceId, kind: AlertKind, timestamp: jiff::Timestamp) -> Self {
        Self {
            id: EventId(Ulid::new()),
            device_id,
            kind,
            reason: None,
            battery: None,
            lat: None,
            lon: None,
            payload: None,
            source: None,
            timestamp,
        }
    }
}
