use fleetwatch_core::{DeviceId, EventKind, TelemetryEvent};
use serde_json::Value;

use crate::transport::RawMessage;

/// Where a message goes after classification: computer-vision events
/// bypass the rule engine and land directly in the event sink, all
/// other kinds flow through the status path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Events,
    Status,
}

pub fn route(topic: &str, kind: EventKind) -> Route {
    if topic.starts_with("cv/") || kind == EventKind::CvEvent {
        Route::Events
    } else {
        Route::Status
    }
}

/// Produce the canonical event for a decoded message.
///
/// Never fails: unresolvable kinds classify as `unknown`, unresolvable
/// device ids fall back to the `"unknown"` sentinel, and a missing or
/// unparseable timestamp is replaced by the ingestion time.
pub fn normalize(raw: &RawMessage) -> TelemetryEvent {
    let kind = resolve_kind(raw);
    let device_id = resolve_device_id(raw);
    let payload = raw
        .body
        .get("payload")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let timestamp = raw
        .body
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(raw.received_at);

    TelemetryEvent {
        device_id,
        kind,
        payload,
        timestamp,
    }
}

/// Kind resolution order: explicit `type` field, then topic path.
/// An explicit but unrecognized `type` classifies as unknown without
/// falling back to the topic.
fn resolve_kind(raw: &RawMessage) -> EventKind {
    if let Some(kind) = raw.body.get("type").and_then(Value::as_str) {
        return EventKind::from_wire(kind).unwrap_or(EventKind::Unknown);
    }

    let mut segments = raw.topic.splitn(3, '/');
    match (segments.next(), segments.next()) {
        (Some("sensors"), Some(kind)) => EventKind::from_wire(kind).unwrap_or(EventKind::Unknown),
        (Some("parking"), _) => EventKind::Parking,
        (Some("cv"), _) => EventKind::CvEvent,
        _ => EventKind::Unknown,
    }
}

/// Device id fallback chain: `moto_id`, `id`, `vehicle_id`, sentinel.
/// Numeric ids are rendered to their decimal string.
fn resolve_device_id(raw: &RawMessage) -> DeviceId {
    for key in ["moto_id", "id", "vehicle_id"] {
        match raw.body.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return DeviceId::new(s.as_str()),
            Some(Value::Number(n)) => return DeviceId::new(n.to_string()),
            _ => {}
        }
    }
    DeviceId::unknown()
}
