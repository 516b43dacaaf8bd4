use fleetwatch_core::{AlertKind, DeviceId, HealthState};
use fleetwatch_ingest::{MemoryStore, RawMessage, RulesConfig, Store, run_pipeline};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn raw(topic: &str, body: serde_json::Value) -> RawMessage {
    RawMessage {
        topic: topic.into(),
        body: body.as_object().cloned().unwrap_or_default(),
        received_at: jiff::Timestamp::now(),
    }
}

/// End-to-end pass over the in-memory store: low battery flags
/// maintenance, an out-of-fence fix raises an area alert, cv traffic
/// bypasses the rules, and every message lands in the audit log.
#[tokio::test]
async fn pipeline_consolidates_status_and_emits_alerts() {
    let store = MemoryStore::default();
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(run_pipeline(
        rx,
        store.clone(),
        RulesConfig::default(),
        cancel,
    ));

    tx.send(raw(
        "sensors/battery",
        serde_json::json!({"moto_id": "M1", "payload": {"battery": 15.0}}),
    ))
    .await
    .unwrap();
    tx.send(raw(
        "sensors/gps",
        serde_json::json!({"moto_id": "M2", "payload": {"lat": -23.60, "lon": -46.60}}),
    ))
    .await
    .unwrap();
    tx.send(raw(
        "cv/detections",
        serde_json::json!({"moto_id": "M3", "objects": ["person"]}),
    ))
    .await
    .unwrap();
    tx.send(raw(
        "some/other/topic",
        serde_json::json!({"moto_id": "M4", "value": 1}),
    ))
    .await
    .unwrap();

    // Closing the channel drains the loop and stops it.
    drop(tx);
    handle.await.unwrap();

    let m1 = store
        .get_status(&DeviceId::new("M1"))
        .await
        .unwrap()
        .expect("M1 status");
    assert_eq!(m1.status, HealthState::MaintenanceNeeded);
    assert_eq!(m1.battery, Some(15.0));
    assert_eq!(m1.reasons, vec![Box::<str>::from("battery_low (15.0%)")]);

    let m2 = store
        .get_status(&DeviceId::new("M2"))
        .await
        .unwrap()
        .expect("M2 status");
    assert_eq!(m2.status, HealthState::AlertOutOfArea);
    assert_eq!(m2.reasons, vec![Box::<str>::from("out_of_geofence")]);

    // Vision traffic never creates a status record.
    assert!(store.get_status(&DeviceId::new("M3")).await.unwrap().is_none());

    // An unrecognized topic still records the device, with no state
    // change beyond the observation itself.
    let m4 = store
        .get_status(&DeviceId::new("M4"))
        .await
        .unwrap()
        .expect("M4 status");
    assert_eq!(m4.status, HealthState::Unknown);
    assert!(m4.reasons.is_empty());

    let events = store.latest_events(10).await.unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.iter().any(|e| e.kind == AlertKind::MaintenanceAlert
        && e.device_id == DeviceId::new("M1")
        && e.battery == Some(15.0)));
    assert!(events.iter().any(|e| e.kind == AlertKind::GeoAlert
        && e.device_id == DeviceId::new("M2")
        && e.lat == Some(-23.60)));
    assert!(events
        .iter()
        .any(|e| e.kind == AlertKind::CvEvent && e.device_id == DeviceId::new("M3")));

    // Every inbound message was audited verbatim.
    let audit = store.latest_telemetry(10).await.unwrap();
    assert_eq!(audit.len(), 4);
    assert_eq!(audit[0].topic.as_ref(), "some/other/topic");
}

#[tokio::test]
async fn pipeline_applies_events_in_arrival_order() {
    let store = MemoryStore::default();
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(run_pipeline(
        rx,
        store.clone(),
        RulesConfig::default(),
        cancel,
    ));

    tx.send(raw(
        "sensors/battery",
        serde_json::json!({"moto_id": "M1", "payload": {"battery": 10.0}}),
    ))
    .await
    .unwrap();
    tx.send(raw(
        "sensors/battery",
        serde_json::json!({"moto_id": "M1", "payload": {"battery": 90.0}}),
    ))
    .await
    .unwrap();

    drop(tx);
    handle.await.unwrap();

    // The healthy reading arrived last and wins.
    let m1 = store
        .get_status(&DeviceId::new("M1"))
        .await
        .unwrap()
        .expect("M1 status");
    assert_eq!(m1.status, HealthState::Ok);
    assert_eq!(m1.battery, Some(90.0));

    // The earlier low reading still produced its alert.
    let events = store.latest_events(10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AlertKind::MaintenanceAlert);
}

#[tokio::test]
async fn pipeline_stops_on_cancellation() {
    let store = MemoryStore::default();
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(run_pipeline(
        rx,
        store.clone(),
        RulesConfig::default(),
        cancel.clone(),
    ));

    cancel.cancel();
    handle.await.unwrap();

    // Keep tx alive until after the pipeline exits to prove it was the
    // token, not channel closure, that stopped it.
    drop(tx);
}
