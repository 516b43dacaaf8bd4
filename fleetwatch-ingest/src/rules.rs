use fleetwatch_core::{
    AlertEvent, AlertKind, DeviceStatus, EventKind, HealthState, JsonMap, TelemetryEvent,
};
use serde::Deserialize;
use serde_json::Value;

/// Acceleration above this marks the device as moving.
const MOVING_ACCEL_THRESHOLD: f64 = 2.5;

/// Inclusive rectangular latitude/longitude bound.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Geofence {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Geofence {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

impl Default for Geofence {
    fn default() -> Self {
        Self {
            min_lat: -23.57,
            max_lat: -23.53,
            min_lon: -46.65,
            max_lon: -46.61,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    /// Battery percentage below which maintenance is flagged.
    pub battery_threshold: f64,
    pub geofence: Geofence,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            battery_threshold: 20.0,
            geofence: Geofence::default(),
        }
    }
}

/// Result of one rule evaluation: the full replacement status record
/// and any alert records to append. Persistence is the caller's job.
#[derive(Debug)]
pub struct Evaluation {
    pub status: DeviceStatus,
    pub alerts: Vec<AlertEvent>,
}

/// Apply the rule matching the event's kind to the device's prior
/// status. Pure in its inputs plus `now`.
///
/// Exactly one rule fires per event and overwrites `status` when its
/// condition holds; there is no priority ordering between rule types,
/// so the most recently processed event decides the current state.
/// Prior snapshot fields persist unless this event overwrites them.
pub fn evaluate(
    event: &TelemetryEvent,
    prior: Option<&DeviceStatus>,
    now: jiff::Timestamp,
    rules: &RulesConfig,
) -> Evaluation {
    let mut status = prior
        .cloned()
        .unwrap_or_else(|| DeviceStatus::new(event.device_id.clone(), now));
    status.last_update = now;

    let mut alerts = Vec::new();

    match event.kind {
        EventKind::Battery => {
            let battery = num_field(&event.payload, "battery");
            status.battery = Some(battery);

            if battery < rules.battery_threshold {
                status.status = HealthState::MaintenanceNeeded;
                status.push_reason(format!("battery_low ({battery:.1}%)"));

                let mut alert =
                    AlertEvent::new(event.device_id.clone(), AlertKind::MaintenanceAlert, now);
                alert.reason = Some("battery_low".into());
                alert.battery = Some(battery);
                alerts.push(alert);
            } else if status.status != HealthState::MaintenanceForced {
                status.status = HealthState::Ok;
            }
        }
        EventKind::Gps => {
            let lat = num_field(&event.payload, "lat");
            let lon = num_field(&event.payload, "lon");
            status.lat = Some(lat);
            status.lng = Some(lon);
            if let Some(speed) = event.payload.get("speed").and_then(Value::as_f64) {
                status.speed = Some(speed);
            }

            if !rules.geofence.contains(lat, lon) {
                status.status = HealthState::AlertOutOfArea;
                status.push_reason("out_of_geofence");

                let mut alert = AlertEvent::new(event.device_id.clone(), AlertKind::GeoAlert, now);
                alert.reason = Some("out_of_geofence".into());
                alert.lat = Some(lat);
                alert.lon = Some(lon);
                alerts.push(alert);
            } else if status.status.is_alert() {
                status.status = HealthState::Ok;
            }
        }
        EventKind::Accel => {
            let accel = num_field(&event.payload, "accel");
            status.accel = Some(accel);
            status.moving = Some(accel > MOVING_ACCEL_THRESHOLD);
        }
        EventKind::Parking => {
            let spot_type = event.payload.get("spot_type").and_then(Value::as_str);
            status.spot_type = spot_type.map(Into::into);

            if spot_type == Some("maintenance") {
                status.status = HealthState::MaintenanceNeeded;
                status.push_reason("parked_in_maintenance_spot");
            }
        }
        EventKind::Diagnostic => {
            let fault = event
                .payload
                .get("fault")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            status.diagnostic = Some(event.payload.clone());

            if fault {
                status.status = HealthState::CriticalFault;
                status.push_reason("diagnostic_fault_detected");

                let mut alert =
                    AlertEvent::new(event.device_id.clone(), AlertKind::CriticalFault, now);
                alert.reason = Some(
                    event
                        .payload
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown_fault")
                        .into(),
                );
                alerts.push(alert);
            }
        }
        // CV events are routed away before evaluation; unknown kinds
        // refresh last_update only.
        EventKind::CvEvent | EventKind::Unknown => {}
    }

    Evaluation { status, alerts }
}

/// Missing or non-numeric fields evaluate as 0 rather than failing.
fn num_field(payload: &JsonMap, key: &str) -> f64 {
    payload.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetwatch_core::DeviceId;

    fn event(kind: EventKind, payload: serde_json::Value) -> TelemetryEvent {
        TelemetryEvent {
            device_id: DeviceId::new("M1"),
            kind,
            payload: payload.as_object().cloned().unwrap_or_default(),
            timestamp: jiff::Timestamp::now(),
        }
    }

    fn now() -> jiff::Timestamp {
        jiff::Timestamp::now()
    }

    #[test]
    fn low_battery_flags_maintenance_and_alerts() {
        let rules = RulesConfig::default();
        let e = event(EventKind::Battery, serde_json::json!({"battery": 15.0}));

        let result = evaluate(&e, None, now(), &rules);

        assert_eq!(result.status.status, HealthState::MaintenanceNeeded);
        assert_eq!(result.status.battery, Some(15.0));
        assert_eq!(result.status.reasons, vec![Box::<str>::from("battery_low (15.0%)")]);

        assert_eq!(result.alerts.len(), 1);
        let alert = &result.alerts[0];
        assert_eq!(alert.kind, AlertKind::MaintenanceAlert);
        assert_eq!(alert.reason.as_deref(), Some("battery_low"));
        assert_eq!(alert.battery, Some(15.0));
    }

    #[test]
    fn healthy_battery_resets_to_ok() {
        let rules = RulesConfig::default();
        let low = evaluate(
            &event(EventKind::Battery, serde_json::json!({"battery": 10.0})),
            None,
            now(),
            &rules,
        );
        let healthy = evaluate(
            &event(EventKind::Battery, serde_json::json!({"battery": 80.0})),
            Some(&low.status),
            now(),
            &rules,
        );

        assert_eq!(healthy.status.status, HealthState::Ok);
        assert!(healthy.alerts.is_empty());
    }

    #[test]
    fn healthy_battery_does_not_clear_forced_maintenance() {
        let rules = RulesConfig::default();
        let mut prior = DeviceStatus::new(DeviceId::new("M1"), now());
        prior.status = HealthState::MaintenanceForced;

        let result = evaluate(
            &event(EventKind::Battery, serde_json::json!({"battery": 80.0})),
            Some(&prior),
            now(),
            &rules,
        );

        assert_eq!(result.status.status, HealthState::MaintenanceForced);
    }

    #[test]
    fn missing_battery_field_defaults_to_zero_and_alerts() {
        let rules = RulesConfig::default();
        let result = evaluate(
            &event(EventKind::Battery, serde_json::json!({"battery": "dead"})),
            None,
            now(),
            &rules,
        );

        assert_eq!(result.status.status, HealthState::MaintenanceNeeded);
        assert_eq!(result.status.battery, Some(0.0));
    }

    #[test]
    fn gps_outside_geofence_raises_area_alert() {
        let rules = RulesConfig::default();
        let e = event(
            EventKind::Gps,
            serde_json::json!({"lat": -23.60, "lon": -46.60, "speed": 12.5}),
        );

        let result = evaluate(&e, None, now(), &rules);

        assert_eq!(result.status.status, HealthState::AlertOutOfArea);
        assert_eq!(result.status.reasons, vec![Box::<str>::from("out_of_geofence")]);
        assert_eq!(result.status.lat, Some(-23.60));
        assert_eq!(result.status.lng, Some(-46.60));
        assert_eq!(result.status.speed, Some(12.5));

        assert_eq!(result.alerts.len(), 1);
        assert_eq!(result.alerts[0].kind, AlertKind::GeoAlert);
        assert_eq!(result.alerts[0].lat, Some(-23.60));
    }

    #[test]
    fn geofence_boundary_is_inclusive() {
        let rules = RulesConfig::default();
        let e = event(
            EventKind::Gps,
            serde_json::json!({"lat": -23.57, "lon": -46.65}),
        );

        let result = evaluate(&e, None, now(), &rules);

        assert_ne!(result.status.status, HealthState::AlertOutOfArea);
        assert!(result.alerts.is_empty());
    }

    #[test]
    fn gps_inside_clears_only_alert_states() {
        let rules = RulesConfig::default();
        let inside = event(
            EventKind::Gps,
            serde_json::json!({"lat": -23.55, "lon": -46.63}),
        );

        let mut out_of_area = DeviceStatus::new(DeviceId::new("M1"), now());
        out_of_area.status = HealthState::AlertOutOfArea;
        let cleared = evaluate(&inside, Some(&out_of_area), now(), &rules);
        assert_eq!(cleared.status.status, HealthState::Ok);

        let mut maintenance = DeviceStatus::new(DeviceId::new("M1"), now());
        maintenance.status = HealthState::MaintenanceNeeded;
        let untouched = evaluate(&inside, Some(&maintenance), now(), &rules);
        assert_eq!(untouched.status.status, HealthState::MaintenanceNeeded);
    }

    #[test]
    fn reprocessing_inside_gps_is_idempotent() {
        let rules = RulesConfig::default();
        let inside = event(
            EventKind::Gps,
            serde_json::json!({"lat": -23.55, "lon": -46.63}),
        );

        let first = evaluate(&inside, None, now(), &rules);
        let mut prior = first.status.clone();
        prior.status = HealthState::Ok;

        let second = evaluate(&inside, Some(&prior), now(), &rules);
        assert_eq!(second.status.status, HealthState::Ok);
        assert!(second.status.reasons.is_empty());
        assert!(second.alerts.is_empty());
    }

    #[test]
    fn repeated_qualifying_events_do_not_duplicate_reasons() {
        let rules = RulesConfig::default();
        let e = event(EventKind::Battery, serde_json::json!({"battery": 15.0}));

        let first = evaluate(&e, None, now(), &rules);
        let second = evaluate(&e, Some(&first.status), now(), &rules);

        assert_eq!(
            second.status.reasons,
            vec![Box::<str>::from("battery_low (15.0%)")]
        );
    }

    #[test]
    fn accel_sets_moving_without_touching_status() {
        let rules = RulesConfig::default();

        let fast = evaluate(
            &event(EventKind::Accel, serde_json::json!({"accel": 3.0})),
            None,
            now(),
            &rules,
        );
        assert_eq!(fast.status.moving, Some(true));
        assert_eq!(fast.status.status, HealthState::Unknown);
        assert!(fast.alerts.is_empty());

        let slow = evaluate(
            &event(EventKind::Accel, serde_json::json!({"accel": 2.5})),
            Some(&fast.status),
            now(),
            &rules,
        );
        assert_eq!(slow.status.moving, Some(false));
    }

    #[test]
    fn maintenance_spot_flags_maintenance() {
        let rules = RulesConfig::default();

        let normal = evaluate(
            &event(EventKind::Parking, serde_json::json!({"spot_type": "normal"})),
            None,
            now(),
            &rules,
        );
        assert_eq!(normal.status.status, HealthState::Unknown);
        assert_eq!(normal.status.spot_type.as_deref(), Some("normal"));

        let maintenance = evaluate(
            &event(
                EventKind::Parking,
                serde_json::json!({"spot_type": "maintenance"}),
            ),
            None,
            now(),
            &rules,
        );
        assert_eq!(maintenance.status.status, HealthState::MaintenanceNeeded);
        assert_eq!(
            maintenance.status.reasons,
            vec![Box::<str>::from("parked_in_maintenance_spot")]
        );
    }

    #[test]
    fn diagnostic_fault_is_critical_with_description() {
        let rules = RulesConfig::default();
        let e = event(
            EventKind::Diagnostic,
            serde_json::json!({"fault": true, "code": "engine_fail", "description": "engine seized"}),
        );

        let result = evaluate(&e, None, now(), &rules);

        assert_eq!(result.status.status, HealthState::CriticalFault);
        assert_eq!(
            result.status.reasons,
            vec![Box::<str>::from("diagnostic_fault_detected")]
        );
        assert_eq!(result.alerts.len(), 1);
        assert_eq!(result.alerts[0].kind, AlertKind::CriticalFault);
        assert_eq!(result.alerts[0].reason.as_deref(), Some("engine seized"));
    }

    #[test]
    fn diagnostic_fault_without_description_defaults() {
        let rules = RulesConfig::default();
        let result = evaluate(
            &event(EventKind::Diagnostic, serde_json::json!({"fault": true})),
            None,
            now(),
            &rules,
        );

        assert_eq!(result.alerts[0].reason.as_deref(), Some("unknown_fault"));
    }

    #[test]
    fn healthy_diagnostic_changes_nothing_but_snapshot() {
        let rules = RulesConfig::default();
        let result = evaluate(
            &event(EventKind::Diagnostic, serde_json::json!({"fault": false})),
            None,
            now(),
            &rules,
        );

        assert_eq!(result.status.status, HealthState::Unknown);
        assert!(result.alerts.is_empty());
        assert!(result.status.diagnostic.is_some());
    }

    #[test]
    fn unknown_kind_does_not_alter_status() {
        let rules = RulesConfig::default();
        let mut prior = DeviceStatus::new(DeviceId::new("M1"), now());
        prior.status = HealthState::Ok;

        let result = evaluate(
            &event(EventKind::Unknown, serde_json::json!({"whatever": 1})),
            Some(&prior),
            now(),
            &rules,
        );

        assert_eq!(result.status.status, HealthState::Ok);
        assert!(result.alerts.is_empty());
    }

    #[test]
    fn snapshot_fields_persist_across_event_kinds() {
        let rules = RulesConfig::default();

        let after_battery = evaluate(
            &event(EventKind::Battery, serde_json::json!({"battery": 55.0})),
            None,
            now(),
            &rules,
        );
        let after_gps = evaluate(
            &event(
                EventKind::Gps,
                serde_json::json!({"lat": -23.55, "lon": -46.63}),
            ),
            Some(&after_battery.status),
            now(),
            &rules,
        );

        assert_eq!(after_gps.status.battery, Some(55.0));
        assert_eq!(after_gps.status.lat, Some(-23.55));
    }
}
