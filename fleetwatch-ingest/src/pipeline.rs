use fleetwatch_core::{AlertEvent, AlertKind, TelemetryRecord};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::normalize::{Route, normalize, route};
use crate::rules::{RulesConfig, evaluate};
use crate::store::Store;
use crate::transport::RawMessage;

/// Drain the listener channel and run the normalize -> evaluate ->
/// persist pass for each message, one at a time.
///
/// This single consumer task owns every read-modify-write of a status
/// record, so two events for the same device can never interleave.
/// Store failures are logged and never stop the loop.
pub async fn run_pipeline<S>(
    mut rx: mpsc::Receiver<RawMessage>,
    store: S,
    rules: RulesConfig,
    cancel: CancellationToken,
) where
    S: Store,
{
    info!("Pipeline started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Pipeline shutting down");
                break;
            }
            message = rx.recv() => {
                let Some(raw) = message else {
                    info!("Listener channel closed, pipeline shutting down");
                    break;
                };
                process_message(raw, &store, &rules).await;
            }
        }
    }
}

async fn process_message<S: Store>(raw: RawMessage, store: &S, rules: &RulesConfig) {
    // Pass-through audit copy, appended before any interpretation.
    let record = TelemetryRecord {
        topic: raw.topic.clone(),
        received_at: raw.received_at,
        body: raw.body.clone(),
    };
    if let Err(e) = store.insert_telemetry(record).await {
        error!(error = %e, topic = %raw.topic, "Failed to append telemetry record");
    }

    let event = normalize(&raw);
    debug!(device_id = %event.device_id, kind = ?event.kind, topic = %raw.topic, "Message normalized");

    match route(&raw.topic, event.kind) {
        Route::Events => {
            let mut cv = AlertEvent::new(event.device_id.clone(), AlertKind::CvEvent, event.timestamp);
            cv.payload = Some(event.payload);

            if let Err(e) = store.insert_event(cv).await {
                error!(error = %e, device_id = %event.device_id, "Failed to append cv event");
            }
        }
        Route::Status => {
            let prior = match store.get_status(&event.device_id).await {
                Ok(prior) => prior,
                Err(e) => {
                    error!(error = %e, device_id = %event.device_id, "Failed to read device status");
                    return;
                }
            };

            let evaluation = evaluate(&event, prior.as_ref(), jiff::Timestamp::now(), rules);
            let new_state = evaluation.status.status;

            if let Err(e) = store.upsert_status(evaluation.status).await {
                error!(error = %e, device_id = %event.device_id, "Failed to upsert device status");
            } else {
                debug!(device_id = %event.device_id, status = ?new_state, "Device status updated");
            }

            for alert in evaluation.alerts {
                info!(
                    device_id = %alert.device_id,
                    kind = ?alert.kind,
                    reason = alert.reason.as_deref().unwrap_or(""),
                    "Alert emitted"
                );
                if let Err(e) = store.insert_event(alert).await {
                    error!(error = %e, device_id = %event.device_id, "Failed to append alert event");
                }
            }
        }
    }
}
