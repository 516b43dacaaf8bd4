use axum::{
    Json,
    extract::{Path, Query, State},
};
use fleetwatch_core::{AlertEvent, AlertKind, DeviceId, DeviceStatus, TelemetryRecord};
use tracing::info;

use crate::api::ApiState;
use crate::api::error::ApiError;
use crate::api::models::{AlertAccepted, AlertRequest, CommandAccepted, ListQueryParams};
use crate::store::Store;
use crate::transport::{CommandPublisher, CommandRequest};

const DEFAULT_LIMIT: usize = 100;

pub async fn health() -> &'static str {
    "OK"
}

/// Consolidated status of every observed device.
pub async fn list_statuses<S, P>(
    State(state): State<ApiState<S, P>>,
    Query(params): Query<ListQueryParams>,
) -> Result<Json<Vec<DeviceStatus>>, ApiError>
where
    S: Store + Clone,
    P: CommandPublisher + Clone,
{
    let statuses = state
        .store
        .list_statuses(params.limit.unwrap_or(DEFAULT_LIMIT))
        .await
        .map_err(|e| ApiError::InternalServerError(format!("Failed to list statuses: {e}")))?;

    Ok(Json(statuses))
}

/// Status of one device; 404 when the device has never been observed.
pub async fn get_status<S, P>(
    Path(device_id): Path<String>,
    State(state): State<ApiState<S, P>>,
) -> Result<Json<DeviceStatus>, ApiError>
where
    S: Store + Clone,
    P: CommandPublisher + Clone,
{
    let device_id = DeviceId::new(device_id);
    let status = state
        .store
        .get_status(&device_id)
        .await
        .map_err(|e| ApiError::InternalServerError(format!("Failed to get status: {e}")))?;

    match status {
        Some(status) => Ok(Json(status)),
        None => Err(ApiError::NotFound("Device not found".to_string())),
    }
}

/// Most recent raw-telemetry audit records.
pub async fn latest_telemetry<S, P>(
    State(state): State<ApiState<S, P>>,
    Query(params): Query<ListQueryParams>,
) -> Result<Json<Vec<TelemetryRecord>>, ApiError>
where
    S: Store + Clone,
    P: CommandPublisher + Clone,
{
    let records = state
        .store
        .latest_telemetry(params.limit.unwrap_or(DEFAULT_LIMIT))
        .await
        .map_err(|e| ApiError::InternalServerError(format!("Failed to list telemetry: {e}")))?;

    Ok(Json(records))
}

/// Most recent alert/event records (rule alerts, cv events, manual
/// alerts).
pub async fn latest_events<S, P>(
    State(state): State<ApiState<S, P>>,
    Query(params): Query<ListQueryParams>,
) -> Result<Json<Vec<AlertEvent>>, ApiError>
where
    S: Store + Clone,
    P: CommandPublisher + Clone,
{
    let events = state
        .store
        .latest_events(params.limit.unwrap_or(DEFAULT_LIMIT))
        .await
        .map_err(|e| ApiError::InternalServerError(format!("Failed to list events: {e}")))?;

    Ok(Json(events))
}

/// Publish a command to one device's control topic.
pub async fn send_command<S, P>(
    Path(device_id): Path<String>,
    State(state): State<ApiState<S, P>>,
    Json(command): Json<CommandRequest>,
) -> Result<Json<CommandAccepted>, ApiError>
where
    S: Store + Clone,
    P: CommandPublisher + Clone,
{
    if command.command.is_empty() {
        return Err(ApiError::BadRequest("Command must not be empty".to_string()));
    }

    let device_id = DeviceId::new(device_id);
    let topic = format!("commands/{device_id}");

    state
        .publisher
        .publish_command(&device_id, command)
        .await
        .map_err(|e| ApiError::BadGateway(format!("Failed to publish command: {e}")))?;

    Ok(Json(CommandAccepted {
        ok: true,
        device_id,
        topic,
    }))
}

/// Register a manual alert against one device.
pub async fn register_alert<S, P>(
    Path(device_id): Path<String>,
    State(state): State<ApiState<S, P>>,
    Json(request): Json<AlertRequest>,
) -> Result<Json<AlertAccepted>, ApiError>
where
    S: Store + Clone,
    P: CommandPublisher + Clone,
{
    let event = register_manual_alert(&state.store, DeviceId::new(device_id), request.message).await?;
    Ok(Json(AlertAccepted { ok: true, event }))
}

/// The device must already have a status record; the alert is an
/// event-collection append only and never touches the status itself.
async fn register_manual_alert<S: Store>(
    store: &S,
    device_id: DeviceId,
    message: String,
) -> Result<AlertEvent, ApiError> {
    let status = store
        .get_status(&device_id)
        .await
        .map_err(|e| ApiError::InternalServerError(format!("Failed to get status: {e}")))?;

    if status.is_none() {
        return Err(ApiError::NotFound("Device not found".to_string()));
    }

    let mut event = AlertEvent::new(device_id, AlertKind::ManualAlert, jiff::Timestamp::now());
    event.reason = Some(message.into());
    event.source = Some("mobile".into());

    store
        .insert_event(event.clone())
        .await
        .map_err(|e| ApiError::InternalServerError(format!("Failed to register alert: {e}")))?;

    info!(device_id = %event.device_id, "Manual alert registered");
    Ok(event)
}
