pub mod error;
pub mod handlers;
pub mod models;

use axum::{
    Router,
    routing::{get, post},
};

use crate::store::Store;
use crate::transport::CommandPublisher;

/// Shared state for the HTTP API: the store the pipeline writes to and
/// the command-publishing half of the transport connection.
#[derive(Clone)]
pub struct ApiState<S, P> {
    pub store: S,
    pub publisher: P,
}

pub fn router<S, P>(state: ApiState<S, P>) -> Router
where
    S: Store + Clone,
    P: CommandPublisher + Clone,
{
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/status", get(handlers::list_statuses::<S, P>))
        .route("/api/status/{device_id}", get(handlers::get_status::<S, P>))
        .route(
            "/api/telemetry/latest",
            get(handlers::latest_telemetry::<S, P>),
        )
        .route("/api/events/latest", get(handlers::latest_events::<S, P>))
        .route(
            "/api/devices/{device_id}/command",
            post(handlers::send_command::<S, P>),
        )
        .route(
            "/api/devices/{device_id}/alert",
            post(handlers::register_alert::<S, P>),
        )
        .with_state(state)
}
