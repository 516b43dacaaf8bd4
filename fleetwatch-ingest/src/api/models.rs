use fleetwatch_core::{AlertEvent, DeviceId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ListQueryParams {
    pub limit: Option<usize>,
}

/// Free-text alert registered by an operator against one device.
#[derive(Debug, Deserialize)]
pub struct AlertRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AlertAccepted {
    pub ok: bool,
    pub event: AlertEvent,
}

#[derive(Debug, Serialize)]
pub struct CommandAccepted {
    pub ok: bool,
    pub device_id: DeviceId,
    pub topic: String,
}
