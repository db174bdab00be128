use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DeviceRecord, EventLogEntry};
use crate::monitor::calibration::Calibration;
use crate::monitor::state::MonitorState;

/// Public view of a device. Cloud credentials are never echoed back.
#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub domain: String,
    pub calibration: Calibration,
    pub state: MonitorState,
    pub slack_url: Option<String>,
    pub cloud_configured: bool,
    pub running: bool,
    /// A brew cycle is being tracked
    pub brewing: bool,
}

impl DeviceResponse {
    pub fn new(record: DeviceRecord, running: bool) -> Self {
        Self {
            cloud_configured: record.cloud.has_token(),
            brewing: record.state.is_brewing(),
            domain: record.domain,
            calibration: record.calibration,
            state: record.state,
            slack_url: record.slack_url,
            running,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MonitorStatusResponse {
    pub domain: String,
    pub running: bool,
    /// Whether this request changed the polling state
    pub changed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub events: Vec<EventLogEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub id: String,
    pub endpoint: String,
    pub event: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub app_server_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct DeviceListQuery {
    pub token: String,
    #[serde(default)]
    pub app_server_url: Option<String>,
}
