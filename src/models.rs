use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::monitor::calibration::Calibration;
use crate::monitor::state::MonitorState;

/// A point-in-time emeter sample plus the derived brew progress.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    /// Instantaneous draw in watts
    pub power: f64,
    /// Cumulative consumption in kWh
    pub total: f64,
    /// Fraction of the current batch, 0 when no brew is tracked
    #[serde(default)]
    pub progress: f64,
}

impl Reading {
    pub fn new(power: f64, total: f64, progress: f64) -> Self {
        Self {
            power,
            total,
            progress,
        }
    }
}

/// Lifecycle events inferred from the emeter time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    PowerOn,
    PowerOff,
    Starting,
    Progress,
    Finishing,
    Finished,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::PowerOn,
        EventKind::PowerOff,
        EventKind::Starting,
        EventKind::Progress,
        EventKind::Finishing,
        EventKind::Finished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PowerOn => "power-on",
            EventKind::PowerOff => "power-off",
            EventKind::Starting => "starting",
            EventKind::Progress => "progress",
            EventKind::Finishing => "finishing",
            EventKind::Finished => "finished",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Events that are durably logged and forwarded to the Slack webhook.
    pub fn is_logged(&self) -> bool {
        matches!(
            self,
            EventKind::Starting | EventKind::Finished | EventKind::PowerOff
        )
    }

    pub fn headline(&self) -> &'static str {
        match self {
            EventKind::PowerOn => "Coffee maker switched on",
            EventKind::PowerOff => "Coffee maker switched off",
            EventKind::Starting => "Coffee is brewing",
            EventKind::Progress => "Brewing in progress",
            EventKind::Finishing => "Brewing almost done",
            EventKind::Finished => "Coffee is ready",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TP-Link cloud account and device selection for one domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudCredentials {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub app_server_url: Option<String>,
}

impl CloudCredentials {
    pub fn has_token(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Overwrite only the fields present in `update`.
    pub fn merge(&mut self, update: CloudCredentials) {
        let CloudCredentials {
            email,
            password,
            token,
            device_id,
            app_server_url,
        } = update;
        if email.is_some() {
            self.email = email;
        }
        if password.is_some() {
            self.password = password;
        }
        if token.is_some() {
            self.token = token;
        }
        if device_id.is_some() {
            self.device_id = device_id;
        }
        if app_server_url.is_some() {
            self.app_server_url = app_server_url;
        }
    }
}

/// Persisted per-domain record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub domain: String,
    pub calibration: Calibration,
    pub state: MonitorState,
    #[serde(skip_serializing, default)]
    pub cloud: CloudCredentials,
    pub slack_url: Option<String>,
}

impl DeviceRecord {
    pub fn new(domain: impl Into<String>, calibration: Calibration) -> Self {
        Self {
            domain: domain.into(),
            calibration,
            state: MonitorState::default(),
            cloud: CloudCredentials::default(),
            slack_url: None,
        }
    }
}

/// Partial update of a device's settings. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceUpdate {
    #[serde(default)]
    pub cloud: Option<CloudCredentials>,
    #[serde(default)]
    pub slack_url: Option<String>,
    #[serde(default)]
    pub calibration: Option<Calibration>,
}

impl DeviceUpdate {
    /// Validate and merge into `record`. An empty `slack_url` clears it.
    /// `kwh_per_batch` never drops below the value already learned.
    pub fn apply(self, record: &mut DeviceRecord) -> Result<(), String> {
        if let Some(calibration) = &self.calibration {
            calibration.validate()?;
        }

        if let Some(cloud) = self.cloud {
            record.cloud.merge(cloud);
        }
        if let Some(url) = self.slack_url {
            record.slack_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(mut calibration) = self.calibration {
            calibration.kwh_per_batch = calibration
                .kwh_per_batch
                .max(record.calibration.kwh_per_batch);
            record.calibration = calibration;
        }
        Ok(())
    }
}

/// A notification recipient registered for a set of events on a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub domain: String,
    pub endpoint: String,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: i64,
    pub domain: String,
    pub event: String,
    pub at: DateTime<Utc>,
    pub params: Reading,
}
