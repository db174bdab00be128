use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::schedule::PollTier;
use crate::models::Reading;

/// Running state of one monitored device, persisted after every tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorState {
    /// Sample from the previous successful tick, absent before the first one
    pub previous: Option<Reading>,
    pub current: Option<Reading>,
    /// Baseline of the brew being tracked; `Some` iff a cycle is in progress
    pub start: Option<Reading>,
    pub last_power_off: Option<DateTime<Utc>>,
    pub poll_tier: PollTier,
}

impl MonitorState {
    pub fn is_brewing(&self) -> bool {
        self.start.is_some()
    }

    /// Promote `current` to `previous` once the tick has been persisted.
    pub fn roll(&mut self) {
        if let Some(current) = self.current {
            self.previous = Some(current);
        }
    }
}
