//! Per-device calibration and the energy-per-batch estimator.
//!
//! `kwh_per_batch` is a ratchet: it is revised upward whenever a tracked brew
//! has consumed more than the current estimate, and never downward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::Reading;

/// Upper bound for each finishing setting, and so for the deferred `finished` delay.
pub const MAX_FINISHING_SECONDS: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Calibration {
    /// Energy credited to the brew baseline when the boiler starts cold
    pub cold_start_compensation_kwh: f64,
    /// Seconds since the last power-off after which a start counts as cold
    pub cold_start_threshold_seconds: f64,
    /// Draw separating standby from powered
    pub power_on_threshold_watts: f64,
    /// Draw separating powered from actively heating
    pub action_threshold_watts: f64,
    pub finishing_seconds: f64,
    pub finishing_seconds_per_batch: f64,
    pub kwh_per_batch: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            cold_start_compensation_kwh: 0.004,
            cold_start_threshold_seconds: 1200.0,
            power_on_threshold_watts: 5.0,
            action_threshold_watts: 150.0,
            finishing_seconds: 30.0,
            finishing_seconds_per_batch: 90.0,
            kwh_per_batch: 0.136,
        }
    }
}

impl Calibration {
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("coldStartCompensationKwh", self.cold_start_compensation_kwh),
            ("coldStartThresholdSeconds", self.cold_start_threshold_seconds),
            ("powerOnThresholdWatts", self.power_on_threshold_watts),
            ("actionThresholdWatts", self.action_threshold_watts),
            ("finishingSeconds", self.finishing_seconds),
            ("finishingSecondsPerBatch", self.finishing_seconds_per_batch),
            ("kwhPerBatch", self.kwh_per_batch),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number", name));
            }
        }
        for (name, value) in [
            ("finishingSeconds", self.finishing_seconds),
            ("finishingSecondsPerBatch", self.finishing_seconds_per_batch),
        ] {
            if value > MAX_FINISHING_SECONDS {
                return Err(format!("{} must not exceed {}", name, MAX_FINISHING_SECONDS));
            }
        }
        if self.kwh_per_batch == 0.0 {
            return Err("kwhPerBatch must be positive".into());
        }
        if self.action_threshold_watts < self.power_on_threshold_watts {
            return Err("actionThresholdWatts must not be below powerOnThresholdWatts".into());
        }
        Ok(())
    }

    pub fn is_powered(&self, reading: &Reading) -> bool {
        reading.power >= self.power_on_threshold_watts
    }

    pub fn is_heating(&self, reading: &Reading) -> bool {
        reading.power > self.action_threshold_watts
    }

    pub fn is_cold_start(&self, last_power_off: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_power_off {
            None => true,
            Some(at) => {
                let elapsed = (now - at).num_milliseconds() as f64 / 1000.0;
                elapsed > self.cold_start_threshold_seconds
            }
        }
    }

    /// Energy drawn since `start`, ratcheting `kwh_per_batch` up when exceeded,
    /// and the resulting progress fraction.
    pub fn record_batch_energy(&mut self, start: &Reading, current: &Reading) -> f64 {
        let kwh = (current.total - start.total).max(0.0);

        if kwh > self.kwh_per_batch {
            tracing::info!(
                previous = self.kwh_per_batch,
                recalibrated = kwh,
                "batch exceeded kwh_per_batch; recalibrating"
            );
            self.kwh_per_batch = kwh;
        }

        if self.kwh_per_batch > 0.0 {
            kwh / self.kwh_per_batch
        } else {
            0.0
        }
    }

    /// Time from "heating stopped" to "coffee ready", scaled by batch size.
    /// Capped at twice `MAX_FINISHING_SECONDS`.
    pub fn finishing_delay(&self, progress: f64) -> Duration {
        let cap = 2.0 * MAX_FINISHING_SECONDS;
        let secs = self.finishing_seconds + progress.max(0.0) * self.finishing_seconds_per_batch;
        Duration::try_from_secs_f64(secs.clamp(0.0, cap))
            .unwrap_or_else(|_| Duration::from_secs_f64(cap))
    }
}
