//! Poll cadence tiers and the per-monitor schedule handle.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Poll period selected by the monitor's current health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollTier {
    #[default]
    Default,
    /// Device reported offline
    Offline,
    /// Unclassified cloud failure
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollIntervals {
    pub default_ms: u64,
    pub offline_ms: u64,
    pub error_ms: u64,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            default_ms: 5_000,
            offline_ms: 300_000,
            error_ms: 900_000,
        }
    }
}

impl PollIntervals {
    pub fn period(&self, tier: PollTier) -> Duration {
        let ms = match tier {
            PollTier::Default => self.default_ms,
            PollTier::Offline => self.offline_ms,
            PollTier::Error => self.error_ms,
        };
        Duration::from_millis(ms.max(1))
    }
}

/// Owned handle to a running poll loop. Dropping it does not stop the loop;
/// call [`PollHandle::cancel`].
#[derive(Debug)]
pub(crate) struct PollHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub(crate) fn new(token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { token, task }
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tiers() {
        let intervals = PollIntervals::default();
        assert_eq!(intervals.period(PollTier::Default), Duration::from_secs(5));
        assert_eq!(intervals.period(PollTier::Offline), Duration::from_secs(300));
        assert_eq!(intervals.period(PollTier::Error), Duration::from_secs(900));
    }

    #[test]
    fn test_tier_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PollTier::Offline).unwrap(), "\"offline\"");
    }

    #[tokio::test]
    async fn test_handle_reports_cancellation() {
        let token = CancellationToken::new();
        let child = token.clone();
        let task = tokio::spawn(async move { child.cancelled().await });
        let handle = PollHandle::new(token, task);

        assert!(handle.is_active());
        handle.cancel();
        assert!(!handle.is_active());
    }
}
