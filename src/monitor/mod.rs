//! Per-device adaptive monitor.
//!
//! A [`DeviceMonitor`] owns one domain's calibration, state and cloud
//! credentials. Its poll loop samples the emeter, runs the transition logic in
//! [`machine`], emits the resulting events, persists the record and adapts its
//! own cadence to the health of the device and the cloud.

pub mod calibration;
pub mod emitter;
pub mod machine;
pub mod registry;
pub mod schedule;
pub mod state;

use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cloud::{CloudClient, CloudError, Recovery};
use crate::error::ConfigureError;
use crate::models::{DeviceRecord, DeviceUpdate, EventKind};
use crate::notify::Notifier;
use crate::repositories::{DeviceStore, EventLog, SubscriptionStore};

use emitter::EventEmitter;
use machine::PendingFinish;
use schedule::{PollHandle, PollIntervals, PollTier};

pub use registry::MonitorRegistry;

/// Collaborators shared by every monitor in the process.
#[derive(Clone)]
pub struct Services {
    pub cloud: Arc<dyn CloudClient>,
    pub devices: Arc<dyn DeviceStore>,
    pub event_log: Arc<dyn EventLog>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorSettings {
    pub intervals: PollIntervals,
    /// Abort a pending `finished` when the next brew starts
    pub cancel_stale_finished: bool,
}

/// Which branch a tick took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Sample processed; events emitted in this order
    Updated(Vec<EventKind>),
    /// Another tick for this domain was still running
    Skipped,
    /// Token refreshed; the next tick should succeed
    Recovered,
    Backoff(PollTier),
    /// Unrecoverable auth failure; polling stopped
    Stopped,
}

struct MonitorCore {
    record: DeviceRecord,
    pending_finish: Option<JoinHandle<()>>,
}

pub struct DeviceMonitor {
    domain: Arc<str>,
    services: Services,
    settings: MonitorSettings,
    /// Held for the whole tick, which makes ticks non-reentrant.
    core: tokio::sync::Mutex<MonitorCore>,
    schedule: Mutex<Option<PollHandle>>,
}

impl DeviceMonitor {
    pub fn new(record: DeviceRecord, services: Services, settings: MonitorSettings) -> Arc<Self> {
        Arc::new(Self {
            domain: Arc::from(record.domain.as_str()),
            services,
            settings,
            core: tokio::sync::Mutex::new(MonitorCore {
                record,
                pending_finish: None,
            }),
            schedule: Mutex::new(None),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn is_running(&self) -> bool {
        self.schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(PollHandle::is_active)
    }

    /// Copy of the persisted record as of the last completed tick.
    pub async fn snapshot(&self) -> DeviceRecord {
        self.core.lock().await.record.clone()
    }

    /// Merge settings into the live record and persist them. Waits for any
    /// in-flight tick, so the next tick sees the new credentials.
    pub async fn configure(&self, update: DeviceUpdate) -> Result<DeviceRecord, ConfigureError> {
        let mut core = self.core.lock().await;
        let mut record = core.record.clone();
        update.apply(&mut record).map_err(ConfigureError::Invalid)?;

        self.services.devices.save(&record).await?;
        core.record = record;
        info!(domain = %self.domain, "device settings updated");
        Ok(core.record.clone())
    }

    /// Begin polling. Returns `false` if already polling or if no cloud token is
    /// configured.
    pub async fn start(self: &Arc<Self>) -> bool {
        let has_token = self.core.lock().await.record.cloud.has_token();
        if !has_token {
            error!(domain = %self.domain, "no TP-Link cloud token configured; not polling");
            return false;
        }

        let mut schedule = self.schedule.lock().unwrap_or_else(PoisonError::into_inner);
        if schedule.as_ref().is_some_and(PollHandle::is_active) {
            return false;
        }

        info!(domain = %self.domain, "starting polling");
        let token = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(self).poll_loop(token.clone()));
        *schedule = Some(PollHandle::new(token, task));
        true
    }

    /// Cancel future ticks. A tick already in flight runs to completion but does
    /// not re-arm. Returns `false` if nothing was polling.
    pub fn stop(&self) -> bool {
        let handle = self
            .schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match handle {
            Some(handle) if handle.is_active() => {
                handle.cancel();
                info!(domain = %self.domain, "stopped polling");
                true
            }
            _ => false,
        }
    }

    async fn poll_loop(self: Arc<Self>, token: CancellationToken) {
        self.tick().await;

        let mut period = self.current_period().await;
        let mut interval = ticker(period);
        info!(domain = %self.domain, period_ms = period.as_millis() as u64, "polling interval set");

        loop {
            if token.is_cancelled() {
                break;
            }

            let next = self.current_period().await;
            if next != period {
                period = next;
                interval = ticker(period);
                info!(domain = %self.domain, period_ms = period.as_millis() as u64, "polling interval changed");
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            self.tick().await;
        }

        debug!(domain = %self.domain, "poll loop exited");
    }

    async fn current_period(&self) -> std::time::Duration {
        let tier = self.core.lock().await.record.state.poll_tier;
        self.settings.intervals.period(tier)
    }

    /// One unit of polling work. Never runs concurrently with itself for the
    /// same monitor; an overlapping call returns [`TickOutcome::Skipped`].
    pub async fn tick(&self) -> TickOutcome {
        let Ok(mut guard) = self.core.try_lock() else {
            debug!(domain = %self.domain, "previous tick still running; skipping");
            return TickOutcome::Skipped;
        };
        let core = &mut *guard;

        let result = self
            .services
            .cloud
            .get_emeter_status(&core.record.cloud)
            .await;
        let sample = match result {
            Ok(sample) => sample,
            Err(e) => return self.handle_failure(core, e).await,
        };

        let state = &mut core.record.state;
        if state.poll_tier != PollTier::Default {
            info!(domain = %self.domain, from = ?state.poll_tier, "device reachable again; restoring default cadence");
            state.poll_tier = PollTier::Default;
        }

        let transition = machine::apply_sample(
            &mut core.record.calibration,
            &mut core.record.state,
            sample,
            Utc::now(),
        );

        let emitter = self.emitter(core.record.slack_url.clone());
        for emission in &transition.emissions {
            if emission.kind == EventKind::Starting && self.settings.cancel_stale_finished {
                if let Some(pending) = core.pending_finish.take() {
                    if !pending.is_finished() {
                        info!(domain = %self.domain, "new brew started; dropping pending finished");
                    }
                    pending.abort();
                }
            }
            emitter.emit(emission.kind, &emission.reading).await;
        }

        if let Some(finish) = transition.finish {
            core.pending_finish = Some(schedule_finished(emitter, finish));
        }

        if let Err(e) = self.services.devices.save(&core.record).await {
            error!(domain = %self.domain, error = %e, "failed to persist device state");
        }

        core.record.state.roll();
        TickOutcome::Updated(transition.kinds())
    }

    async fn handle_failure(&self, core: &mut MonitorCore, error: CloudError) -> TickOutcome {
        warn!(domain = %self.domain, error = %error, "failed to read emeter");

        match error.recovery() {
            Recovery::RefreshToken => match self.refresh_token(core).await {
                Ok(()) => TickOutcome::Recovered,
                Err(e) => {
                    error!(domain = %self.domain, error = %e, "unable to refresh TP-Link token");
                    self.stop();
                    TickOutcome::Stopped
                }
            },
            Recovery::Backoff(tier) => {
                let state = &mut core.record.state;
                if state.poll_tier != tier {
                    info!(domain = %self.domain, ?tier, "backing off");
                    state.poll_tier = tier;
                }
                TickOutcome::Backoff(tier)
            }
        }
    }

    /// Replaces the credential only when login yields a different token.
    async fn refresh_token(&self, core: &mut MonitorCore) -> Result<(), CloudError> {
        info!(domain = %self.domain, "trying to refresh the access token");

        let token = self.services.cloud.login(&core.record.cloud).await?;
        if core.record.cloud.token.as_deref() == Some(token.as_str()) {
            return Err(CloudError::Auth("login returned the expired token".into()));
        }

        core.record.cloud.token = Some(token);
        if let Err(e) = self.services.devices.save(&core.record).await {
            warn!(domain = %self.domain, error = %e, "failed to persist refreshed token");
        }

        info!(domain = %self.domain, "access token refreshed");
        Ok(())
    }

    fn emitter(&self, slack_url: Option<String>) -> EventEmitter {
        EventEmitter::new(
            Arc::clone(&self.domain),
            slack_url,
            Arc::clone(&self.services.event_log),
            Arc::clone(&self.services.subscriptions),
            Arc::clone(&self.services.notifier),
        )
    }
}

fn ticker(period: std::time::Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

fn schedule_finished(emitter: EventEmitter, finish: PendingFinish) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(finish.delay).await;
        emitter.emit(EventKind::Finished, &finish.reading).await;
    })
}
