use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{EventKind, Reading};
use crate::notify::Notifier;
use crate::repositories::{EventLog, SubscriptionStore};

/// Fans one detected event out to the event log, Slack and subscribers.
/// Failures are logged and never reach the caller.
#[derive(Clone)]
pub struct EventEmitter {
    domain: Arc<str>,
    slack_url: Option<String>,
    event_log: Arc<dyn EventLog>,
    subscriptions: Arc<dyn SubscriptionStore>,
    notifier: Arc<dyn Notifier>,
}

impl EventEmitter {
    pub fn new(
        domain: Arc<str>,
        slack_url: Option<String>,
        event_log: Arc<dyn EventLog>,
        subscriptions: Arc<dyn SubscriptionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            domain,
            slack_url,
            event_log,
            subscriptions,
            notifier,
        }
    }

    pub async fn emit(&self, event: EventKind, reading: &Reading) {
        let domain = &*self.domain;
        info!(
            domain,
            %event,
            power = reading.power,
            total = reading.total,
            progress = reading.progress,
            "coffee maker event"
        );

        if event.is_logged() {
            if let Err(e) = self.event_log.append(domain, event, Utc::now(), reading).await {
                warn!(domain, %event, error = %e, "failed to write event log");
            }
            if let Some(url) = self.slack_url.as_deref() {
                if let Err(e) = self.notifier.send_to_slack(url, event, reading).await {
                    warn!(domain, %event, error = %e, "failed to notify Slack");
                }
            }
        }

        match self.subscriptions.find_by_domain_and_event(domain, event).await {
            Ok(recipients) if recipients.is_empty() => {}
            Ok(recipients) => {
                if let Err(e) = self.notifier.send_to(&recipients, event, reading).await {
                    warn!(domain, %event, error = %e, "failed to notify subscribers");
                }
            }
            Err(e) => warn!(domain, %event, error = %e, "failed to load subscriptions"),
        }
    }
}
