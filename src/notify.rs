//! Notification delivery to subscriber webhooks and Slack.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::models::{EventKind, Reading, Subscription};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver to every recipient; a failed recipient does not stop the others.
    /// Returns the last error seen, if any.
    async fn send_to(
        &self,
        recipients: &[Subscription],
        event: EventKind,
        payload: &Reading,
    ) -> Result<(), DispatchError>;

    async fn send_to_slack(
        &self,
        webhook_url: &str,
        event: EventKind,
        payload: &Reading,
    ) -> Result<(), DispatchError>;
}

pub struct HttpNotifier {
    http: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(timeout: Duration) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    async fn post(&self, endpoint: &str, body: &serde_json::Value) -> Result<(), DispatchError> {
        let response = self.http.post(endpoint).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Status {
                endpoint: endpoint.to_string(),
                status,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_to(
        &self,
        recipients: &[Subscription],
        event: EventKind,
        payload: &Reading,
    ) -> Result<(), DispatchError> {
        let mut last_error = None;

        for recipient in recipients {
            let body = json!({
                "domain": recipient.domain,
                "event": event,
                "payload": payload,
            });
            match self.post(&recipient.endpoint, &body).await {
                Ok(()) => debug!(subscription = %recipient.id, %event, "notification delivered"),
                Err(e) => {
                    warn!(subscription = %recipient.id, %event, error = %e, "notification failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn send_to_slack(
        &self,
        webhook_url: &str,
        event: EventKind,
        payload: &Reading,
    ) -> Result<(), DispatchError> {
        let body = json!({ "text": slack_text(event, payload) });
        self.post(webhook_url, &body).await
    }
}

fn slack_text(event: EventKind, payload: &Reading) -> String {
    match event {
        EventKind::Finished => format!(
            "{} ({:.0} % of a full batch)",
            event.headline(),
            payload.progress * 100.0
        ),
        _ => event.headline().to_string(),
    }
}
