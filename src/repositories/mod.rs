pub mod devices;
pub mod event_log;
pub mod subscriptions;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{DeviceRecord, EventKind, EventLogEntry, Reading, Subscription};

pub use devices::PgDeviceStore;
pub use event_log::PgEventLog;
pub use subscriptions::PgSubscriptionStore;

/// Persistent device records keyed by domain.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Load the record, creating it with default calibration if unknown.
    async fn find_or_create(&self, domain: &str) -> Result<DeviceRecord, StoreError>;

    async fn find(&self, domain: &str) -> Result<Option<DeviceRecord>, StoreError>;

    async fn save(&self, record: &DeviceRecord) -> Result<(), StoreError>;

    async fn list_domains(&self) -> Result<Vec<String>, StoreError>;
}

/// Append-only log of lifecycle milestones.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(
        &self,
        domain: &str,
        event: EventKind,
        at: DateTime<Utc>,
        params: &Reading,
    ) -> Result<(), StoreError>;

    /// Entries in `[from, to]` ordered by timestamp ascending, optionally only
    /// those whose progress exceeds `min_progress`.
    async fn query(
        &self,
        domain: &str,
        event: EventKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        min_progress: Option<f64>,
    ) -> Result<Vec<EventLogEntry>, StoreError>;
}

/// Notification recipients per domain and event.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find_by_domain_and_event(
        &self,
        domain: &str,
        event: EventKind,
    ) -> Result<Vec<Subscription>, StoreError>;

    /// Add `event` to the subscription, registering it if unknown. Idempotent.
    async fn subscribe(&self, subscription: &Subscription, event: EventKind)
        -> Result<(), StoreError>;

    async fn unsubscribe(&self, id: &str, event: EventKind) -> Result<(), StoreError>;
}
