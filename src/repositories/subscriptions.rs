use async_trait::async_trait;
use sqlx::FromRow;

use super::SubscriptionStore;
use crate::db::DbPool;
use crate::error::StoreError;
use crate::models::{EventKind, Subscription};

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    id: String,
    domain: String,
    endpoint: String,
    events: Vec<String>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: row.id,
            domain: row.domain,
            endpoint: row.endpoint,
            events: row.events,
        }
    }
}

pub struct PgSubscriptionStore {
    pool: DbPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn find_by_domain_and_event(
        &self,
        domain: &str,
        event: EventKind,
    ) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, domain, endpoint, events
            FROM subscriptions
            WHERE domain = $1 AND $2 = ANY(events)
            ORDER BY id
            "#,
        )
        .bind(domain)
        .bind(event.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn subscribe(
        &self,
        subscription: &Subscription,
        event: EventKind,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, domain, endpoint, events)
            VALUES ($1, $2, $3, ARRAY[$4]::TEXT[])
            ON CONFLICT (id) DO UPDATE SET
                endpoint = EXCLUDED.endpoint,
                events = CASE
                    WHEN $4 = ANY(subscriptions.events) THEN subscriptions.events
                    ELSE array_append(subscriptions.events, $4)
                END
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.domain)
        .bind(&subscription.endpoint)
        .bind(event.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn unsubscribe(&self, id: &str, event: EventKind) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET events = array_remove(events, $2) WHERE id = $1",
        )
        .bind(id)
        .bind(event.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("subscription {}", id)));
        }

        Ok(())
    }
}
