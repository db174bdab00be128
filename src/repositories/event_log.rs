use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, types::Json, FromRow, Row};

use super::EventLog;
use crate::db::DbPool;
use crate::error::StoreError;
use crate::models::{EventKind, EventLogEntry, Reading};

impl<'r> FromRow<'r, PgRow> for EventLogEntry {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let Json(params): Json<Reading> = row.try_get("params")?;
        Ok(Self {
            id: row.try_get("id")?,
            domain: row.try_get("domain")?,
            event: row.try_get("event")?,
            at: row.try_get("at")?,
            params,
        })
    }
}

pub struct PgEventLog {
    pool: DbPool,
}

impl PgEventLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLog for PgEventLog {
    async fn append(
        &self,
        domain: &str,
        event: EventKind,
        at: DateTime<Utc>,
        params: &Reading,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO event_log (domain, event, at, params)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(domain)
        .bind(event.as_str())
        .bind(at)
        .bind(Json(params))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(
        &self,
        domain: &str,
        event: EventKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        min_progress: Option<f64>,
    ) -> Result<Vec<EventLogEntry>, StoreError> {
        let entries = sqlx::query_as::<_, EventLogEntry>(
            r#"
            SELECT id, domain, event, at, params
            FROM event_log
            WHERE domain = $1
              AND event = $2
              AND at BETWEEN $3 AND $4
              AND ($5::DOUBLE PRECISION IS NULL
                   OR (params->>'progress')::DOUBLE PRECISION > $5)
            ORDER BY at ASC, id ASC
            "#,
        )
        .bind(domain)
        .bind(event.as_str())
        .bind(from)
        .bind(to)
        .bind(min_progress)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
