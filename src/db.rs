use crate::error::StoreError;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

pub type DbPool = Pool<Postgres>;

pub async fn connect(url: &str, max_connections: u32) -> Result<DbPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;
    Ok(pool)
}

/// Create tables and indexes if they do not exist yet.
pub async fn ensure_schema(pool: &DbPool) -> Result<(), StoreError> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS devices
        (
            domain      TEXT PRIMARY KEY,
            calibration JSONB       NOT NULL,
            state       JSONB       NOT NULL,
            cloud       JSONB       NOT NULL DEFAULT '{}'::jsonb,
            slack_url   TEXT,
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS event_log
        (
            id     BIGSERIAL PRIMARY KEY,
            domain TEXT        NOT NULL,
            event  TEXT        NOT NULL,
            at     TIMESTAMPTZ NOT NULL,
            params JSONB       NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS event_log_domain_event_at ON event_log (domain, event, at)",
        r#"
        CREATE TABLE IF NOT EXISTS subscriptions
        (
            id       TEXT PRIMARY KEY,
            domain   TEXT   NOT NULL,
            endpoint TEXT   NOT NULL,
            events   TEXT[] NOT NULL DEFAULT '{}'
        )
        "#,
        "CREATE INDEX IF NOT EXISTS subscriptions_domain ON subscriptions (domain)",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("database schema ready");
    Ok(())
}
