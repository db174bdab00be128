use async_trait::async_trait;
use sqlx::{postgres::PgRow, types::Json, FromRow, Row};

use super::DeviceStore;
use crate::db::DbPool;
use crate::error::StoreError;
use crate::models::{CloudCredentials, DeviceRecord};
use crate::monitor::calibration::Calibration;
use crate::monitor::state::MonitorState;

impl<'r> FromRow<'r, PgRow> for DeviceRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let Json(calibration): Json<Calibration> = row.try_get("calibration")?;
        let Json(state): Json<MonitorState> = row.try_get("state")?;
        let Json(cloud): Json<CloudCredentials> = row.try_get("cloud")?;
        Ok(Self {
            domain: row.try_get("domain")?,
            calibration,
            state,
            cloud,
            slack_url: row.try_get("slack_url")?,
        })
    }
}

pub struct PgDeviceStore {
    pool: DbPool,
    default_calibration: Calibration,
}

impl PgDeviceStore {
    pub fn new(pool: DbPool, default_calibration: Calibration) -> Self {
        Self {
            pool,
            default_calibration,
        }
    }
}

#[async_trait]
impl DeviceStore for PgDeviceStore {
    async fn find_or_create(&self, domain: &str) -> Result<DeviceRecord, StoreError> {
        let fresh = DeviceRecord::new(domain, self.default_calibration.clone());

        sqlx::query(
            r#"
            INSERT INTO devices (domain, calibration, state, cloud)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (domain) DO NOTHING
            "#,
        )
        .bind(domain)
        .bind(Json(&fresh.calibration))
        .bind(Json(&fresh.state))
        .bind(Json(&fresh.cloud))
        .execute(&self.pool)
        .await?;

        self.find(domain)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("device {}", domain)))
    }

    async fn find(&self, domain: &str) -> Result<Option<DeviceRecord>, StoreError> {
        let record = sqlx::query_as::<_, DeviceRecord>(
            r#"
            SELECT domain, calibration, state, cloud, slack_url
            FROM devices
            WHERE domain = $1
            "#,
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn save(&self, record: &DeviceRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO devices (domain, calibration, state, cloud, slack_url, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (domain) DO UPDATE SET
                calibration = EXCLUDED.calibration,
                state = EXCLUDED.state,
                cloud = EXCLUDED.cloud,
                slack_url = EXCLUDED.slack_url,
                updated_at = NOW()
            "#,
        )
        .bind(&record.domain)
        .bind(Json(&record.calibration))
        .bind(Json(&record.state))
        .bind(Json(&record.cloud))
        .bind(&record.slack_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_domains(&self) -> Result<Vec<String>, StoreError> {
        let domains = sqlx::query_scalar::<_, String>("SELECT domain FROM devices ORDER BY domain")
            .fetch_all(&self.pool)
            .await?;
        Ok(domains)
    }
}
