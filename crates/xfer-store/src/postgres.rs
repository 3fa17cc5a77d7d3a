//! # PostgreSQL Record Store
//!
//! Persists transfer records in the `transfers` table via SQLx.
//!
//! Both conditional primitives are single statements:
//!
//! - insert-if-absent is `INSERT ... ON CONFLICT DO NOTHING`; one affected
//!   row means the key was free.
//! - increment-if-below-limit is a guarded `UPDATE` inside a CTE that also
//!   reads the pre-image, so a refused increment can be classified without
//!   a second round trip. Under READ COMMITTED the `UPDATE` re-checks its
//!   predicate against the latest row version after acquiring the row lock,
//!   which is what keeps the counter from overshooting the limit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use xfer_core::{
    IncrementOutcome, InsertOutcome, RecordStore, RedemptionRejection, StoreError, TransferKey,
    TransferRecord,
};

const BACKEND: &str = "postgres";

/// Connect to PostgreSQL and apply embedded migrations.
pub async fn init_pool(url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

/// Record store backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, migrate, and wrap the pool.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        Ok(Self::new(init_pool(url).await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::unavailable(BACKEND, e)
}

/// Post-statement view of a conditional increment.
#[derive(Debug, sqlx::FromRow)]
struct IncrementRow {
    /// Counter after the update, if the update applied.
    bumped: Option<i32>,
    /// Counter before the update, if the record existed.
    current: Option<i32>,
    expires_at: Option<DateTime<Utc>>,
}

impl IncrementRow {
    fn classify(&self, now: DateTime<Utc>) -> Result<IncrementOutcome, StoreError> {
        if let Some(count) = self.bumped {
            let count = u32::try_from(count)
                .map_err(|_| StoreError::corrupt(BACKEND, format!("negative count {count}")))?;
            return Ok(IncrementOutcome::Incremented { count });
        }
        if self.current.is_none() {
            return Ok(IncrementOutcome::Rejected(RedemptionRejection::Absent));
        }
        match self.expires_at {
            Some(expires_at) if expires_at <= now => {
                Ok(IncrementOutcome::Rejected(RedemptionRejection::Expired))
            }
            _ => Ok(IncrementOutcome::Rejected(RedemptionRejection::Exhausted)),
        }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_if_absent(&self, record: &TransferRecord) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            "INSERT INTO transfers (transfer_key, filename, source_address, expires_at, redemption_count)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (transfer_key) DO NOTHING",
        )
        .bind(record.key.as_str())
        .bind(&record.filename)
        .bind(&record.source_address)
        .bind(record.expires_at)
        .bind(i32::try_from(record.redemption_count).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::AlreadyExists)
        }
    }

    async fn delete_by_key(&self, key: &TransferKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM transfers WHERE transfer_key = $1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn increment_if_below_limit(
        &self,
        key: &TransferKey,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<IncrementOutcome, StoreError> {
        let row = sqlx::query_as::<_, IncrementRow>(
            "WITH target AS (
                 SELECT redemption_count, expires_at FROM transfers WHERE transfer_key = $1
             ), bumped AS (
                 UPDATE transfers SET redemption_count = redemption_count + 1
                 WHERE transfer_key = $1 AND redemption_count < $2 AND expires_at > $3
                 RETURNING redemption_count
             )
             SELECT (SELECT redemption_count FROM bumped) AS bumped,
                    (SELECT redemption_count FROM target) AS current,
                    (SELECT expires_at FROM target) AS expires_at",
        )
        .bind(key.as_str())
        .bind(i32::try_from(limit).unwrap_or(i32::MAX))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        row.classify(now)
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TransferKey>, StoreError> {
        let keys: Vec<String> = sqlx::query_scalar(
            "DELETE FROM transfers WHERE transfer_key IN (
                 SELECT transfer_key FROM transfers
                 WHERE expires_at <= $1
                 ORDER BY expires_at
                 LIMIT $2
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING transfer_key",
        )
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(keys
            .into_iter()
            .filter_map(|raw| match TransferKey::parse(&raw) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(key = %raw, error = %e, "purged row with malformed key");
                    None
                }
            })
            .collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(bumped: Option<i32>, current: Option<i32>, expires_at: Option<DateTime<Utc>>) -> IncrementRow {
        IncrementRow {
            bumped,
            current,
            expires_at,
        }
    }

    #[test]
    fn applied_update_is_incremented() {
        let now = Utc::now();
        let outcome = row(Some(2), Some(1), Some(now + Duration::hours(1)))
            .classify(now)
            .unwrap();
        assert_eq!(outcome, IncrementOutcome::Incremented { count: 2 });
    }

    #[test]
    fn missing_pre_image_is_absent() {
        let outcome = row(None, None, None).classify(Utc::now()).unwrap();
        assert_eq!(outcome, IncrementOutcome::Rejected(RedemptionRejection::Absent));
    }

    #[test]
    fn past_deadline_is_expired() {
        let now = Utc::now();
        let outcome = row(None, Some(0), Some(now)).classify(now).unwrap();
        assert_eq!(outcome, IncrementOutcome::Rejected(RedemptionRejection::Expired));
    }

    #[test]
    fn live_record_at_limit_is_exhausted() {
        let now = Utc::now();
        let outcome = row(None, Some(3), Some(now + Duration::hours(1)))
            .classify(now)
            .unwrap();
        assert_eq!(outcome, IncrementOutcome::Rejected(RedemptionRejection::Exhausted));
    }

    #[test]
    fn negative_counter_is_corrupt() {
        let err = row(Some(-1), Some(-2), None).classify(Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
