use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{check_record, project, MeasurementStore, QueryOutput, Selection, StoreError};
use crate::{Dimension, MeasureRecord, MeasureValue};

/// Bounded retry for store calls: a fixed number of attempts, each capped by
/// its own timeout, with doubling backoff between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            attempt_timeout: Duration::from_secs(20),
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// PostgreSQL-backed store. All logical tables share the append-only
/// `measurements` table created by `schema::create_schema`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    retry: RetryPolicy,
}

#[derive(sqlx::FromRow)]
struct MeasurementRow {
    time_ms: i64,
    measure_name: String,
    dimensions: Json<Vec<Dimension>>,
    measure_values: Json<Vec<MeasureValue>>,
}

impl From<MeasurementRow> for MeasureRecord {
    fn from(row: MeasurementRow) -> Self {
        MeasureRecord {
            dimensions: row.dimensions.0,
            measure_name: row.measure_name,
            measure_values: row.measure_values.0,
            time_ms: row.time_ms,
        }
    }
}

impl PgStore {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, sqlx::Error>> + Send,
        T: Send,
    {
        // ---
        let max_attempts = self.retry.max_attempts.max(1);
        let mut delay = self.retry.initial_delay;
        let mut attempts = 0;

        loop {
            attempts += 1;

            let error = match timeout(self.retry.attempt_timeout, attempt()).await {
                Ok(Ok(value)) => {
                    if attempts > 1 {
                        debug!("{} succeeded after {} attempts", operation, attempts);
                    }
                    return Ok(value);
                }
                Ok(Err(e)) if !is_transient(&e) => return Err(e.into()),
                Ok(Err(e)) => StoreError::from(e),
                Err(_) => StoreError::Timeout(self.retry.attempt_timeout),
            };

            if attempts >= max_attempts {
                warn!("{} failed after {} attempts: {}", operation, attempts, error);
                return Err(error);
            }

            debug!(
                "{} attempt {} failed, retrying in {:?}: {}",
                operation, attempts, delay, error
            );
            sleep(delay).await;
            delay = (delay * 2).min(self.retry.max_delay);
        }
    }
}

/// Keyed on the per-write `id`, so a retry after an attempt that committed
/// but timed out stores nothing.
const INSERT_MEASUREMENT: &str = r#"
    INSERT INTO measurements (
        id, table_name, time_ms, measure_name, dimensions, measure_values
    ) VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (id) DO NOTHING
"#;

fn is_transient(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_)
    )
}

#[async_trait]
impl MeasurementStore for PgStore {
    async fn write(&self, table: &str, record: &MeasureRecord) -> Result<(), StoreError> {
        // ---
        check_record(record)?;

        let pool = &self.pool;
        let id = Uuid::new_v4();

        self.with_retry("write", move || async move {
            sqlx::query(INSERT_MEASUREMENT)
                .bind(id)
                .bind(table)
                .bind(record.time_ms)
                .bind(&record.measure_name)
                .bind(Json(&record.dimensions))
                .bind(Json(&record.measure_values))
                .execute(pool)
                .await
                .map(|_| ())
        })
        .await
    }

    async fn query(&self, selection: &Selection) -> Result<QueryOutput, StoreError> {
        // ---
        let pool = &self.pool;
        let limit = i64::try_from(selection.limit).unwrap_or(i64::MAX);

        let rows: Vec<MeasurementRow> = self
            .with_retry("query", move || async move {
                sqlx::query_as::<_, MeasurementRow>(
                    r#"
                    SELECT time_ms, measure_name, dimensions, measure_values
                    FROM measurements
                    WHERE table_name = $1
                      AND ($2::BIGINT IS NULL OR time_ms < $2)
                    ORDER BY time_ms DESC, seq DESC
                    LIMIT $3
                    "#,
                )
                .bind(&selection.table)
                .bind(selection.before_ms)
                .bind(limit)
                .fetch_all(pool)
                .await
            })
            .await?;

        let records: Vec<MeasureRecord> = rows.into_iter().map(MeasureRecord::from).collect();
        let newest: Vec<&MeasureRecord> = records.iter().collect();
        Ok(project(&newest, selection.columns.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_transient_errors() {
        // ---
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
        assert!(!is_transient(&sqlx::Error::RowNotFound));
        assert!(!is_transient(&sqlx::Error::PoolClosed));
    }

    #[test]
    fn test_insert_is_idempotent_per_write_id() {
        // ---
        let sql = INSERT_MEASUREMENT.split_whitespace().collect::<Vec<_>>().join(" ");
        assert!(sql.starts_with("INSERT INTO measurements ( id,"));
        assert!(sql.ends_with("ON CONFLICT (id) DO NOTHING"));
    }

    #[test]
    fn test_default_policy_is_bounded() {
        // ---
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(20));
        assert!(policy.initial_delay < policy.max_delay);
    }
}
