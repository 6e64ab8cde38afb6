//! Database schema management for `sensorflow-ingest`.
//!
//! Ensures the measurement table and its index exist before serving requests.
//! Applied once on startup from `main.rs` when the Postgres backend is selected.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the schema (idempotent).
///
/// Every logical sensor table lives in the single append-only `measurements`
/// table, keyed by `table_name`. Dimensions and measure values are stored as
/// JSONB arrays so each sensor kind keeps its own column set. `seq` breaks
/// ties between records written in the same millisecond; the unique `id`
/// makes a retried insert a no-op.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS measurements (
            seq            BIGSERIAL PRIMARY KEY,
            id             UUID   NOT NULL,
            table_name     TEXT   NOT NULL,
            time_ms        BIGINT NOT NULL,
            measure_name   TEXT   NOT NULL,
            dimensions     JSONB  NOT NULL,
            measure_values JSONB  NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Conflict target for the store's insert; a retried write keeps its id
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_measurements_id
            ON measurements (id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Serves both "newest N" reads and the trend analyzer's history window
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_measurements_table_time
            ON measurements (table_name, time_ms DESC, seq DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
