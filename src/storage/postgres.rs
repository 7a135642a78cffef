//! PostgreSQL reading store.
//!
//! Owns the `sensor_readings` schema. The unique constraint on `timestamp`
//! is what enforces the one-reading-per-instant rule; unique violations are
//! mapped to [`StoreError::DuplicateTimestamp`].

use async_trait::async_trait;
use sqlx::PgPool;

use super::ReadingStore;
use crate::error::StoreError;
use crate::models::{NewReading, Reading, ReadingPatch};

// ---

const READING_COLUMNS: &str = "id, timestamp, humidity, ph, phosphorus_present, \
     potassium_present, temperature, pump_on, decision_reason";

/// Store backed by a postgres connection pool.
#[derive(Debug, Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist (idempotent).
    ///
    /// Safe to call on every startup. Errors are propagated if any SQL
    /// execution fails.
    pub async fn create_schema(&self) -> Result<(), StoreError> {
        // ---
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sensor_readings (
                id                 BIGSERIAL PRIMARY KEY,
                timestamp          TIMESTAMPTZ      NOT NULL UNIQUE,
                humidity           DOUBLE PRECISION NOT NULL,
                ph                 DOUBLE PRECISION NOT NULL,
                phosphorus_present BOOLEAN          NOT NULL,
                potassium_present  BOOLEAN          NOT NULL,
                temperature        DOUBLE PRECISION,
                pump_on            BOOLEAN          NOT NULL,
                decision_reason    TEXT
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;

        // Analytics scan pump activations in time order
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sensor_readings_pump_on
                ON sensor_readings (pump_on, timestamp);
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!("Schema for sensor_readings verified");
        Ok(())
    }
}

/// Map unique violations on insert/update to a duplicate timestamp error.
fn map_write_error(e: sqlx::Error, ts: chrono::DateTime<chrono::Utc>) -> StoreError {
    // ---
    let unique = e
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);
    if unique {
        StoreError::DuplicateTimestamp(ts)
    } else {
        StoreError::Database(e)
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn list_readings(&self) -> Result<Vec<Reading>, StoreError> {
        // ---
        let rows = sqlx::query_as::<_, Reading>(&format!(
            "SELECT {READING_COLUMNS} FROM sensor_readings ORDER BY timestamp ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!("Loaded {} readings", rows.len());
        Ok(rows)
    }

    async fn get(&self, id: i64) -> Result<Reading, StoreError> {
        // ---
        sqlx::query_as::<_, Reading>(&format!(
            "SELECT {READING_COLUMNS} FROM sensor_readings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))
    }

    async fn insert(&self, reading: NewReading) -> Result<Reading, StoreError> {
        // ---
        let ts = reading.timestamp;
        let stored = sqlx::query_as::<_, Reading>(&format!(
            r#"
            INSERT INTO sensor_readings (
                timestamp, humidity, ph, phosphorus_present,
                potassium_present, temperature, pump_on, decision_reason
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {READING_COLUMNS}
            "#
        ))
        .bind(reading.timestamp)
        .bind(reading.humidity)
        .bind(reading.ph)
        .bind(reading.phosphorus_present)
        .bind(reading.potassium_present)
        .bind(reading.temperature)
        .bind(reading.pump_on)
        .bind(&reading.decision_reason)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, ts))?;

        tracing::debug!("Inserted reading {}", stored.id);
        Ok(stored)
    }

    async fn update(&self, id: i64, patch: ReadingPatch) -> Result<Reading, StoreError> {
        // ---
        let current = self.get(id).await?;
        let ts = patch.timestamp.unwrap_or(current.timestamp);

        sqlx::query_as::<_, Reading>(&format!(
            r#"
            UPDATE sensor_readings SET
                timestamp          = COALESCE($2, timestamp),
                humidity           = COALESCE($3, humidity),
                ph                 = COALESCE($4, ph),
                phosphorus_present = COALESCE($5, phosphorus_present),
                potassium_present  = COALESCE($6, potassium_present),
                temperature        = COALESCE($7, temperature),
                pump_on            = COALESCE($8, pump_on),
                decision_reason    = COALESCE($9, decision_reason)
            WHERE id = $1
            RETURNING {READING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.timestamp)
        .bind(patch.humidity)
        .bind(patch.ph)
        .bind(patch.phosphorus_present)
        .bind(patch.potassium_present)
        .bind(patch.temperature)
        .bind(patch.pump_on)
        .bind(&patch.decision_reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(e, ts))?
        .ok_or(StoreError::NotFound(id))
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        // ---
        let result = sqlx::query("DELETE FROM sensor_readings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        tracing::debug!("Deleted reading {}", id);
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        // ---
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sensor_readings")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}
