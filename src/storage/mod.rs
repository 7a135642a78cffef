//! Storage gateway for sensor readings.
//!
//! Follows the Explicit Module Boundary Pattern (EMBP): the rest of the
//! crate only sees the [`ReadingStore`] trait and the two backends exported
//! here. `postgres` is the production store, `memory` backs demos and tests.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{NewReading, Reading, ReadingPatch};

mod memory;
mod postgres;

pub use memory::MemoryReadingStore;
pub use postgres::PgReadingStore;

// ---

/// CRUD contract over the persisted collection of readings.
///
/// Timestamps are unique across the collection: inserts and updates that
/// would duplicate one fail with [`StoreError::DuplicateTimestamp`] and leave
/// existing rows untouched.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// All readings, ascending by timestamp.
    async fn list_readings(&self) -> Result<Vec<Reading>, StoreError>;

    async fn get(&self, id: i64) -> Result<Reading, StoreError>;

    async fn insert(&self, reading: NewReading) -> Result<Reading, StoreError>;

    /// Apply `patch` to reading `id`. Does not recompute the pump decision.
    async fn update(&self, id: i64, patch: ReadingPatch) -> Result<Reading, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

/// Insert `readings` only when the store is empty.
///
/// Returns the number of rows inserted. Duplicate timestamps inside the batch
/// are skipped with a warning rather than aborting the seed.
pub async fn seed_if_empty(
    store: &dyn ReadingStore,
    readings: Vec<NewReading>,
) -> Result<usize, StoreError> {
    // ---
    let existing = store.count().await?;
    if existing > 0 {
        tracing::info!("Store already populated ({} readings), skipping seed", existing);
        return Ok(0);
    }

    tracing::info!("Seeding store with {} readings", readings.len());

    let mut inserted = 0;
    for reading in readings {
        match store.insert(reading).await {
            Ok(_) => inserted += 1,
            Err(StoreError::DuplicateTimestamp(ts)) => {
                tracing::warn!("Skipping seed reading with duplicate timestamp {}", ts);
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!("{} seed readings inserted", inserted);
    Ok(inserted)
}
