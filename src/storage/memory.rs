//! In-memory reading store.
//!
//! Used by `--memory` demo runs and by tests. Enforces the same timestamp
//! uniqueness and not-found semantics as the postgres store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::ReadingStore;
use crate::error::StoreError;
use crate::models::{NewReading, Reading, ReadingPatch};

// ---

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    rows: BTreeMap<i64, Reading>,
}

/// Mutex-guarded map of readings keyed by id.
#[derive(Debug, Default)]
pub struct MemoryReadingStore {
    inner: Mutex<Inner>,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave a half-written row.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn timestamp_taken(&self, ts: chrono::DateTime<chrono::Utc>, except: Option<i64>) -> bool {
        self.rows
            .values()
            .any(|r| r.timestamp == ts && Some(r.id) != except)
    }
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn list_readings(&self) -> Result<Vec<Reading>, StoreError> {
        // ---
        let inner = self.lock();
        let mut rows: Vec<Reading> = inner.rows.values().cloned().collect();
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }

    async fn get(&self, id: i64) -> Result<Reading, StoreError> {
        self.lock()
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn insert(&self, reading: NewReading) -> Result<Reading, StoreError> {
        // ---
        let mut inner = self.lock();
        if inner.timestamp_taken(reading.timestamp, None) {
            return Err(StoreError::DuplicateTimestamp(reading.timestamp));
        }

        inner.next_id += 1;
        let id = inner.next_id;
        let stored = reading.into_reading(id);
        inner.rows.insert(id, stored.clone());

        tracing::debug!("Inserted reading {}", id);
        Ok(stored)
    }

    async fn update(&self, id: i64, patch: ReadingPatch) -> Result<Reading, StoreError> {
        // ---
        let mut inner = self.lock();
        if !inner.rows.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        if let Some(ts) = patch.timestamp {
            if inner.timestamp_taken(ts, Some(id)) {
                return Err(StoreError::DuplicateTimestamp(ts));
            }
        }

        let row = inner.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        patch.apply_to(row);
        Ok(row.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        // ---
        self.lock()
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.lock().rows.len())
    }
}
