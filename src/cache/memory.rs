//! In-memory cache store, for tests and embedding

use std::sync::{Mutex, MutexGuard};

use super::{CacheEntry, CacheError, CacheStore};

/// Keeps the entry in a mutex; not durable
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    slot: Mutex<Slot>,
}

#[derive(Debug, Default)]
struct Slot {
    entry: Option<CacheEntry>,
    writes: usize,
}

impl MemoryCacheStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `entry`
    pub fn with_entry(entry: CacheEntry) -> Self {
        Self {
            slot: Mutex::new(Slot {
                entry: Some(entry),
                writes: 0,
            }),
        }
    }

    /// Number of successful `put` calls
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.lock().entry.clone())
    }

    fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let mut slot = self.lock();
        slot.entry = Some(entry.clone());
        slot.writes += 1;
        Ok(())
    }
}
