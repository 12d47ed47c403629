//! Single-slot cache for the latest tide reading
//!
//! There is exactly one cached reading per deployment. Stores replace the
//! whole entry on every write; readers see either the old entry or the new
//! one, never a mix.

mod file;
mod memory;

pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;

use std::sync::Arc;
use thiserror::Error;

use crate::data::TideReading;

/// What the cache holds
pub type CacheEntry = TideReading;

/// Errors from reading or writing the cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem read, write or rename failed
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No home directory to derive a cache directory from
    #[error("Could not determine a cache directory")]
    NoCacheDir,
}

/// Durable home of the one cached reading
pub trait CacheStore: Send + Sync {
    /// Returns the stored entry, or `None` if nothing was ever written
    fn get(&self) -> Result<Option<CacheEntry>, CacheError>;

    /// Replaces the stored entry
    fn put(&self, entry: &CacheEntry) -> Result<(), CacheError>;
}

impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    fn get(&self) -> Result<Option<CacheEntry>, CacheError> {
        (**self).get()
    }

    fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        (**self).put(entry)
    }
}
