//! Cache refresh decisions
//!
//! [`RefreshController::refresh`] is the one entry point the trigger calls.
//! It reads the cached reading, and only if it is stale asks the tide source
//! for a new one. A successful fetch replaces the entry; a failed fetch
//! writes the previous payload back with its expiry pushed out by the backoff
//! window, so consumers keep the last good reading and a dead upstream is hit
//! at most once per window.

pub mod scheduler;

pub use scheduler::{activate, deactivate, IntervalScheduler, RefreshTask, Scheduler};

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheEntry, CacheError, CacheStore};
use crate::clock::Clock;
use crate::data::{TideReading, TideSource};

/// Default freshness window after a successful fetch
pub const DEFAULT_RECENCY_MINUTES: i64 = 5;

/// Default expiry extension after a failed fetch
pub const DEFAULT_BACKOFF_MINUTES: i64 = 60;

/// What a call to [`RefreshController::refresh`] did
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Entry was still fresh; nothing fetched, nothing written
    Fresh(CacheEntry),
    /// Fetch succeeded and the new reading replaced the old one
    Refreshed {
        /// The reading now in the cache
        entry: CacheEntry,
        /// Whether the store accepted the write
        persisted: bool,
    },
    /// Fetch failed; previous payload kept with a later expiry
    BackedOff {
        /// The reading now in the cache
        entry: CacheEntry,
        /// Whether the store accepted the write
        persisted: bool,
    },
}

impl RefreshOutcome {
    /// The entry the cache holds after this refresh
    pub fn entry(&self) -> &CacheEntry {
        match self {
            RefreshOutcome::Fresh(entry)
            | RefreshOutcome::Refreshed { entry, .. }
            | RefreshOutcome::BackedOff { entry, .. } => entry,
        }
    }

    /// False only when a write was attempted and the store rejected it
    pub fn persisted(&self) -> bool {
        match self {
            RefreshOutcome::Fresh(_) => true,
            RefreshOutcome::Refreshed { persisted, .. }
            | RefreshOutcome::BackedOff { persisted, .. } => *persisted,
        }
    }

    /// Whether the upstream was contacted
    pub fn fetched(&self) -> bool {
        !matches!(self, RefreshOutcome::Fresh(_))
    }
}

impl fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expires = self.entry().expires_at.to_rfc3339();
        match self {
            RefreshOutcome::Fresh(_) => write!(f, "cache is fresh until {}", expires),
            RefreshOutcome::Refreshed { .. } => {
                write!(f, "fetched new tide data, fresh until {}", expires)
            }
            RefreshOutcome::BackedOff { .. } => write!(
                f,
                "upstream unavailable, kept previous reading until {}",
                expires
            ),
        }?;
        if !self.persisted() {
            write!(f, " (cache not written)")?;
        }
        Ok(())
    }
}

/// Result of reading the store
enum Loaded {
    /// The stored entry, or the sentinel for an empty or corrupt slot
    Entry(CacheEntry),
    /// The store failed to read; the sentinel stands in for whatever it holds
    Unreadable(CacheEntry),
}

impl Loaded {
    fn into_entry(self) -> CacheEntry {
        match self {
            Loaded::Entry(entry) | Loaded::Unreadable(entry) => entry,
        }
    }
}

/// Decides when to refresh the cached reading and what to write back
pub struct RefreshController<S, F> {
    store: S,
    source: F,
    clock: Arc<dyn Clock>,
    recency: Duration,
    backoff: Duration,
}

impl<S: CacheStore, F: TideSource> RefreshController<S, F> {
    /// Creates a controller with the default recency and backoff windows
    pub fn new(store: S, source: F, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            source,
            clock,
            recency: Duration::minutes(DEFAULT_RECENCY_MINUTES),
            backoff: Duration::minutes(DEFAULT_BACKOFF_MINUTES),
        }
    }

    /// Sets how long a successful fetch stays fresh
    pub fn with_recency(mut self, recency: Duration) -> Self {
        self.recency = recency;
        self
    }

    /// Sets how far expiry is pushed out after a failed fetch
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// The store this controller writes to
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The cached reading, or the never-fetched sentinel; never fetches
    pub fn current(&self) -> CacheEntry {
        self.load(self.clock.now()).into_entry()
    }

    /// Runs one refresh cycle
    ///
    /// Reads the cached entry and fetches only if it is stale. A successful
    /// fetch replaces the entry; a failed one writes the previous payload
    /// back with its expiry pushed out by the backoff window.
    ///
    /// If the store could not be read at all, a failed fetch writes nothing:
    /// the slot may still hold a good reading that a backoff write of the
    /// sentinel would destroy.
    ///
    /// # Returns
    /// What happened, including whether the store accepted the write. Never
    /// fails: upstream errors turn into backoff, store errors are logged and
    /// reported through [`RefreshOutcome::persisted`]. Safe to call
    /// concurrently; overlapping writes are last-writer-wins.
    pub async fn refresh(&self) -> RefreshOutcome {
        let now = self.clock.now();
        let loaded = self.load(now);
        let readable = !matches!(loaded, Loaded::Unreadable(_));
        let previous = loaded.into_entry();

        if !previous.is_stale(now) {
            debug!(expires_at = %previous.expires_at, "cache is fresh, skipping fetch");
            return RefreshOutcome::Fresh(previous);
        }

        debug!(expires_at = %previous.expires_at, "cache is stale, fetching");

        match self.source.fetch().await {
            Ok(payload) => {
                let now = self.clock.now();
                let entry = TideReading::from_payload(payload, now, self.recency);
                let persisted = self.save(&entry);
                info!(expires_at = %entry.expires_at, "cached fresh tide data");
                RefreshOutcome::Refreshed { entry, persisted }
            }
            Err(e) => {
                let now = self.clock.now();
                let entry = previous.extended(now, self.backoff);
                let persisted = if readable {
                    self.save(&entry)
                } else {
                    warn!("cache was unreadable, leaving it untouched");
                    false
                };
                warn!(
                    error = %e,
                    retrieved_at = %entry.retrieved_at,
                    expires_at = %entry.expires_at,
                    "tide fetch failed, extending previous reading"
                );
                RefreshOutcome::BackedOff { entry, persisted }
            }
        }
    }

    fn load(&self, now: DateTime<Utc>) -> Loaded {
        match self.store.get() {
            Ok(Some(entry)) => Loaded::Entry(entry),
            Ok(None) => Loaded::Entry(TideReading::sentinel(now)),
            Err(e @ CacheError::Serialization(_)) => {
                warn!(error = %e, "cached entry is corrupt, treating as empty");
                Loaded::Entry(TideReading::sentinel(now))
            }
            Err(e) => {
                warn!(error = %e, "could not read cache, treating as empty");
                Loaded::Unreadable(TideReading::sentinel(now))
            }
        }
    }

    fn save(&self, entry: &CacheEntry) -> bool {
        match self.store.put(entry) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "failed to write tide cache");
                false
            }
        }
    }
}
