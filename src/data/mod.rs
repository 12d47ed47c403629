//! Core data models for the tides updater
//!
//! This module contains the reading that gets cached, the two series it is
//! built from, and the clients that fetch those series from NOAA.

pub mod fetcher;
pub mod noaa;

pub use fetcher::{FetchError, TideDataFetcher, TideSource};
pub use noaa::{NoaaClient, SeriesSource, UpstreamError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// How far in the past the never-fetched sentinel is stamped
const SENTINEL_AGE_SECS: i64 = 10;

/// One of the two data series a reading is assembled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKind {
    /// Latest water temperature observation
    Temperature,
    /// High/low tide predictions
    Tide,
}

impl SeriesKind {
    /// Both series, in the order they are reported
    pub const ALL: [SeriesKind; 2] = [SeriesKind::Temperature, SeriesKind::Tide];

    /// Short lowercase name used in logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Temperature => "temperature",
            SeriesKind::Tide => "tide",
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Both payloads from one successful fetch
#[derive(Debug, Clone, PartialEq)]
pub struct TidePayload {
    /// Water temperature response body
    pub temperature: Value,
    /// Tide predictions response body
    pub tide: Value,
}

impl TidePayload {
    /// Whether both payloads carry data
    pub fn is_valid(&self) -> bool {
        is_non_empty(&self.temperature) && is_non_empty(&self.tide)
    }
}

/// The cached tide reading
///
/// Payloads are kept as the provider's JSON; nothing here interprets them
/// beyond checking they are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TideReading {
    /// Water temperature payload, absent until the first successful fetch
    #[serde(default)]
    pub temperature: Option<Value>,
    /// Tide predictions payload, absent until the first successful fetch
    #[serde(default)]
    pub tide: Option<Value>,
    /// When the payloads were fetched
    pub retrieved_at: DateTime<Utc>,
    /// When the reading stops being fresh
    pub expires_at: DateTime<Utc>,
}

impl TideReading {
    /// The never-fetched reading: no payloads, already expired
    pub fn sentinel(now: DateTime<Utc>) -> Self {
        let past = now
            .checked_sub_signed(Duration::seconds(SENTINEL_AGE_SECS))
            .unwrap_or(now);
        Self {
            temperature: None,
            tide: None,
            retrieved_at: past,
            expires_at: past,
        }
    }

    /// Builds a fresh reading from a successful fetch
    pub fn from_payload(payload: TidePayload, now: DateTime<Utc>, recency: Duration) -> Self {
        Self {
            temperature: Some(payload.temperature),
            tide: Some(payload.tide),
            retrieved_at: now,
            expires_at: expiry(now, recency),
        }
    }

    /// Same payload, new expiry
    pub fn extended(&self, now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            expires_at: expiry(now, window),
            ..self.clone()
        }
    }

    /// Whether `expires_at` has passed
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Whether both payloads are present and non-empty
    pub fn is_valid(&self) -> bool {
        matches!(
            (&self.temperature, &self.tide),
            (Some(t), Some(d)) if is_non_empty(t) && is_non_empty(d)
        )
    }
}

/// `now + window`, saturating at the latest representable time
fn expiry(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Null, `{}`, `[]` and `""` count as empty
pub fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
