//! Combined temperature + tide fetch
//!
//! A fetch only counts if both series come back with data. One good series
//! on its own is thrown away.

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use super::noaa::{SeriesSource, UpstreamError};
use super::{is_non_empty, SeriesKind, TidePayload};

/// Why a combined fetch failed
#[derive(Debug, Error)]
pub enum FetchError {
    /// The water temperature series failed
    #[error("temperature fetch failed: {0}")]
    Temperature(#[source] UpstreamError),

    /// The tide predictions series failed
    #[error("tide fetch failed: {0}")]
    Tide(#[source] UpstreamError),

    /// A series came back without data
    #[error("{0} response was empty")]
    EmptyPayload(SeriesKind),
}

/// Something that produces a full tide payload
#[async_trait]
pub trait TideSource: Send + Sync {
    /// Fetches both series; succeeds only if both do
    async fn fetch(&self) -> Result<TidePayload, FetchError>;
}

/// Fetches temperature and tide for one station in parallel
#[derive(Debug, Clone)]
pub struct TideDataFetcher<S> {
    source: S,
    station: String,
}

impl<S: SeriesSource> TideDataFetcher<S> {
    /// Creates a fetcher for `station` on top of a series source
    pub fn new(source: S, station: impl Into<String>) -> Self {
        Self {
            source,
            station: station.into(),
        }
    }

    /// Station this fetcher queries
    pub fn station(&self) -> &str {
        &self.station
    }
}

#[async_trait]
impl<S: SeriesSource> TideSource for TideDataFetcher<S> {
    async fn fetch(&self) -> Result<TidePayload, FetchError> {
        let (temperature, tide) = futures::join!(
            self.source.fetch_series(SeriesKind::Temperature, &self.station),
            self.source.fetch_series(SeriesKind::Tide, &self.station),
        );

        if let Err(ref e) = temperature {
            warn!(station = %self.station, error = %e, "temperature fetch failed");
        }
        if let Err(ref e) = tide {
            warn!(station = %self.station, error = %e, "tide fetch failed");
        }

        let temperature = temperature.map_err(FetchError::Temperature)?;
        let tide = tide.map_err(FetchError::Tide)?;

        if !is_non_empty(&temperature) {
            return Err(FetchError::EmptyPayload(SeriesKind::Temperature));
        }
        if !is_non_empty(&tide) {
            return Err(FetchError::EmptyPayload(SeriesKind::Tide));
        }

        Ok(TidePayload { temperature, tide })
    }
}
