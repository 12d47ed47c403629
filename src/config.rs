//! Configuration loading
//!
//! Settings come from a TOML file (`tides-updater.toml` by default). Every
//! section and key is optional; anything missing takes its default.
//!
//! ```toml
//! [station]
//! id = "8452660"
//!
//! [refresh]
//! recency = "5 minutes"
//! interval_minutes = 10
//! backoff_minutes = 60
//!
//! [http]
//! timeout_secs = 5
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::data::noaa::{DEFAULT_USER_AGENT, NOAA_BASE_URL};

/// Config file read when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "tides-updater.toml";

/// Newport, RI
pub const DEFAULT_STATION: &str = "8452660";

/// Longest accepted recency, backoff or trigger interval, in minutes (one year)
pub const MAX_WINDOW_MINUTES: u64 = 365 * 24 * 60;

/// Errors from loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for this schema
    #[error("Invalid config file format: {0}")]
    Parse(#[from] toml::de::Error),

    /// `recency` is not something like "5 minutes"
    #[error("Invalid recency '{0}': expected e.g. \"5 minutes\" or \"1 hour\"")]
    InvalidRecency(String),

    /// A numeric setting is out of range
    #[error("Invalid setting: {0}")]
    InvalidValue(String),
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Which NOAA station to query
    pub station: StationConfig,
    /// Cache freshness and trigger cadence
    pub refresh: RefreshSettings,
    /// Upstream HTTP settings
    pub http: HttpConfig,
    /// Where the cache file lives
    pub cache: CacheConfig,
}

/// NOAA station configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StationConfig {
    /// NOAA station ID
    pub id: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_STATION.to_string(),
        }
    }
}

/// Refresh timing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshSettings {
    /// How long a successful fetch stays fresh, e.g. "5 minutes"
    pub recency: String,
    /// Minutes between trigger ticks
    pub interval_minutes: u64,
    /// Minutes a stale entry is extended by after a failed fetch
    pub backoff_minutes: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            recency: "5 minutes".to_string(),
            interval_minutes: 10,
            backoff_minutes: 60,
        }
    }
}

/// Upstream HTTP settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// datagetter endpoint
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: NOAA_BASE_URL.to_string(),
            timeout_secs: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Cache location
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory; the XDG cache directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `tides-updater.toml`
    /// Falls back to defaults if the file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from the specified path
    /// Falls back to defaults if the file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), station = %config.station.id, "loaded configuration");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "using default configuration");
                    Self::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read config file, using defaults");
                Self::default()
            }
        }
    }

    /// Parses and validates a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every derived value can be computed
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.recency()?;
        if self.station.id.trim().is_empty() {
            return Err(ConfigError::InvalidValue("station.id is empty".to_string()));
        }
        self.interval()?;
        self.backoff()?;
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "http.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Freshness window after a successful fetch
    pub fn recency(&self) -> Result<Duration, ConfigError> {
        parse_recency(&self.refresh.recency)
    }

    /// Expiry extension after a failed fetch
    pub fn backoff(&self) -> Result<Duration, ConfigError> {
        let minutes = window_minutes("refresh.backoff_minutes", self.refresh.backoff_minutes)?;
        Ok(Duration::minutes(minutes as i64))
    }

    /// Time between trigger ticks
    pub fn interval(&self) -> Result<StdDuration, ConfigError> {
        let minutes = window_minutes("refresh.interval_minutes", self.refresh.interval_minutes)?;
        Ok(StdDuration::from_secs(minutes * 60))
    }
}

/// Checks a minute count is in `1..=MAX_WINDOW_MINUTES`
fn window_minutes(key: &str, minutes: u64) -> Result<u64, ConfigError> {
    if minutes == 0 {
        return Err(ConfigError::InvalidValue(format!("{} must be greater than zero", key)));
    }
    if minutes > MAX_WINDOW_MINUTES {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be at most {} (one year)",
            key, MAX_WINDOW_MINUTES
        )));
    }
    Ok(minutes)
}

/// Parses a duration like "5 minutes", "+1 hour" or "90 sec"
///
/// # Arguments
/// * `input` - A positive whole amount followed by a unit: seconds, minutes,
///   hours, days or weeks, in full, plural or abbreviated form. A leading `+`
///   is allowed.
///
/// # Returns
/// The duration, or `ConfigError::InvalidRecency` if the text does not parse,
/// the amount is zero, or the result is longer than one year.
pub fn parse_recency(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidRecency(input.to_string());

    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed).trim_start();

    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (amount, unit) = trimmed.split_at(digits_end);

    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }

    let duration = match unit.trim().to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => Duration::try_seconds(amount),
        "m" | "min" | "mins" | "minute" | "minutes" => Duration::try_minutes(amount),
        "h" | "hr" | "hrs" | "hour" | "hours" => Duration::try_hours(amount),
        "d" | "day" | "days" => Duration::try_days(amount),
        "w" | "week" | "weeks" => Duration::try_weeks(amount),
        _ => return Err(invalid()),
    }
    .ok_or_else(invalid)?;

    if duration > Duration::minutes(MAX_WINDOW_MINUTES as i64) {
        return Err(invalid());
    }

    Ok(duration)
}
