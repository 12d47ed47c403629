//! Command-line interface parsing for the tides updater
//!
//! This module handles parsing of CLI arguments using clap: which command to
//! run and the overrides that are layered on top of the config file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config::{Config, DEFAULT_CONFIG_PATH, MAX_WINDOW_MINUTES};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// `--interval-minutes` of zero or more than a year
    #[error("Invalid interval: {0} minutes. The interval must be between 1 minute and one year")]
    InvalidInterval(u64),

    /// `--station ""`
    #[error("Invalid station: station ID must not be empty")]
    EmptyStation,
}

/// Keeps a cached NOAA tide and water temperature reading fresh
#[derive(Parser, Debug)]
#[command(name = "tides-updater")]
#[command(about = "Keeps a cached NOAA tide and water temperature reading fresh")]
#[command(version)]
pub struct Cli {
    /// Config file to read (default: tides-updater.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// NOAA station ID, overrides the config file
    #[arg(long, value_name = "ID", global = true)]
    pub station: Option<String>,

    /// Directory holding the cache file, overrides the config file
    #[arg(long, value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Minutes between refresh ticks, overrides the config file
    #[arg(long, value_name = "MINUTES", global = true)]
    pub interval_minutes: Option<u64>,

    /// What to do (default: run)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Commands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Refresh on a fixed interval until interrupted
    Run,
    /// Run one refresh cycle and print what happened
    Refresh,
    /// Print the cached reading as JSON
    Show,
}

impl Cli {
    /// The command to run; `run` when none was given
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }

    /// Loads the config file and applies CLI overrides
    pub fn load_config(&self) -> Result<Config, CliError> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Config::load_from_path(path);
        self.apply_overrides(&mut config)?;
        Ok(config)
    }

    /// Applies CLI overrides to `config`
    pub fn apply_overrides(&self, config: &mut Config) -> Result<(), CliError> {
        if let Some(station) = &self.station {
            if station.trim().is_empty() {
                return Err(CliError::EmptyStation);
            }
            config.station.id = station.trim().to_string();
        }

        if let Some(minutes) = self.interval_minutes {
            if minutes == 0 || minutes > MAX_WINDOW_MINUTES {
                return Err(CliError::InvalidInterval(minutes));
            }
            config.refresh.interval_minutes = minutes;
        }

        if let Some(dir) = &self.cache_dir {
            config.cache.dir = Some(dir.clone());
        }

        Ok(())
    }
}
