//! Tides updater - keeps a cached NOAA tide reading fresh
//!
//! `run` refreshes on a fixed interval until Ctrl-C, `refresh` runs a single
//! cycle, and `show` prints whatever is cached.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tides_updater::cache::{CacheStore, FileCacheStore};
use tides_updater::cli::{Cli, Command};
use tides_updater::clock::{Clock, SystemClock};
use tides_updater::config::Config;
use tides_updater::data::{NoaaClient, TideDataFetcher, TideSource};
use tides_updater::refresh::{activate, deactivate, IntervalScheduler, RefreshController};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

type Controller = RefreshController<FileCacheStore, TideDataFetcher<NoaaClient>>;

/// Wires the store, the NOAA client and the clock into a controller
fn build_controller(config: &Config) -> Result<Controller, Box<dyn std::error::Error>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store = match &config.cache.dir {
        Some(dir) => FileCacheStore::with_dir(dir),
        None => FileCacheStore::new()?,
    };
    info!(path = %store.path().display(), "using tide cache");

    let client = NoaaClient::from_config(&config.http, Arc::clone(&clock))?;
    let fetcher = TideDataFetcher::new(client, config.station.id.clone());

    Ok(RefreshController::new(store, fetcher, clock)
        .with_recency(config.recency()?)
        .with_backoff(config.backoff()?))
}

/// Refreshes on every tick until Ctrl-C
async fn run<S, F>(controller: Arc<RefreshController<S, F>>, interval: Duration) -> io::Result<()>
where
    S: CacheStore + 'static,
    F: TideSource + 'static,
{
    let mut scheduler = IntervalScheduler::new();
    activate(&mut scheduler, interval, controller);

    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    deactivate(&mut scheduler);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_tracing();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    };
    let controller = build_controller(&config)?;

    match cli.command() {
        Command::Run => {
            info!(station = %config.station.id, "tides updater starting");
            run(Arc::new(controller), config.interval()?).await?;
        }
        Command::Refresh => {
            let outcome = controller.refresh().await;
            println!("{}", outcome);
        }
        Command::Show => {
            let entry = controller.current();
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
    }

    Ok(())
}
