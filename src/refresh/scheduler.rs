//! Periodic refresh trigger
//!
//! The controller never schedules itself. A [`Scheduler`] owns the cadence
//! and calls a task on every tick; [`activate`] and [`deactivate`] are the
//! start-up and shut-down hooks around it.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::RefreshController;
use crate::cache::CacheStore;
use crate::data::TideSource;

/// The work run on every tick
pub type RefreshTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs a task on a fixed interval
pub trait Scheduler {
    /// Starts calling `task` every `interval`, replacing any running schedule
    fn start(&mut self, interval: Duration, task: RefreshTask);

    /// Stops the schedule; a tick already running is left to finish
    fn stop(&mut self);

    /// Whether a schedule is running
    fn is_scheduled(&self) -> bool;
}

/// Tokio-backed scheduler
///
/// Fires once immediately on start, then every interval. Each tick's task is
/// spawned on its own, so a slow refresh never holds up the next tick and
/// ticks may overlap. Missed ticks are skipped rather than bunched up.
#[derive(Default)]
pub struct IntervalScheduler {
    running: Option<Running>,
}

struct Running {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl IntervalScheduler {
    /// Creates a scheduler with nothing scheduled
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for IntervalScheduler {
    /// Must be called from within a tokio runtime
    fn start(&mut self, interval: Duration, task: RefreshTask) {
        self.stop();

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("refresh tick");
                        tokio::spawn(task());
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
        });

        self.running = Some(Running {
            shutdown_tx,
            handle,
        });
    }

    fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            // Receiver is gone only if the loop already exited
            if running.shutdown_tx.send(()).is_err() {
                running.handle.abort();
            }
        }
    }

    fn is_scheduled(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Schedules periodic refreshes unless already scheduled
///
/// Returns whether a new schedule was started.
pub fn activate<Sch, S, F>(
    scheduler: &mut Sch,
    interval: Duration,
    controller: Arc<RefreshController<S, F>>,
) -> bool
where
    Sch: Scheduler + ?Sized,
    S: CacheStore + 'static,
    F: TideSource + 'static,
{
    if scheduler.is_scheduled() {
        debug!("refresh already scheduled");
        return false;
    }

    let task: RefreshTask = Arc::new(move || {
        let controller = Arc::clone(&controller);
        async move {
            let outcome = controller.refresh().await;
            debug!(%outcome, "refresh finished");
        }
        .boxed()
    });

    scheduler.start(interval, task);
    info!(interval_secs = interval.as_secs(), "scheduled tide refresh");
    true
}

/// Unschedules periodic refreshes; the cache is left as is
///
/// Returns whether anything was scheduled.
pub fn deactivate<Sch: Scheduler + ?Sized>(scheduler: &mut Sch) -> bool {
    if !scheduler.is_scheduled() {
        return false;
    }
    scheduler.stop();
    info!("unscheduled tide refresh");
    true
}
