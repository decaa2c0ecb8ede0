// Repository worker: one periodic backup loop per monitored repository.
//
// The loop runs an immediate cycle, then one cycle per tick. Every cycle
// reads `<repo>/.snapkeep.toml` afresh, so scan and staging policy follow the
// file (or the defaults once it is gone). After each tick the loop re-stats
// the file and, when it is newer than last seen, swaps in a ticker at the new
// interval. The ticker handle lives behind a std mutex that is never held
// across an await; the loop clones the current tick source under it once
// per iteration.

pub mod manager;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use snapkeep_common::types::{WorkerState, WorkerStatus};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backup::{load_config_or_default, log_cycle_result, run_cycle, CycleDeps};
use crate::config::{local_config_path, LocalConfig, MAX_INTERVAL_SECS};

pub use manager::WorkerManager;

/// How long `stop` waits for the loop to acknowledge before returning.
pub const STOP_ACK_TIMEOUT: Duration = Duration::from_millis(200);

type TickSource = Arc<tokio::sync::Mutex<mpsc::Receiver<()>>>;

// ── Ticker ─────────────────────────────────────────────────────────

/// Periodic tick source. The first tick fires one period after start.
/// Dropping the ticker ends its source: a pending `recv` yields `None`.
struct Ticker {
    period: Duration,
    ticks: TickSource,
    task: JoinHandle<()>,
}

impl Ticker {
    fn start(period: Duration) -> Self {
        let period = period.clamp(Duration::from_secs(1), Duration::from_secs(MAX_INTERVAL_SECS));
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match tx.try_send(()) {
                    // A full channel means the loop is still busy; coalesce.
                    Ok(()) | Err(TrySendError::Full(())) => {}
                    Err(TrySendError::Closed(())) => break,
                }
            }
        });
        Self { period, ticks: Arc::new(tokio::sync::Mutex::new(rx)), task }
    }

    fn source(&self) -> TickSource {
        Arc::clone(&self.ticks)
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn next_tick(ticks: &TickSource) -> Option<()> {
    ticks.lock().await.recv().await
}

// ── Worker ─────────────────────────────────────────────────────────

struct Schedule {
    /// Interval from the last config load that set up a ticker.
    interval: Duration,
    ticker: Option<Ticker>,
    last_mtime: Option<SystemTime>,
    /// Set by `stop`; no ticker is started afterwards.
    halted: bool,
}

struct LastCycle {
    at: DateTime<Utc>,
    summary: String,
}

pub struct RepositoryWorker {
    repo_path: PathBuf,
    deps: CycleDeps,
    schedule: Mutex<Schedule>,
    last_cycle: Mutex<Option<LastCycle>>,
    state_tx: watch::Sender<WorkerState>,
    shutdown_tx: watch::Sender<bool>,
    stopped_tx: watch::Sender<bool>,
}

impl RepositoryWorker {
    pub fn new(repo_path: PathBuf, deps: CycleDeps) -> Self {
        Self {
            repo_path,
            deps,
            schedule: Mutex::new(Schedule {
                interval: LocalConfig::default().interval(),
                ticker: None,
                last_mtime: None,
                halted: false,
            }),
            last_cycle: Mutex::new(None),
            state_tx: watch::channel(WorkerState::Idle).0,
            shutdown_tx: watch::channel(false).0,
            stopped_tx: watch::channel(false).0,
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn state(&self) -> WorkerState {
        *self.state_tx.borrow()
    }

    /// Interval of the current ticker (the configured one before `run`).
    pub fn current_interval(&self) -> Duration {
        let schedule = lock(&self.schedule);
        schedule.ticker.as_ref().map_or(schedule.interval, |t| t.period)
    }

    pub fn status(&self) -> WorkerStatus {
        let last_cycle = lock(&self.last_cycle);
        WorkerStatus {
            repo_path: self.repo_path.clone(),
            state: self.state(),
            interval_secs: self.current_interval().as_secs(),
            last_cycle_at: last_cycle.as_ref().map(|c| c.at),
            last_outcome: last_cycle.as_ref().map(|c| c.summary.clone()),
        }
    }

    /// The worker loop. Returns once `stop` has been called.
    pub async fn run(self: Arc<Self>) {
        let _ack = StopAck { worker: self.as_ref() };
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let stopping = *shutdown_rx.borrow_and_update();
        if stopping {
            return;
        }
        self.state_tx.send_if_modified(|state| {
            if *state == WorkerState::Idle {
                *state = WorkerState::Running;
                return true;
            }
            false
        });

        self.load_initial_config();
        info!(
            repo = %self.repo_path.display(),
            interval_secs = self.current_interval().as_secs(),
            "worker started"
        );

        self.cycle().await;
        self.start_ticker();

        loop {
            let Some(ticks) = self.tick_source() else {
                break;
            };

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => break,
                tick = next_tick(&ticks) => {
                    if tick.is_none() {
                        if !self.ticker_replaced(&ticks) {
                            warn!(repo = %self.repo_path.display(), "ticker ended, restarting it");
                            self.start_ticker();
                        }
                        continue;
                    }
                    let stopping = *shutdown_rx.borrow();
                    if stopping {
                        break;
                    }
                    self.cycle().await;
                    self.check_config_reload();
                }
            }
        }

        debug!(repo = %self.repo_path.display(), "worker loop exited");
    }

    /// Signal the loop to stop and wait briefly for it to acknowledge.
    ///
    /// Idempotent, and bounded by [`STOP_ACK_TIMEOUT`] even when the loop
    /// never started or is in the middle of a cycle.
    pub async fn stop(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        self.state_tx.send_if_modified(|state| {
            if *state == WorkerState::Stopped {
                return false;
            }
            *state = WorkerState::Stopping;
            true
        });

        {
            let mut schedule = lock(&self.schedule);
            schedule.halted = true;
            schedule.ticker = None;
        }

        let mut stopped_rx = self.stopped_tx.subscribe();
        let acked = time::timeout(STOP_ACK_TIMEOUT, stopped_rx.wait_for(|stopped| *stopped)).await;
        if acked.is_err() {
            debug!(repo = %self.repo_path.display(), "worker did not acknowledge stop in time");
            self.state_tx.send_replace(WorkerState::Stopped);
        }
    }

    async fn cycle(self: &Arc<Self>) {
        let worker = Arc::clone(self);
        let joined = tokio::task::spawn_blocking(move || {
            let config = load_config_or_default(&worker.repo_path);
            run_cycle(&worker.repo_path, &config, &worker.deps)
        })
        .await;

        match joined {
            Ok(result) => {
                log_cycle_result(&self.repo_path, &result);
                let summary = match &result {
                    Ok(outcome) => outcome.summary(),
                    Err(error) => format!("error: {error}"),
                };
                *lock(&self.last_cycle) = Some(LastCycle { at: Utc::now(), summary });
            }
            Err(error) => {
                warn!(repo = %self.repo_path.display(), %error, "backup cycle task failed");
            }
        }
    }

    fn load_initial_config(&self) {
        let config = load_config_or_default(&self.repo_path);
        let mtime = config_mtime(&self.repo_path);
        let mut schedule = lock(&self.schedule);
        schedule.interval = config.interval();
        schedule.last_mtime = mtime;
    }

    fn start_ticker(&self) {
        let mut schedule = lock(&self.schedule);
        if schedule.halted {
            return;
        }
        schedule.ticker = Some(Ticker::start(schedule.interval));
    }

    fn tick_source(&self) -> Option<TickSource> {
        let schedule = lock(&self.schedule);
        if schedule.halted {
            return None;
        }
        schedule.ticker.as_ref().map(Ticker::source)
    }

    /// Whether `ticks` is no longer the live tick source (swapped or halted).
    fn ticker_replaced(&self, ticks: &TickSource) -> bool {
        self.tick_source().map_or(true, |current| !Arc::ptr_eq(&current, ticks))
    }

    /// Replace the ticker when the config file's mtime is strictly newer than
    /// the last one seen. Scan and staging policy are read by each cycle.
    fn check_config_reload(&self) {
        let Some(mtime) = config_mtime(&self.repo_path) else {
            return;
        };
        if lock(&self.schedule).last_mtime.is_some_and(|seen| mtime <= seen) {
            return;
        }

        let config = load_config_or_default(&self.repo_path);
        let mut schedule = lock(&self.schedule);
        schedule.last_mtime = Some(mtime);
        if schedule.halted {
            return;
        }
        let interval = config.interval();
        info!(
            repo = %self.repo_path.display(),
            interval_secs = interval.as_secs(),
            scan_secrets = config.scan_secrets,
            only_staged = config.only_staged,
            "config reloaded"
        );
        schedule.interval = interval;
        schedule.ticker = Some(Ticker::start(interval));
    }
}

/// Marks the worker stopped when the loop exits, however it exits.
struct StopAck<'a> {
    worker: &'a RepositoryWorker,
}

impl Drop for StopAck<'_> {
    fn drop(&mut self) {
        self.worker.state_tx.send_replace(WorkerState::Stopped);
        self.worker.stopped_tx.send_replace(true);
    }
}

fn config_mtime(repo_path: &Path) -> Option<SystemTime> {
    std::fs::metadata(local_config_path(repo_path)).and_then(|m| m.modified()).ok()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
