// src/pipeline/scheduler.rs

//! Periodic cycle driver.
//!
//! `Idle → Running → (Idle | Backoff)`. A tick that finds a cycle running is
//! skipped, never queued. A failed listing fetch puts the scheduler in
//! backoff; it wakes up at the deadline and tries again, indefinitely.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{CycleError, FetchError};
use crate::models::{ScrapeCycleResult, SchedulerConfig};
use crate::pipeline::cycle::ScrapePipeline;
use crate::pipeline::history::CycleHistory;
use crate::utils::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Backoff { retry_at: Instant },
}

#[derive(Debug)]
struct SchedulerState {
    phase: Phase,
    consecutive_failures: u32,
    next_cycle_id: u64,
    last_error: Option<String>,
}

/// Why a tick did not start a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The previous cycle is still running
    Running,
    /// Waiting for the backoff deadline
    BackingOff { remaining: Duration },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "previous cycle still running"),
            Self::BackingOff { remaining } => {
                write!(f, "backing off for another {}s", remaining.as_secs())
            }
        }
    }
}

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
    Ran(ScrapeCycleResult),
    ListingFailed { error: FetchError, retry_in: Duration },
    Skipped(SkipReason),
    Cancelled,
}

/// Point-in-time view of the scheduler for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub phase: &'static str,
    pub retry_in_secs: Option<u64>,
    pub consecutive_failures: u32,
    pub cycles_started: u64,
    pub interval_secs: u64,
    pub last_error: Option<String>,
    pub last_result: Option<ScrapeCycleResult>,
}

/// Holds the `Running` phase; dropping it returns a still running scheduler to `Idle`.
pub struct RunningGuard {
    scheduler: Arc<Scheduler>,
    cycle_id: u64,
}

impl RunningGuard {
    pub fn cycle_id(&self) -> u64 {
        self.cycle_id
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut state = self.scheduler.state();
        if state.phase == Phase::Running {
            state.phase = Phase::Idle;
        }
    }
}

/// Drives scrape cycles on a fixed interval.
pub struct Scheduler {
    pipeline: Arc<ScrapePipeline>,
    history: Arc<CycleHistory>,
    backoff: RetryPolicy,
    interval: Duration,
    run_on_start: bool,
    stop: AtomicBool,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<ScrapePipeline>, config: &SchedulerConfig) -> Self {
        Self {
            pipeline,
            history: Arc::new(CycleHistory::new(config.history_size)),
            backoff: RetryPolicy::for_cycles(config),
            interval: config.interval(),
            run_on_start: config.run_on_start,
            stop: AtomicBool::new(false),
            state: Mutex::new(SchedulerState {
                phase: Phase::Idle,
                consecutive_failures: 0,
                next_cycle_id: 1,
                last_error: None,
            }),
        }
    }

    pub fn history(&self) -> Arc<CycleHistory> {
        Arc::clone(&self.history)
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enter `Running` unless a cycle is running or the backoff has not elapsed.
    pub fn try_begin(self: &Arc<Self>) -> Result<RunningGuard, SkipReason> {
        let mut state = self.state();
        match state.phase {
            Phase::Running => return Err(SkipReason::Running),
            Phase::Backoff { retry_at } => {
                let now = Instant::now();
                if now < retry_at {
                    return Err(SkipReason::BackingOff {
                        remaining: retry_at - now,
                    });
                }
            }
            Phase::Idle => {}
        }

        state.phase = Phase::Running;
        let cycle_id = state.next_cycle_id;
        state.next_cycle_id += 1;

        Ok(RunningGuard {
            scheduler: Arc::clone(self),
            cycle_id,
        })
    }

    /// Run one cycle now if allowed.
    pub async fn tick(self: &Arc<Self>) -> TickOutcome {
        match self.try_begin() {
            Ok(guard) => self.run_guarded(guard).await,
            Err(reason) => {
                log::info!("Tick skipped: {}", reason);
                TickOutcome::Skipped(reason)
            }
        }
    }

    async fn run_guarded(&self, guard: RunningGuard) -> TickOutcome {
        let outcome = match self.pipeline.run_cycle(guard.cycle_id(), &self.stop).await {
            Ok(result) => {
                {
                    let mut state = self.state();
                    state.phase = Phase::Idle;
                    state.consecutive_failures = 0;
                    state.last_error = result.aborted.clone();
                }
                self.history.push(result.clone());
                TickOutcome::Ran(result)
            }
            Err(CycleError::Listing(error)) => {
                let retry_in = {
                    let mut state = self.state();
                    state.consecutive_failures += 1;
                    let retry_in = self.backoff.calculate_backoff(state.consecutive_failures);
                    state.phase = Phase::Backoff {
                        retry_at: Instant::now() + retry_in,
                    };
                    state.last_error = Some(error.to_string());
                    log::warn!(
                        "Cycle #{} failed ({} in a row), retrying in {:?}: {}",
                        guard.cycle_id(),
                        state.consecutive_failures,
                        retry_in,
                        error
                    );
                    retry_in
                };
                TickOutcome::ListingFailed { error, retry_in }
            }
            Err(CycleError::Cancelled) => TickOutcome::Cancelled,
        };
        drop(guard);
        outcome
    }

    fn backoff_deadline(&self) -> Option<Instant> {
        match self.state().phase {
            Phase::Backoff { retry_at } => Some(retry_at),
            _ => None,
        }
    }

    fn trigger(self: &Arc<Self>, tasks: &mut JoinSet<TickOutcome>, source: &str) {
        match self.try_begin() {
            Ok(guard) => {
                log::debug!("Starting cycle #{} ({})", guard.cycle_id(), source);
                let scheduler = Arc::clone(self);
                tasks.spawn(async move { scheduler.run_guarded(guard).await });
            }
            Err(reason) => log::info!("Tick skipped: {}", reason),
        }
    }

    /// Tick until `shutdown` turns true, then stop writing and wait for the
    /// in-flight cycle.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let start = if self.run_on_start {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tasks = JoinSet::new();

        log::info!("Scheduler started, interval {:?}", self.interval);

        loop {
            // re-read after every wake-up: a finished cycle may have set a deadline
            let retry_at = self.backoff_deadline();
            tokio::select! {
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        log::error!("Cycle task failed: {}", e);
                    }
                }
                _ = ticker.tick() => self.trigger(&mut tasks, "interval"),
                _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.trigger(&mut tasks, "backoff")
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("Scheduler stopping, waiting for the running cycle");
        self.stop.store(true, Ordering::SeqCst);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                log::error!("Cycle task failed: {}", e);
            }
        }
        log::info!("Scheduler stopped");
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.state();
        let (phase, retry_in_secs) = match state.phase {
            Phase::Idle => ("idle", None),
            Phase::Running => ("running", None),
            Phase::Backoff { retry_at } => (
                "backoff",
                Some(retry_at.saturating_duration_since(Instant::now()).as_secs()),
            ),
        };

        SchedulerStatus {
            phase,
            retry_in_secs,
            consecutive_failures: state.consecutive_failures,
            cycles_started: state.next_cycle_id - 1,
            interval_secs: self.interval.as_secs(),
            last_error: state.last_error.clone(),
            last_result: self.history.latest(),
        }
    }
}
