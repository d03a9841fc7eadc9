//! Daily background sweep over the whole key universe.
//!
//! The scheduler polls an injectable [`Clock`] and fires once the configured
//! UTC slot has passed. Manual triggers go through the same sweep path and are
//! subject to the same single-sweep guard.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use super::coordinator::{BatchOutcome, RefreshCoordinator, RefreshOutcome};
use crate::clock::{next_daily_run, Clock};
use crate::config::Config;
use crate::error::CacheError;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub hour_utc: u32,
    pub minute_utc: u32,
    /// How often the clock is checked against the next slot.
    pub poll_interval: Duration,
    /// Overall bound on one sweep.
    pub sweep_timeout: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            hour_utc: config.refresh_hour_utc,
            minute_utc: config.refresh_minute_utc,
            poll_interval: config.scheduler_poll_interval(),
            sweep_timeout: config.sweep_timeout(),
        }
    }

    pub fn describe(&self) -> String {
        format!("daily at {:02}:{:02} UTC", self.hour_utc, self.minute_utc)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            hour_utc: 21,
            minute_utc: 0,
            poll_interval: Duration::from_secs(60),
            sweep_timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub total_runs: u64,
    /// Runs where at least one key refreshed.
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub last_run: Option<BatchOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub sweep_in_progress: bool,
    pub schedule: String,
    pub last_run_time: Option<DateTime<Utc>>,
    pub next_run_time: DateTime<Utc>,
    pub stats: SchedulerStats,
}

#[derive(Debug, Default)]
struct SchedulerState {
    last_run_time: Option<DateTime<Utc>>,
    next_run_time: Option<DateTime<Utc>>,
    stats: SchedulerStats,
}

/// One started poll loop. Each `start` gets its own stop signal so a loop
/// left over from an earlier run can never consume a later run's signal.
struct PollLoop {
    active: Arc<AtomicBool>,
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Clears the in-progress flag when a sweep ends, however it ends.
struct SweepGuard(Arc<AtomicBool>);

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct RefreshScheduler {
    coordinator: RefreshCoordinator,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    is_running: Arc<AtomicBool>,
    sweep_in_progress: Arc<AtomicBool>,
    state: Arc<RwLock<SchedulerState>>,
    poll_loop: Arc<Mutex<Option<PollLoop>>>,
}

impl RefreshScheduler {
    pub fn new(coordinator: RefreshCoordinator, clock: Arc<dyn Clock>, settings: SchedulerSettings) -> Self {
        Self {
            coordinator,
            clock,
            settings,
            is_running: Arc::new(AtomicBool::new(false)),
            sweep_in_progress: Arc::new(AtomicBool::new(false)),
            state: Arc::new(RwLock::new(SchedulerState::default())),
            poll_loop: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Stopped → Running. Starting twice is a no-op.
    pub async fn start(&self) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!("⚠️ Scheduler is already running");
            return;
        }

        let next = next_daily_run(self.clock.now(), self.settings.hour_utc, self.settings.minute_utc);
        self.state.write().await.next_run_time = Some(next);
        info!(
            "📅 Scheduler started: refreshing {} tickers {}, next run at {}",
            self.coordinator.universe().len(),
            self.settings.describe(),
            next.to_rfc3339()
        );

        let mut poll_loop = self.poll_loop.lock().await;
        if let Some(previous) = poll_loop.take() {
            previous.active.store(false, Ordering::SeqCst);
            previous.stop.notify_one();
        }

        let active = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(Notify::new());
        let scheduler = self.clone();
        let poll = self.settings.poll_interval;
        let (loop_active, loop_stop) = (Arc::clone(&active), Arc::clone(&stop));
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + poll, poll);
            while loop_active.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = ticker.tick() => {
                        scheduler.tick().await;
                    }
                    _ = loop_stop.notified() => break,
                }
            }
            debug!("Scheduler loop exited");
        });
        *poll_loop = Some(PollLoop { active, stop, task });
    }

    /// Running → Stopped. A sweep already in flight is allowed to finish.
    pub async fn stop(&self) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(poll_loop) = self.poll_loop.lock().await.take() {
            poll_loop.active.store(false, Ordering::SeqCst);
            poll_loop.stop.notify_one();
            // detached; a sweep already running finishes on its own
            drop(poll_loop.task);
        }
        info!("⏹️ Scheduler stopped");
    }

    /// Runs a sweep if the clock has reached the next slot. Called by the
    /// poll loop; tests drive it directly with a manual clock.
    pub async fn tick(&self) -> Option<BatchOutcome> {
        if !self.is_running() {
            return None;
        }
        let now = self.clock.now();
        let due = {
            let mut state = self.state.write().await;
            match state.next_run_time {
                Some(next) if now >= next => {
                    state.next_run_time =
                        Some(next_daily_run(now, self.settings.hour_utc, self.settings.minute_utc));
                    true
                }
                _ => false,
            }
        };
        if !due {
            return None;
        }

        info!("⏰ Scheduled refresh triggered at {}", now.to_rfc3339());
        match self.run_sweep().await {
            Ok(batch) => Some(batch),
            Err(err) => {
                warn!("⚠️ Skipping scheduled sweep: {}", err);
                None
            }
        }
    }

    /// Manual sweep over every supported key.
    pub async fn trigger_refresh_all(&self) -> Result<BatchOutcome, CacheError> {
        info!("🔧 Manual refresh triggered");
        self.run_sweep().await
    }

    /// Manual refresh of one key through the shared coordinator.
    pub async fn refresh_one(&self, key: &str) -> RefreshOutcome {
        info!("🔧 Manual refresh triggered for {}", key);
        self.coordinator.refresh_one(key).await
    }

    async fn run_sweep(&self) -> Result<BatchOutcome, CacheError> {
        if self
            .sweep_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CacheError::SweepInProgress);
        }
        let _guard = SweepGuard(Arc::clone(&self.sweep_in_progress));

        let keys = self.coordinator.universe().keys().to_vec();
        let batch = self
            .coordinator
            .refresh_all(&keys, Some(self.settings.sweep_timeout))
            .await;

        let mut state = self.state.write().await;
        state.last_run_time = Some(batch.started_at);
        state.stats.total_runs += 1;
        if batch.any_success() {
            state.stats.successful_runs += 1;
        } else {
            state.stats.failed_runs += 1;
            error!("❌ Sweep refreshed no tickers ({} failed)", batch.failed_keys);
        }
        state.stats.last_run = Some(batch.clone());
        Ok(batch)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.state.read().await;
        let next_run_time = state.next_run_time.unwrap_or_else(|| {
            next_daily_run(self.clock.now(), self.settings.hour_utc, self.settings.minute_utc)
        });
        SchedulerStatus {
            running: self.is_running(),
            sweep_in_progress: self.sweep_in_progress.load(Ordering::SeqCst),
            schedule: self.settings.describe(),
            last_run_time: state.last_run_time,
            next_run_time,
            stats: state.stats.clone(),
        }
    }
}
