//! Scheduler: pulls due jobs from storage into the queue and keeps the fleet healthy.
//!
//! A maintenance tick (default every 60s) fetches jobs through the configured
//! [`Strategy`], aborts or escalates stuck jobs and reconciles stale `running` records.
//! Finished jobs feed the failure-notification accounting and may dispatch follow-up or
//! dependent jobs.

mod dispatch;
pub mod health;
pub mod notify;
mod registry;
mod setup;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ScraperConfig, SchedulerConfig};
use crate::diagnostics::{Diagnostics, EventChannel, JobResultEvent};
use crate::job::Job;
use crate::now_millis;
use crate::queue::JobQueue;
use crate::store::{JobId, JobRecord, JobStore, JobType};
use crate::strategy::Strategy;

pub use notify::{FailureTracker, JobCompletion};
pub use registry::{JobHandler, JobRegistry};

/// Predicate applied to every fetched record before it is dispatched.
pub type JobFilter = Arc<dyn Fn(&JobRecord) -> bool + Send + Sync>;

/// Jobs between their `before` and `after` listeners, by id and by name.
#[derive(Default)]
struct Tracked {
    by_id: HashMap<JobId, Arc<Job>>,
    by_name: HashMap<String, Arc<Job>>,
}

pub struct JobScheduler {
    store: JobStore,
    registry: JobRegistry,
    queue: Arc<JobQueue>,
    strategy: Strategy,
    diagnostics: Diagnostics,
    results: EventChannel<JobResultEvent>,
    config: SchedulerConfig,
    tracked: Mutex<Tracked>,
    failures: Mutex<FailureTracker>,
    filter: Mutex<Option<JobFilter>>,
    automatic: AtomicBool,
    paused: AtomicBool,
    fetching: AtomicBool,
    last_probe_failure: Mutex<Option<i64>>,
    shutdown: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl JobScheduler {
    pub fn new(
        cfg: &ScraperConfig,
        store: JobStore,
        registry: JobRegistry,
        diagnostics: Diagnostics,
    ) -> Arc<Self> {
        let queue = JobQueue::new(&cfg.queue, diagnostics.queue.clone());
        Arc::new(Self {
            store,
            registry,
            queue,
            strategy: Strategy::new(cfg.scheduler.strategy),
            diagnostics,
            results: EventChannel::new(),
            config: cfg.scheduler.clone(),
            tracked: Mutex::new(Tracked::default()),
            failures: Mutex::new(FailureTracker::new(cfg.notify.clone())),
            filter: Mutex::new(None),
            automatic: AtomicBool::new(true),
            paused: AtomicBool::new(true),
            fetching: AtomicBool::new(false),
            last_probe_failure: Mutex::new(None),
            shutdown: CancellationToken::new(),
            ticker: Mutex::new(None),
        })
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Business events of job types registered with an event name.
    pub fn subscribe_results(&self) -> broadcast::Receiver<JobResultEvent> {
        self.results.subscribe()
    }

    /// Cancelled when a health check decides the process must restart.
    pub fn shutdown_requested(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn set_filter(&self, filter: Option<JobFilter>) {
        *self.filter.lock().unwrap_or_else(|e| e.into_inner()) = filter;
    }

    /// Toggle the fetch and health-check cycle without stopping the queue.
    pub fn set_automatic(&self, automatic: bool) {
        self.automatic.store(automatic, Ordering::SeqCst);
    }

    pub fn is_automatic(&self) -> bool {
        self.automatic.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Consecutive failures the accounting holds for a job under `hook`.
    pub fn failure_count(&self, hook: &str, job_type: JobType, job_id: JobId) -> u32 {
        self.lock_failures().failure_count(hook, job_type, job_id)
    }

    /// The tracked job with this id, if it is between `before` and `after`.
    pub fn tracked_job(&self, id: JobId) -> Option<Arc<Job>> {
        self.lock_tracked().by_id.get(&id).cloned()
    }

    /// Resume the queue and start the maintenance tick.
    pub fn start(self: &Arc<Self>) {
        self.paused.store(false, Ordering::SeqCst);
        self.queue.start();

        let mut ticker = self.ticker.lock().unwrap_or_else(|e| e.into_inner());
        if ticker.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let period = Duration::from_secs(self.config.tick_secs.max(1));
        let weak = Arc::downgrade(self);
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(scheduler) = weak.upgrade() else {
                    break;
                };
                scheduler.maintenance().await;
            }
        }));
        tracing::info!(tick_secs = period.as_secs(), strategy = ?self.strategy.kind(), "job scheduler started");
    }

    /// Stop admitting jobs; the maintenance tick keeps running but does nothing.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.queue.pause();
    }

    /// Stop the tick and drop all queued jobs. Running jobs finish on their own.
    pub fn stop(&self) {
        self.pause();
        if let Some(handle) = self.ticker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        self.queue.clear();
        tracing::info!("job scheduler stopped");
    }

    /// One maintenance cycle: fetch, then the health checks.
    pub async fn maintenance(self: &Arc<Self>) {
        if self.is_paused() || !self.is_automatic() {
            return;
        }
        if let Err(e) = self.fetch_jobs().await {
            tracing::error!("fetching jobs failed: {:#}", e);
        }
        self.check_running_jobs(now_millis()).await;
        if let Err(e) = self.check_current_vs_storage().await {
            tracing::error!("reconciling running jobs failed: {:#}", e);
        }
        if let Err(e) = self.check_running_storage_jobs().await {
            tracing::error!("checking stored running jobs failed: {:#}", e);
        }
    }

    fn request_shutdown(&self, reason: &str) {
        tracing::error!("requesting graceful shutdown: {}", reason);
        self.pause();
        self.shutdown.cancel();
    }

    fn lock_tracked(&self) -> MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_failures(&self) -> MutexGuard<'_, FailureTracker> {
        self.failures.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_probe_failure(&self) -> MutexGuard<'_, Option<i64>> {
        self.last_probe_failure.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_filter(&self) -> Option<JobFilter> {
        self.filter.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}
