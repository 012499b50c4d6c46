//! Admission-controlled job executor.
//!
//! Waiting jobs are promoted to active on a poll tick, bounded by `max_active` and an
//! optional resident-memory ceiling. The tick runs every 500ms while more jobs can be
//! admitted than are running and backs off to 1000ms otherwise; it stops once nothing
//! is waiting.
//! The memory ceiling only gates new admissions, running jobs are never evicted.

mod intern;
mod memory;

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use crate::config::QueueConfig;
use crate::diagnostics::{EventChannel, QueueEvent};
use crate::error::JobError;
use crate::job::{Job, JobResult};
use crate::now_millis;

use intern::InternJob;
pub use intern::OutsideJob;
use memory::MemoryProbe;

const FAST_POLL: Duration = Duration::from_millis(500);
const SLOW_POLL: Duration = Duration::from_millis(1000);

struct Ticker {
    period: Duration,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct QueueState {
    waiting: VecDeque<InternJob>,
    active: Vec<InternJob>,
    started: bool,
    ticker: Option<Ticker>,
}

impl QueueState {
    fn schedulable(&self, max_active: usize) -> usize {
        self.waiting
            .len()
            .min(max_active.saturating_sub(self.active.len()))
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.handle.abort();
        }
    }
}

pub struct JobQueue {
    max_active: usize,
    memory_limit_bytes: Option<u64>,
    memory: MemoryProbe,
    state: Mutex<QueueState>,
    events: EventChannel<QueueEvent>,
}

impl JobQueue {
    /// Create a stopped queue. Call [`start`](Self::start) to begin admitting jobs.
    pub fn new(cfg: &QueueConfig, events: EventChannel<QueueEvent>) -> Arc<Self> {
        let memory_limit_bytes =
            (cfg.memory_limit > 0).then(|| cfg.memory_limit.saturating_mul(cfg.memory_unit.bytes()));
        Arc::new(Self {
            max_active: cfg.max_active.max(1),
            memory_limit_bytes,
            memory: MemoryProbe::new(),
            state: Mutex::new(QueueState::default()),
            events,
        })
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Append a job to the waiting list; starts polling if the queue was idle.
    pub fn add_job(self: &Arc<Self>, job: Arc<Job>) {
        let mut state = self.lock();
        tracing::debug!(job = %job.label(), "queueing job");
        state.waiting.push_back(InternJob::new(job));
        if state.started && state.ticker.is_none() {
            self.set_cadence(&mut state, FAST_POLL);
        }
    }

    /// Remove a job from both lists by identity. An active job keeps running.
    pub fn remove_job(&self, job: &Arc<Job>) -> bool {
        let mut state = self.lock();
        let before = state.waiting.len() + state.active.len();
        state.waiting.retain(|j| !Arc::ptr_eq(&j.job, job));
        state.active.retain(|j| !Arc::ptr_eq(&j.job, job));
        before != state.waiting.len() + state.active.len()
    }

    /// Resume polling.
    pub fn start(self: &Arc<Self>) {
        let mut state = self.lock();
        state.started = true;
        if !state.waiting.is_empty() {
            self.set_cadence(&mut state, FAST_POLL);
        }
    }

    /// Stop polling; job lists and running jobs are left alone.
    pub fn pause(&self) {
        let mut state = self.lock();
        state.started = false;
        state.stop_ticker();
    }

    /// Stop polling and drop every queued and active entry without cancelling running work.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.stop_ticker();
        for intern in state.waiting.iter_mut() {
            intern.active = false;
        }
        let waiting = std::mem::take(&mut state.waiting);
        let active = std::mem::take(&mut state.active);
        tracing::info!(
            waiting = waiting.len(),
            active = active.len(),
            "cleared job queue"
        );
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn is_polling(&self) -> bool {
        self.lock().ticker.is_some()
    }

    /// Current poll period, if the poll timer is running.
    pub fn poll_period(&self) -> Option<Duration> {
        self.lock().ticker.as_ref().map(|t| t.period)
    }

    /// `min(waiting, max_active - active)`, never negative.
    pub fn schedulable_jobs(&self) -> usize {
        self.lock().schedulable(self.max_active)
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.lock().waiting.len()
    }

    /// True once active plus waiting jobs reach `max_active`.
    pub fn is_full(&self) -> bool {
        let state = self.lock();
        state.active.len() + state.waiting.len() >= self.max_active
    }

    /// True if at least `at_least` active jobs started before `end` (epoch ms).
    pub fn invalid_running(&self, end: i64, at_least: usize) -> bool {
        let state = self.lock();
        state
            .active
            .iter()
            .filter(|j| j.start_run.is_some_and(|start| start < end))
            .count()
            >= at_least
    }

    pub fn running_jobs(&self) -> Vec<OutsideJob> {
        self.lock().active.iter().map(InternJob::outside).collect()
    }

    pub fn waiting_jobs(&self) -> Vec<OutsideJob> {
        self.lock().waiting.iter().map(InternJob::outside).collect()
    }

    /// One poll step: promote at most one waiting job and adjust the cadence.
    pub(crate) fn tick(self: &Arc<Self>) {
        let next = {
            let mut state = self.lock();
            if !state.started {
                return;
            }
            if state.waiting.is_empty() {
                state.stop_ticker();
                self.publish(&state);
                return;
            }

            let schedulable = state.schedulable(self.max_active);
            let next = if schedulable == 0
                || state.active.len() >= self.max_active
                || self.over_memory_limit()
            {
                self.set_cadence(&mut state, SLOW_POLL);
                None
            } else if let Some(mut intern) = state.waiting.pop_front() {
                intern.activate(now_millis());
                let job = Arc::clone(&intern.job);
                let queued_at = intern.queued_at;
                state.active.push(intern);
                // Keep polling fast only while the spare capacity outweighs the running jobs.
                let cadence = if state.schedulable(self.max_active) > state.active.len() {
                    FAST_POLL
                } else {
                    SLOW_POLL
                };
                self.set_cadence(&mut state, cadence);
                Some((job, queued_at))
            } else {
                tracing::error!("job queue believed it had waiting jobs but the list was empty");
                None
            };
            self.publish(&state);
            next
        };

        if let Some((job, queued_at)) = next {
            let span = tracing::info_span!("job", job_id = job.id(), job = %job.label());
            tokio::spawn(Arc::clone(self).execute_job(job, queued_at).instrument(span));
        }
    }

    async fn execute_job(self: Arc<Self>, job: Arc<Job>, queued_at: i64) {
        let ctx = job.context().clone();
        let started = now_millis();

        let before = AssertUnwindSafe(job.before_run())
            .catch_unwind()
            .instrument(tracing::debug_span!("before_run"))
            .await;
        let run_after_hooks = match before {
            Ok(Ok(())) => {
                let run = AssertUnwindSafe(job.run_job())
                    .catch_unwind()
                    .instrument(tracing::debug_span!("run_job"))
                    .await;
                match run {
                    Ok(Ok(())) => ctx.set_result_if_unset(JobResult::Success),
                    Ok(Err(e)) => record_failure(&job, &e.to_string(), is_abort(&e)),
                    Err(_) => record_failure(&job, "job callback panicked", false),
                }
                true
            }
            Ok(Err(JobError::Aborted)) => {
                record_failure(&job, "aborted before start", true);
                true
            }
            Ok(Err(e)) => {
                tracing::error!("before_run failed, job stopped: {}", e);
                false
            }
            Err(_) => {
                tracing::error!("before_run panicked, job stopped");
                false
            }
        };

        self.remove_active(&job);
        let result = ctx.result().unwrap_or(JobResult::Success);
        tracing::info!(
            result = result.as_str(),
            run_ms = now_millis() - started,
            wait_ms = started - queued_at,
            "job run complete"
        );

        if run_after_hooks {
            if let Err(e) = job.after_run().await {
                tracing::error!("after_run failed: {}", e);
            }
        }
        job.finished();
    }

    fn remove_active(&self, job: &Arc<Job>) {
        let mut state = self.lock();
        state.active.retain(|j| !Arc::ptr_eq(&j.job, job));
    }

    fn over_memory_limit(&self) -> bool {
        let Some(limit) = self.memory_limit_bytes else {
            return false;
        };
        match self.memory.resident_bytes() {
            Some(bytes) if bytes > limit => {
                tracing::debug!(bytes, limit, "memory limit reached, not admitting jobs");
                true
            }
            _ => false,
        }
    }

    /// Restart the poll timer only when the requested period differs from the current one.
    fn set_cadence(self: &Arc<Self>, state: &mut QueueState, period: Duration) {
        if let Some(ticker) = &state.ticker {
            if ticker.period == period && !ticker.handle.is_finished() {
                return;
            }
        }
        state.stop_ticker();

        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(queue) = weak.upgrade() else {
                    break;
                };
                queue.tick();
            }
        });
        state.ticker = Some(Ticker { period, handle });
    }

    fn publish(&self, state: &QueueState) {
        self.events.publish_with(|| QueueEvent {
            active: state.active.len(),
            queued: state.waiting.len(),
            max: self.max_active,
        });
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.lock().stop_ticker();
    }
}

fn is_abort(err: &JobError) -> bool {
    matches!(err, JobError::Aborted)
}

/// Set the result code and store a structured message with the error and counters.
fn record_failure(job: &Job, error: &str, aborted: bool) {
    let ctx = job.context();
    let result = if aborted {
        JobResult::Aborted
    } else {
        JobResult::Failed
    };
    ctx.set_result(result);
    ctx.set_error(error);
    let message = serde_json::json!({
        "job": job.label(),
        "result": result.as_str(),
        "error": error,
        "statistics": ctx.statistics(),
    });
    ctx.set_message(message.to_string());
    if aborted {
        tracing::warn!("job aborted: {}", error);
    } else {
        tracing::error!("job failed: {}", error);
    }
}

#[cfg(test)]
mod tests;
