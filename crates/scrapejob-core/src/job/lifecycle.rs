use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::diagnostics::{EventChannel, JobEvent};
use crate::error::JobError;
use crate::now_millis;
use crate::store::{JobId, JobRecord, JobState, JobStore, JobType};

use super::context::{JobContext, JobResult};
use super::listeners::{self, HookFuture, ListenerId, Listeners};
use super::schedule::complete_run;
use super::{JobCallback, JobOutcome, JobOutput, JobStatus};

/// A single execution of a persisted job record.
///
/// The record is snapshotted at construction; later changes to the stored row do not
/// affect a running job. Lifecycle methods must be called in order, once each:
/// [`before_run`](Self::before_run), [`run_job`](Self::run_job),
/// [`after_run`](Self::after_run), [`finished`](Self::finished).
pub struct Job {
    record: Mutex<JobRecord>,
    status: Mutex<JobStatus>,
    callback: Mutex<Option<JobCallback>>,
    listeners: Mutex<Listeners>,
    context: JobContext,
    store: JobStore,
    events: EventChannel<JobEvent>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("label", &self.label())
            .field("status", &self.status())
            .finish()
    }
}

impl Job {
    pub fn new(
        record: JobRecord,
        callback: JobCallback,
        store: JobStore,
        events: EventChannel<JobEvent>,
    ) -> Self {
        let label = format!("{}-{}", record.id, record.name);
        let context = JobContext::new(record.id, label, record.last_run);
        Self {
            record: Mutex::new(record),
            status: Mutex::new(JobStatus::Waiting),
            callback: Mutex::new(Some(callback)),
            listeners: Mutex::new(Listeners::default()),
            context,
            store,
            events,
        }
    }

    /// Build a job from an async closure.
    pub fn from_fn<F, Fut>(
        record: JobRecord,
        store: JobStore,
        events: EventChannel<JobEvent>,
        f: F,
    ) -> Self
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<JobOutput>> + Send + 'static,
    {
        Self::new(record, Box::new(move |ctx| Box::pin(f(ctx))), store, events)
    }

    pub fn id(&self) -> JobId {
        self.context.job_id()
    }

    pub fn label(&self) -> &str {
        self.context.label()
    }

    pub fn name(&self) -> String {
        self.record_lock().name.clone()
    }

    pub fn job_type(&self) -> JobType {
        self.record_lock().job_type
    }

    /// Copy of the job's record snapshot as this job last saw it.
    pub fn record(&self) -> JobRecord {
        self.record_lock().clone()
    }

    pub fn status(&self) -> JobStatus {
        *self.status_lock()
    }

    pub fn context(&self) -> &JobContext {
        &self.context
    }

    /// Request cooperative cancellation. Does not change the lifecycle state.
    pub fn abort(&self) {
        tracing::info!(job = %self.label(), "abort requested");
        self.context.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.context.is_cancelled()
    }

    pub fn on_before<F, Fut>(&self, f: F) -> ListenerId
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.listeners_lock()
            .add_before(Box::new(move || -> HookFuture { Box::pin(f()) }))
    }

    pub fn on_after<F, Fut>(&self, f: F) -> ListenerId
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.listeners_lock()
            .add_after(Box::new(move || -> HookFuture { Box::pin(f()) }))
    }

    pub fn on_done<F, Fut>(&self, f: F) -> ListenerId
    where
        F: FnOnce(Arc<JobOutcome>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.listeners_lock()
            .add_done(Box::new(move |outcome| -> HookFuture { Box::pin(f(outcome)) }))
    }

    /// Remove a listener that has not fired yet.
    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners_lock().remove(id)
    }

    /// `waiting → before_run`: run `before` listeners and persist the record as running.
    pub async fn before_run(&self) -> Result<(), JobError> {
        self.advance(JobStatus::Waiting, JobStatus::BeforeRun)?;
        self.context.check_cancelled()?;

        let hooks = self.listeners_lock().take_before();
        listeners::run_all("before", self.label(), hooks.into_iter().map(|h| h()).collect())
            .await;

        let record = {
            let mut record = self.record_lock();
            record.state = JobState::Running;
            record.running_since = Some(now_millis());
            record.clone()
        };
        self.store
            .save_run_state(&record)
            .await
            .map_err(JobError::Store)?;

        self.events.publish_with(|| JobEvent::Started {
            job_id: record.id,
            job_name: record.name.clone(),
            job_type: record.job_type.to_string(),
            timestamp: now_millis(),
        });
        Ok(())
    }

    /// `before_run → running`: execute the callback and report it through `done`.
    ///
    /// Callback failures are captured and reported, never returned. Cancellation observed
    /// before or after the callback is returned as [`JobError::Aborted`].
    pub async fn run_job(&self) -> Result<(), JobError> {
        self.advance(JobStatus::BeforeRun, JobStatus::Running)?;
        self.context.check_cancelled()?;

        let callback = self
            .callback_lock()
            .take()
            .ok_or(JobError::InvalidState {
                expected: "unexecuted callback",
                actual: JobStatus::Running,
            })?;
        let result = callback(self.context.clone()).await;
        self.context.check_cancelled()?;

        let outcome = match result {
            Ok(output) => JobOutcome::Success(output),
            Err(e) if JobError::is_abort(&e) => return Err(JobError::Aborted),
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::warn!(job = %self.label(), "job failed: {}", message);
                self.context.set_result_if_unset(JobResult::Failed);
                self.context.set_error(message.clone());
                JobOutcome::Failed(message)
            }
        };

        let outcome = Arc::new(outcome);
        let hooks = self.listeners_lock().take_done();
        listeners::run_all(
            "done",
            self.label(),
            hooks
                .into_iter()
                .map(|h| h(Arc::clone(&outcome)))
                .collect(),
        )
        .await;
        Ok(())
    }

    /// `running → after_run`: run `after` listeners, then delete or reschedule the record.
    ///
    /// A job cancelled before it reached `running` may also enter `after_run`.
    pub async fn after_run(&self) -> Result<(), JobError> {
        {
            let mut status = self.status_lock();
            let allowed = *status == JobStatus::Running
                || (self.context.is_cancelled()
                    && matches!(*status, JobStatus::Waiting | JobStatus::BeforeRun));
            if !allowed {
                return Err(JobError::InvalidState {
                    expected: JobStatus::Running.as_str(),
                    actual: *status,
                });
            }
            *status = JobStatus::AfterRun;
        }

        let hooks = self.listeners_lock().take_after();
        listeners::run_all("after", self.label(), hooks.into_iter().map(|h| h()).collect())
            .await;

        let record = {
            let mut record = self.record_lock();
            if !record.delete_after_run {
                complete_run(&mut record, now_millis());
            }
            record.clone()
        };
        let persisted = if record.delete_after_run {
            self.store.remove_job(record.id).await
        } else {
            self.store.save_run_state(&record).await
        };

        self.events.publish_with(|| JobEvent::Finished {
            job_id: record.id,
            job_name: record.name.clone(),
            job_type: record.job_type.to_string(),
            timestamp: now_millis(),
            result: self
                .context
                .result()
                .unwrap_or(JobResult::Success)
                .as_str()
                .to_string(),
            reason: self.context.error(),
            statistics: self.context.statistics(),
        });

        persisted.map_err(JobError::Store)
    }

    /// Terminal transition to `end`. Never fails.
    pub fn finished(&self) {
        let mut status = self.status_lock();
        if *status != JobStatus::AfterRun {
            tracing::debug!(job = %self.label(), from = %*status, "job finished early");
        }
        *status = JobStatus::End;
    }

    fn advance(&self, expected: JobStatus, next: JobStatus) -> Result<(), JobError> {
        let mut status = self.status_lock();
        if *status != expected {
            return Err(JobError::InvalidState {
                expected: expected.as_str(),
                actual: *status,
            });
        }
        *status = next;
        Ok(())
    }

    fn record_lock(&self) -> MutexGuard<'_, JobRecord> {
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn status_lock(&self) -> MutexGuard<'_, JobStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn callback_lock(&self) -> MutexGuard<'_, Option<JobCallback>> {
        self.callback.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn listeners_lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}
