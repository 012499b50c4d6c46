//! Turning records into queued jobs, and what happens when they finish.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use anyhow::Result;

use crate::diagnostics::JobResultEvent;
use crate::job::{Job, JobOutcome, JobOutput};
use crate::now_millis;
use crate::store::{JobId, JobRecord, JobRef, JobRequest};

use super::notify::JobCompletion;
use super::JobScheduler;

/// Clears the fetch flag when a fetch ends, however it ends.
struct FetchGuard<'a>(&'a std::sync::atomic::AtomicBool);

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl JobScheduler {
    /// Pull due records through the strategy and queue them. Returns how many were queued.
    ///
    /// Skipped while a previous fetch is still in flight or the queue is full.
    pub async fn fetch_jobs(self: &Arc<Self>) -> Result<usize> {
        if self.fetching.swap(true, Ordering::SeqCst) {
            tracing::debug!("previous fetch still running, skipping");
            return Ok(0);
        }
        let _guard = FetchGuard(&self.fetching);

        if self.queue.is_full() {
            tracing::debug!("job queue full, skipping fetch");
            return Ok(0);
        }

        let in_queue: Vec<JobRecord> = self
            .queue
            .running_jobs()
            .into_iter()
            .chain(self.queue.waiting_jobs())
            .map(|j| j.job.record())
            .collect();
        let known: HashSet<JobId> = in_queue.iter().map(|r| r.id).collect();

        let records = self
            .strategy
            .select(&self.store, &self.queue, &in_queue)
            .await?;
        let mut queued = 0;
        for record in records {
            if known.contains(&record.id) {
                continue;
            }
            if self.dispatch_record(record).is_some() {
                queued += 1;
            }
        }
        if queued > 0 {
            tracing::info!(queued, "fetched jobs");
        }
        Ok(queued)
    }

    /// Build a job for `record` from its type's handler and queue it.
    /// Returns `None` if the filter rejects it or no handler is registered.
    pub fn dispatch_record(self: &Arc<Self>, record: JobRecord) -> Option<Arc<Job>> {
        if let Some(filter) = self.current_filter() {
            if !filter(&record) {
                tracing::debug!(job_id = record.id, job = %record.name, "job filtered out");
                return None;
            }
        }
        let Some(handler) = self.registry.get(record.job_type).cloned() else {
            tracing::warn!(
                job_id = record.id,
                job_type = %record.job_type,
                "no handler registered for job type, skipping"
            );
            return None;
        };

        let snapshot = record.clone();
        let event = handler.event().map(str::to_string);
        let job = Arc::new(Job::new(
            record,
            Box::new(move |ctx| handler.invoke(ctx, &snapshot)),
            self.store.clone(),
            self.diagnostics.jobs.clone(),
        ));
        match event {
            Some(event) => self.queue_emittable_job(Arc::clone(&job), event),
            None => self.queue_job(Arc::clone(&job)),
        }
        Some(job)
    }

    /// Queue a job whose successful output may carry follow-up jobs to persist.
    pub fn queue_job(self: &Arc<Self>, job: Arc<Job>) {
        let weak = Arc::downgrade(self);
        let watched = Arc::downgrade(&job);
        job.on_done(move |outcome| async move {
            let (Some(scheduler), Some(job)) = (weak.upgrade(), watched.upgrade()) else {
                return Ok(());
            };
            match outcome.as_ref() {
                JobOutcome::Success(JobOutput::Jobs(requests)) => {
                    if let Err(e) = scheduler.add_jobs(requests.clone()).await {
                        tracing::error!(job = %job.label(), "persisting follow-up jobs failed: {:#}", e);
                    }
                }
                JobOutcome::Success(_) => {}
                JobOutcome::Failed(reason) => {
                    tracing::error!(job = %job.label(), "job failed: {}", reason);
                }
            }
            scheduler
                .handle_error_notification(&job, outcome.is_success())
                .await;
            Ok(())
        });
        self.set_job_listener(&job);
        self.queue.add_job(job);
    }

    /// Queue a job whose output is published on the business event bus as `event`,
    /// or `<event>:error` on failure.
    pub fn queue_emittable_job(self: &Arc<Self>, job: Arc<Job>, event: String) {
        let weak = Arc::downgrade(self);
        let watched = Arc::downgrade(&job);
        job.on_done(move |outcome| async move {
            let (Some(scheduler), Some(job)) = (weak.upgrade(), watched.upgrade()) else {
                return Ok(());
            };
            let job_id = job.id();
            scheduler
                .handle_error_notification(&job, outcome.is_success())
                .await;
            match outcome.as_ref() {
                JobOutcome::Success(output) => {
                    scheduler.results.publish_with(|| JobResultEvent {
                        event: event.clone(),
                        job_id,
                        payload: output.payload(),
                    });
                }
                JobOutcome::Failed(reason) => {
                    scheduler.results.publish_with(|| JobResultEvent {
                        event: format!("{}:error", event),
                        job_id,
                        payload: serde_json::json!({ "error": reason }),
                    });
                }
            }
            Ok(())
        });
        self.set_job_listener(&job);
        self.queue.add_job(job);
    }

    /// Track the job while it runs; once it is done, dispatch the jobs waiting on it.
    fn set_job_listener(self: &Arc<Self>, job: &Arc<Job>) {
        let weak = Arc::downgrade(self);
        let watched = Arc::downgrade(job);
        job.on_before(move || async move {
            if let (Some(scheduler), Some(job)) = (weak.upgrade(), watched.upgrade()) {
                let mut tracked = scheduler.lock_tracked();
                tracked.by_id.insert(job.id(), Arc::clone(&job));
                tracked.by_name.insert(job.name(), job);
            }
            Ok(())
        });

        let weak: Weak<Self> = Arc::downgrade(self);
        let watched = Arc::downgrade(job);
        job.on_after(move || async move {
            let (Some(scheduler), Some(job)) = (weak.upgrade(), watched.upgrade()) else {
                return Ok(());
            };
            {
                let mut tracked = scheduler.lock_tracked();
                tracked.by_id.remove(&job.id());
                tracked.by_name.remove(&job.name());
            }
            for record in scheduler.get_after_jobs(job.id()).await? {
                tracing::debug!(job = %job.label(), next = %record.name, "dispatching dependent job");
                scheduler.dispatch_record(record);
            }
            Ok(())
        });
    }

    /// Enabled jobs configured to run after `id`.
    async fn get_after_jobs(&self, id: JobId) -> Result<Vec<JobRecord>> {
        self.store.jobs_after(id).await
    }

    /// Persist job requests, deferring those whose `run_after` names a job that is not
    /// stored yet until a pass makes no more progress. Unresolvable requests are logged
    /// and dropped.
    pub async fn add_jobs(&self, requests: Vec<JobRequest>) -> Result<Vec<JobId>> {
        let mut pending = requests;
        let mut added = Vec::new();
        loop {
            let mut deferred = Vec::new();
            let before = pending.len();
            for mut request in pending {
                if let Some(JobRef::Name(target)) = &request.run_after {
                    match self.store.get_job_by_name(target).await? {
                        Some(parent) => request.run_after = Some(JobRef::Id(parent.id)),
                        None => {
                            deferred.push(request);
                            continue;
                        }
                    }
                }
                added.push(self.store.ensure_job(&request).await?);
            }
            if deferred.is_empty() {
                break;
            }
            if deferred.len() == before {
                for request in &deferred {
                    tracing::warn!(
                        job = %request.name,
                        run_after = ?request.run_after,
                        "dropping job with unresolvable run_after"
                    );
                }
                break;
            }
            pending = deferred;
        }
        Ok(added)
    }

    /// Remove a tracked job: unqueue it, forget it and delete its record.
    /// Unknown keys are logged and reported as `false`.
    pub async fn remove_dependant(&self, key: &JobRef) -> Result<bool> {
        let job = {
            let mut tracked = self.lock_tracked();
            let job = match key {
                JobRef::Id(id) => tracked.by_id.get(id).cloned(),
                JobRef::Name(name) => tracked.by_name.get(name).cloned(),
            };
            if let Some(job) = &job {
                tracked.by_id.remove(&job.id());
                tracked.by_name.remove(&job.name());
            }
            job
        };
        let Some(job) = job else {
            tracing::warn!(key = ?key, "no tracked job to remove");
            return Ok(false);
        };
        self.queue.remove_job(&job);
        self.store.remove_job(job.id()).await?;
        tracing::info!(job = %job.label(), "removed dependant job");
        Ok(true)
    }

    /// Failure accounting for one finished job across every hook it touched.
    async fn handle_error_notification(&self, job: &Job, success: bool) {
        let mut hooks = job.context().hooks();
        hooks.sort();
        hooks.dedup();
        if hooks.is_empty() {
            return;
        }
        let name = job.name();
        let done = JobCompletion {
            job_id: job.id(),
            job_name: &name,
            job_type: job.job_type(),
            success,
            date: now_millis(),
        };
        let notifications: Vec<_> = {
            let mut failures = self.lock_failures();
            hooks
                .iter()
                .flat_map(|hook| failures.record(hook, &done))
                .collect()
        };
        for notification in notifications {
            tracing::warn!(kind = %notification.kind, "{}", notification.title);
            if let Err(e) = self.store.insert_notification(&notification).await {
                tracing::error!("storing notification failed: {:#}", e);
            }
        }
    }
}
