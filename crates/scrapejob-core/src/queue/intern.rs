use std::sync::Arc;

use crate::job::Job;
use crate::now_millis;

/// Queue bookkeeping around one job.
pub(super) struct InternJob {
    pub(super) job: Arc<Job>,
    pub(super) active: bool,
    pub(super) running: bool,
    pub(super) start_run: Option<i64>,
    pub(super) last_run: Option<i64>,
    pub(super) queued_at: i64,
}

impl InternJob {
    pub(super) fn new(job: Arc<Job>) -> Self {
        let last_run = job.context().last_run();
        Self {
            job,
            active: false,
            running: false,
            start_run: None,
            last_run,
            queued_at: now_millis(),
        }
    }

    pub(super) fn activate(&mut self, now: i64) {
        self.active = true;
        self.running = true;
        self.start_run = Some(now);
    }

    pub(super) fn outside(&self) -> OutsideJob {
        OutsideJob {
            job: Arc::clone(&self.job),
            active: self.active,
            running: self.running,
            start_run: self.start_run,
            last_run: self.last_run,
        }
    }
}

/// Read-only snapshot of a queued or active job.
#[derive(Debug, Clone)]
pub struct OutsideJob {
    pub job: Arc<Job>,
    pub active: bool,
    pub running: bool,
    /// Epoch ms at which the queue started executing the job.
    pub start_run: Option<i64>,
    pub last_run: Option<i64>,
}

impl OutsideJob {
    /// Milliseconds since the job started, if it has.
    pub fn running_for(&self, now: i64) -> Option<i64> {
        self.start_run.map(|start| now - start)
    }
}
