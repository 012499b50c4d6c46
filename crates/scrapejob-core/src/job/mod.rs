//! One-shot job lifecycle around a persisted job record.
//!
//! A [`Job`] walks `waiting → before_run → running → after_run → end` exactly once,
//! running its callback at most once and persisting the record's run state on the way.

mod context;
mod lifecycle;
mod listeners;
pub mod schedule;

use futures::future::BoxFuture;
use serde::Serialize;

use crate::store::JobRequest;

pub use context::{
    JobContext, JobResult, JobStatistics, Modification, ModificationKind, NetworkRequest,
    NetworkSummary, QuerySummary,
};
pub use lifecycle::Job;
pub use listeners::{HookFuture, ListenerId};

/// Lifecycle position of a job. Strictly forward-moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    BeforeRun,
    Running,
    AfterRun,
    End,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::BeforeRun => "before_run",
            JobStatus::Running => "running",
            JobStatus::AfterRun => "after_run",
            JobStatus::End => "end",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value produced by a job callback.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum JobOutput {
    #[default]
    Nothing,
    /// Arbitrary result, forwarded to the business event bus for event-emitting job types.
    Value(serde_json::Value),
    /// Follow-up jobs to persist.
    Jobs(Vec<JobRequest>),
}

impl JobOutput {
    pub fn payload(&self) -> serde_json::Value {
        match self {
            JobOutput::Nothing => serde_json::Value::Null,
            JobOutput::Value(v) => v.clone(),
            JobOutput::Jobs(jobs) => serde_json::to_value(jobs).unwrap_or_default(),
        }
    }
}

impl From<JobRequest> for JobOutput {
    fn from(req: JobRequest) -> Self {
        JobOutput::Jobs(vec![req])
    }
}

impl From<Vec<JobRequest>> for JobOutput {
    fn from(reqs: Vec<JobRequest>) -> Self {
        JobOutput::Jobs(reqs)
    }
}

/// Outcome handed to `done` listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success(JobOutput),
    Failed(String),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }
}

/// The unit of work a job runs. Receives the job's context.
pub type JobCallback =
    Box<dyn FnOnce(JobContext) -> BoxFuture<'static, anyhow::Result<JobOutput>> + Send>;
