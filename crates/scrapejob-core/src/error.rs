//! Error types shared by the job lifecycle, the queue and the throttle.

use thiserror::Error;

use crate::job::JobStatus;

/// Error returned by the job lifecycle methods.
#[derive(Debug, Error)]
pub enum JobError {
    /// A lifecycle method was invoked out of sequence. Programmer error, never retried.
    #[error("invalid job transition: expected state {expected}, job is {actual}")]
    InvalidState {
        expected: &'static str,
        actual: JobStatus,
    },
    /// Cancellation was requested and observed at a lifecycle boundary.
    #[error("job aborted")]
    Aborted,
    /// Persisting the job record failed.
    #[error("job store: {0:#}")]
    Store(#[source] anyhow::Error),
}

impl JobError {
    /// True if `err` (or anything in its chain) is a cooperative cancellation.
    pub fn is_abort(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(cause.downcast_ref::<JobError>(), Some(JobError::Aborted))
        })
    }
}

/// Error returned by `RequestQueue::push` when the request never produced an outcome.
#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("request queue {queue} dropped the request before it completed")]
    Dropped { queue: String },
}
