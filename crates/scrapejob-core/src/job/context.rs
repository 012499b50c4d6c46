//! Per-job context store: cancellation, counters and result bookkeeping.
//!
//! A context is created once per job, handed to the job's callback and read back by the
//! queue after the run. Clones share the same state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::store::JobId;

/// Final result code of a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobResult {
    Success,
    Failed,
    Aborted,
}

impl JobResult {
    pub fn as_str(self) -> &'static str {
        match self {
            JobResult::Success => "success",
            JobResult::Failed => "failed",
            JobResult::Aborted => "aborted",
        }
    }
}

/// One outbound HTTP exchange, recorded by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkRequest {
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// What happened to a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Modification {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkSummary {
    pub count: u64,
    pub sent: u64,
    pub received: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuerySummary {
    pub count: u64,
    pub duration_ms: u64,
}

/// Aggregated counters reported when a job finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStatistics {
    pub network: NetworkSummary,
    pub queries: QuerySummary,
    pub modifications: BTreeMap<String, Modification>,
}

#[derive(Debug, Default)]
struct ContextData {
    requests: Vec<NetworkRequest>,
    queries: QuerySummary,
    modifications: BTreeMap<String, Modification>,
    hooks: BTreeSet<String>,
    result: Option<JobResult>,
    error: Option<String>,
    message: Option<String>,
}

struct Inner {
    job_id: JobId,
    label: String,
    last_run: Option<i64>,
    cancel: CancellationToken,
    data: Mutex<ContextData>,
}

#[derive(Clone)]
pub struct JobContext {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.inner.job_id)
            .field("label", &self.inner.label)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl JobContext {
    pub fn new(job_id: JobId, label: impl Into<String>, last_run: Option<i64>) -> Self {
        Self {
            inner: Arc::new(Inner {
                job_id,
                label: label.into(),
                last_run,
                cancel: CancellationToken::new(),
                data: Mutex::new(ContextData::default()),
            }),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.inner.job_id
    }

    /// `"<id>-<name>"`, used in logs.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// When the job last completed, so callbacks can fetch only what changed since.
    pub fn last_run(&self) -> Option<i64> {
        self.inner.last_run
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Err(`JobError::Aborted`) once cancellation was requested.
    pub fn check_cancelled(&self) -> Result<(), JobError> {
        if self.is_cancelled() {
            Err(JobError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&self) {
        self.inner.cancel.cancelled().await
    }

    pub(crate) fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn record_request(&self, request: NetworkRequest) {
        self.data().requests.push(request);
    }

    pub fn record_query(&self, duration: Duration) {
        let mut data = self.data();
        data.queries.count += 1;
        data.queries.duration_ms += duration.as_millis() as u64;
    }

    pub fn record_modification(&self, entity: &str, kind: ModificationKind) {
        let mut data = self.data();
        let m = data.modifications.entry(entity.to_string()).or_default();
        match kind {
            ModificationKind::Created => m.created += 1,
            ModificationKind::Updated => m.updated += 1,
            ModificationKind::Deleted => m.deleted += 1,
        }
    }

    /// Mark that this run used an external scraper hook.
    pub fn record_hook(&self, hook: &str) {
        self.data().hooks.insert(hook.to_string());
    }

    pub fn hooks(&self) -> Vec<String> {
        self.data().hooks.iter().cloned().collect()
    }

    pub fn requests(&self) -> Vec<NetworkRequest> {
        self.data().requests.clone()
    }

    pub fn result(&self) -> Option<JobResult> {
        self.data().result
    }

    pub fn set_result(&self, result: JobResult) {
        self.data().result = Some(result);
    }

    /// Set the result unless one was already recorded.
    pub fn set_result_if_unset(&self, result: JobResult) {
        self.data().result.get_or_insert(result);
    }

    pub fn error(&self) -> Option<String> {
        self.data().error.clone()
    }

    pub fn set_error(&self, error: impl Into<String>) {
        self.data().error = Some(error.into());
    }

    pub fn message(&self) -> Option<String> {
        self.data().message.clone()
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.data().message = Some(message.into());
    }

    pub fn statistics(&self) -> JobStatistics {
        let data = self.data();
        let network = data
            .requests
            .iter()
            .fold(NetworkSummary::default(), |mut acc, r| {
                acc.count += 1;
                acc.sent += r.bytes_sent;
                acc.received += r.bytes_received;
                acc
            });
        JobStatistics {
            network,
            queries: data.queries,
            modifications: data.modifications.clone(),
        }
    }

    fn data(&self) -> MutexGuard<'_, ContextData> {
        self.inner.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_aggregate_counters() {
        let ctx = JobContext::new(4, "4-toc", None);
        ctx.record_request(NetworkRequest {
            method: "GET".into(),
            url: "https://a.com/1".into(),
            status: Some(200),
            bytes_sent: 100,
            bytes_received: 2_000,
        });
        ctx.record_request(NetworkRequest {
            method: "POST".into(),
            url: "https://a.com/2".into(),
            status: Some(500),
            bytes_sent: 50,
            bytes_received: 10,
        });
        ctx.record_query(Duration::from_millis(12));
        ctx.record_query(Duration::from_millis(3));
        ctx.record_modification("episode", ModificationKind::Created);
        ctx.record_modification("episode", ModificationKind::Created);
        ctx.record_modification("part", ModificationKind::Deleted);

        let stats = ctx.statistics();
        assert_eq!(
            stats.network,
            NetworkSummary {
                count: 2,
                sent: 150,
                received: 2_010
            }
        );
        assert_eq!(stats.queries.count, 2);
        assert_eq!(stats.queries.duration_ms, 15);
        assert_eq!(stats.modifications["episode"].created, 2);
        assert_eq!(stats.modifications["part"].deleted, 1);
    }

    #[test]
    fn result_if_unset_keeps_first_value() {
        let ctx = JobContext::new(1, "1-x", None);
        ctx.set_result(JobResult::Failed);
        ctx.set_result_if_unset(JobResult::Success);
        assert_eq!(ctx.result(), Some(JobResult::Failed));
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let ctx = JobContext::new(1, "1-x", Some(10));
        let clone = ctx.clone();
        assert!(clone.check_cancelled().is_ok());
        ctx.cancel();
        assert!(matches!(clone.check_cancelled(), Err(JobError::Aborted)));
        assert_eq!(clone.last_run(), Some(10));
    }
}
