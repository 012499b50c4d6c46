//! Health checks: stuck in-memory jobs, stale `running` records, network liveness.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;

use crate::job::schedule::reset_interrupted;
use crate::now_millis;
use crate::store::{JobId, JobRecord, JobState};

use super::JobScheduler;

const MINUTE_MS: i64 = 60 * 1000;
/// Probe failures within this window suppress stuck-job handling.
pub const NETWORK_GRACE_MS: i64 = 30 * MINUTE_MS;
pub const ABORT_AFTER_MS: i64 = 10 * MINUTE_MS;
pub const SHUTDOWN_AFTER_MS: i64 = 15 * MINUTE_MS;
pub const STORAGE_STUCK_MS: i64 = 120 * MINUTE_MS;
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningVerdict {
    Healthy,
    /// Past the soft timeout: request cancellation.
    Abort,
    /// Past the hard timeout: cancellation did not take, restart the process.
    Shutdown,
}

pub fn running_verdict(running_for_ms: i64) -> RunningVerdict {
    if running_for_ms > SHUTDOWN_AFTER_MS {
        RunningVerdict::Shutdown
    } else if running_for_ms > ABORT_AFTER_MS {
        RunningVerdict::Abort
    } else {
        RunningVerdict::Healthy
    }
}

/// True while a network probe failed within the last 30 minutes.
pub fn network_suppressed(now: i64, last_failure: Option<i64>) -> bool {
    last_failure.is_some_and(|at| now - at < NETWORK_GRACE_MS)
}

/// True for a record persisted as running for more than two hours.
pub fn storage_stuck(record: &JobRecord, now: i64) -> bool {
    record.state == JobState::Running
        && record
            .running_since
            .is_some_and(|since| now - since > STORAGE_STUCK_MS)
}

impl JobScheduler {
    /// Abort jobs past the soft timeout and request a shutdown past the hard one, judged
    /// at `now` (epoch ms). Skipped entirely while the network looks flaky.
    /// Returns how many jobs were aborted.
    pub async fn check_running_jobs(&self, now: i64) -> usize {
        if !self.probe_network().await {
            tracing::warn!(probe = %self.config.probe_host, "network probe failed");
            *self.lock_probe_failure() = Some(now);
        }
        let last_failure = *self.lock_probe_failure();
        if network_suppressed(now, last_failure) {
            tracing::debug!("recent network failure, not checking for stuck jobs");
            return 0;
        }
        if !self.queue.invalid_running(now - ABORT_AFTER_MS, 1) {
            return 0;
        }

        let mut aborted = 0;
        for running in self.queue.running_jobs() {
            let Some(running_for) = running.running_for(now) else {
                continue;
            };
            match running_verdict(running_for) {
                RunningVerdict::Healthy => {}
                RunningVerdict::Abort => {
                    tracing::warn!(
                        job = %running.job.label(),
                        running_for_ms = running_for,
                        "job exceeded soft timeout, aborting"
                    );
                    running.job.abort();
                    aborted += 1;
                }
                RunningVerdict::Shutdown => {
                    self.request_shutdown(&format!(
                        "job {} still running after {}ms",
                        running.job.label(),
                        running_for
                    ));
                    return aborted;
                }
            }
        }
        aborted
    }

    /// Reconcile records persisted as running that no in-memory job is running.
    /// Returns how many records were fixed.
    pub async fn check_current_vs_storage(&self) -> Result<usize> {
        let running: HashSet<JobId> = self
            .queue
            .running_jobs()
            .iter()
            .map(|j| j.job.id())
            .collect();
        let now = now_millis();
        let mut fixed = 0;
        for mut record in self.store.jobs_in_state(JobState::Running).await? {
            if running.contains(&record.id) {
                continue;
            }
            if record.delete_after_run {
                tracing::warn!(job_id = record.id, job = %record.name, "removing orphaned running job");
                self.store.remove_job(record.id).await?;
            } else {
                tracing::warn!(job_id = record.id, job = %record.name, "resetting orphaned running job");
                reset_interrupted(&mut record, now);
                self.store.save_run_state(&record).await?;
            }
            fixed += 1;
        }
        Ok(fixed)
    }

    /// Request a shutdown if any record has been running for over two hours.
    pub async fn check_running_storage_jobs(&self) -> Result<bool> {
        let now = now_millis();
        let stuck: Vec<JobRecord> = self
            .store
            .jobs_in_state(JobState::Running)
            .await?
            .into_iter()
            .filter(|r| storage_stuck(r, now))
            .collect();
        if let Some(first) = stuck.first() {
            self.request_shutdown(&format!(
                "{} job record(s) stuck in running, first: {}",
                stuck.len(),
                first.name
            ));
            return Ok(true);
        }
        Ok(false)
    }

    async fn probe_network(&self) -> bool {
        let host = self.config.probe_host.as_str();
        match tokio::time::timeout(PROBE_TIMEOUT, tokio::net::lookup_host(host)).await {
            Ok(Ok(mut addrs)) => addrs.next().is_some(),
            Ok(Err(e)) => {
                tracing::debug!(probe = %host, "dns lookup failed: {}", e);
                false
            }
            Err(_) => false,
        }
    }
}
