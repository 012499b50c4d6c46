use anyhow::Result;

use crate::store::{JobRequest, JobType};

use super::JobScheduler;

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Periodic maintenance jobs every installation runs.
pub fn maintenance_jobs(news_adapters: &[String]) -> Vec<JobRequest> {
    let mut jobs: Vec<JobRequest> = news_adapters
        .iter()
        .map(|adapter| {
            JobRequest::new(JobType::News, format!("{}-news", adapter))
                .interval(5 * MINUTE_MS)
                .arguments(serde_json::Value::String(adapter.clone()).to_string())
                .run_immediately()
        })
        .collect();
    jobs.extend([
        JobRequest::new(JobType::CheckTocs, "check-tocs")
            .interval(HOUR_MS)
            .run_immediately(),
        JobRequest::new(JobType::QueueTocs, "queue-tocs")
            .interval(HOUR_MS)
            .run_immediately(),
        JobRequest::new(JobType::RemapMediaParts, "remap-media-parts")
            .interval(HOUR_MS)
            .run_immediately(),
        JobRequest::new(JobType::QueueExternalUser, "queue-external-user")
            .interval(7 * DAY_MS)
            .run_immediately(),
        JobRequest::new(JobType::RemoveUsedMediaInWaits, "remove-used-media-in-waits")
            .interval(DAY_MS)
            .run_immediately(),
    ]);
    jobs
}

impl JobScheduler {
    /// Recover from a previous crash and make sure the maintenance jobs exist.
    ///
    /// `discovered` are extra jobs found at startup (e.g. by adapters); they are persisted
    /// together with the maintenance jobs. Existing jobs with the same name are kept.
    pub async fn setup(&self, discovered: Vec<JobRequest>) -> Result<()> {
        tracing::info!(handlers = self.registry.len(), "loaded job handlers");

        let recovered = self.store.stop_running_jobs().await?;
        if recovered > 0 {
            tracing::warn!(recovered, "reset jobs left running by a previous process");
        }

        let mut jobs = maintenance_jobs(&self.config.news_adapters);
        jobs.extend(discovered);
        let ids = self.add_jobs(jobs).await?;
        tracing::info!(jobs = ids.len(), "scheduler setup complete");
        Ok(())
    }
}
