//! Job read operations.

use anyhow::Result;

use super::super::db::JobStore;
use super::super::types::{JobId, JobRecord, JobState};
use super::{record_from_row, records_from_rows, JOB_COLUMNS};

impl JobStore {
    /// Fetch a single job record by id.
    pub async fn get_job(&self, id: JobId) -> Result<Option<JobRecord>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(record_from_row).transpose()
    }

    /// Fetch a single job record by its unique name.
    pub async fn get_job_by_name(&self, name: &str) -> Result<Option<JobRecord>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE name = ?1");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    /// All job records, oldest first. Used for baseline calculation and the CLI.
    pub async fn list_jobs(&self) -> Result<Vec<JobRecord>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        records_from_rows(&rows)
    }

    /// All job records in the given state.
    pub async fn jobs_in_state(&self, state: JobState) -> Result<Vec<JobRecord>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE state = ?1 ORDER BY id ASC");
        let rows = sqlx::query(&sql)
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await?;
        records_from_rows(&rows)
    }

    /// Jobs that may run now: enabled, waiting, due, and not waiting on another job.
    /// Most overdue first.
    pub async fn queryable_jobs(&self, now: i64) -> Result<Vec<JobRecord>> {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE enabled = 1
              AND state = 'waiting'
              AND next_run IS NOT NULL
              AND next_run <= ?1
              AND run_after IS NULL
            ORDER BY next_run ASC, id ASC
            "#
        );
        let rows = sqlx::query(&sql).bind(now).fetch_all(&self.pool).await?;
        records_from_rows(&rows)
    }

    /// Enabled jobs configured to run after the given job.
    pub async fn jobs_after(&self, id: JobId) -> Result<Vec<JobRecord>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE run_after = ?1 AND enabled = 1 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql).bind(id).fetch_all(&self.pool).await?;
        records_from_rows(&rows)
    }
}
