//! Job write operations: add, update, run state, enable, recover, remove.

use anyhow::Result;

use crate::now_millis;

use super::super::db::JobStore;
use super::super::types::{JobId, JobRecord, JobRef, JobRequest, JobState};

impl JobStore {
    /// Insert a new waiting job. `run_after` must already be a concrete id.
    ///
    /// The first run is due immediately for `run_immediately` and run-once jobs,
    /// otherwise one interval from now.
    pub async fn add_job(&self, req: &JobRequest) -> Result<JobId> {
        let run_after = match &req.run_after {
            None => None,
            Some(JobRef::Id(id)) => Some(*id),
            Some(JobRef::Name(name)) => {
                anyhow::bail!("job {:?} waits for unresolved job {:?}", req.name, name)
            }
        };
        let now = now_millis();
        let next_run = if req.run_immediately || req.interval <= 0 {
            now
        } else {
            now + req.interval
        };

        let row_id = sqlx::query(
            r#"
            INSERT INTO jobs (
                type, name, enabled, state, interval, delete_after_run,
                run_immediately, last_run, next_run, previous_scheduled_at,
                running_since, arguments, run_after
            ) VALUES (?1, ?2, 1, ?3, ?4, ?5, ?6, NULL, ?7, NULL, NULL, ?8, ?9)
            "#,
        )
        .bind(req.job_type.as_str())
        .bind(&req.name)
        .bind(JobState::Waiting.as_str())
        .bind(req.interval)
        .bind(req.delete_after_run)
        .bind(req.run_immediately)
        .bind(next_run)
        .bind(&req.arguments)
        .bind(run_after)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(row_id)
    }

    /// Insert the job unless a job with the same name exists. Returns the id either way.
    pub async fn ensure_job(&self, req: &JobRequest) -> Result<JobId> {
        if let Some(existing) = self.get_job_by_name(&req.name).await? {
            return Ok(existing.id);
        }
        self.add_job(req).await
    }

    /// Persist the mutable fields of a job record.
    pub async fn update_job(&self, job: &JobRecord) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET enabled = ?1,
                state = ?2,
                interval = ?3,
                delete_after_run = ?4,
                run_immediately = ?5,
                last_run = ?6,
                next_run = ?7,
                previous_scheduled_at = ?8,
                running_since = ?9,
                arguments = ?10,
                run_after = ?11
            WHERE id = ?12
            "#,
        )
        .bind(job.enabled)
        .bind(job.state.as_str())
        .bind(job.interval)
        .bind(job.delete_after_run)
        .bind(job.run_immediately)
        .bind(job.last_run)
        .bind(job.next_run)
        .bind(job.previous_scheduled_at)
        .bind(job.running_since)
        .bind(&job.arguments)
        .bind(job.run_after)
        .bind(job.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist only the run bookkeeping of a record: state, interval and the schedule.
    ///
    /// Operator-owned columns (`enabled`, `run_after`, `arguments`, ...) keep whatever the
    /// store holds, so a job finishing with an old snapshot never reverts them.
    pub async fn save_run_state(&self, job: &JobRecord) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?1,
                interval = ?2,
                last_run = ?3,
                next_run = ?4,
                previous_scheduled_at = ?5,
                running_since = ?6
            WHERE id = ?7
            "#,
        )
        .bind(job.state.as_str())
        .bind(job.interval)
        .bind(job.last_run)
        .bind(job.next_run)
        .bind(job.previous_scheduled_at)
        .bind(job.running_since)
        .bind(job.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Enable or disable a job. Returns false if no such job exists.
    pub async fn set_enabled(&self, id: JobId, enabled: bool) -> Result<bool> {
        let r = sqlx::query("UPDATE jobs SET enabled = ?1 WHERE id = ?2")
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected() > 0)
    }

    /// Reset every job left in `running` (e.g. after a crash) to `waiting`.
    /// Returns the number of jobs reset.
    pub async fn stop_running_jobs(&self) -> Result<u64> {
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'waiting',
                running_since = NULL
            WHERE state = 'running'
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    /// Permanently remove a job row. Jobs waiting on it are released.
    pub async fn remove_job(&self, id: JobId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE jobs SET run_after = NULL WHERE run_after = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM jobs WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
