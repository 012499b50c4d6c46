//! Job record CRUD split into read and write halves.

mod read;
mod write;

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::types::{JobRecord, JobState, JobType};

pub(super) const JOB_COLUMNS: &str = "id, type, name, enabled, state, interval, delete_after_run, \
     run_immediately, last_run, next_run, previous_scheduled_at, running_since, arguments, run_after";

pub(super) fn record_from_row(row: &SqliteRow) -> Result<JobRecord> {
    let type_str: String = row.get("type");
    let job_type = JobType::parse(&type_str)
        .ok_or_else(|| anyhow::anyhow!("unknown job type in store: {type_str}"))?;
    let state_str: String = row.get("state");
    Ok(JobRecord {
        id: row.get("id"),
        job_type,
        name: row.get("name"),
        enabled: row.get("enabled"),
        state: JobState::from_str(&state_str),
        interval: row.get("interval"),
        delete_after_run: row.get("delete_after_run"),
        run_immediately: row.get("run_immediately"),
        last_run: row.get("last_run"),
        next_run: row.get("next_run"),
        previous_scheduled_at: row.get("previous_scheduled_at"),
        running_since: row.get("running_since"),
        arguments: row.get("arguments"),
        run_after: row.get("run_after"),
    })
}

pub(super) fn records_from_rows(rows: &[SqliteRow]) -> Result<Vec<JobRecord>> {
    rows.iter().map(record_from_row).collect()
}
