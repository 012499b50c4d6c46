//! `scrapejob remove <id>` – delete a job record.

use anyhow::{bail, Result};
use scrapejob_core::store::{JobId, JobStore};

pub async fn run_remove(store: &JobStore, id: JobId) -> Result<()> {
    let Some(job) = store.get_job(id).await? else {
        bail!("no job with id {id}");
    };
    let dependents = store.jobs_after(id).await?.len();
    store.remove_job(id).await?;
    if dependents > 0 {
        tracing::info!(job_id = id, dependents, "released dependent jobs");
    }
    println!("Removed job {id} ({})", job.name);
    Ok(())
}
