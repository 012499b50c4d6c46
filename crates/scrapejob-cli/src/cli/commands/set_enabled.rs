//! `scrapejob enable|disable <id>`.

use anyhow::{bail, Result};
use scrapejob_core::store::{JobId, JobStore};

pub async fn run_set_enabled(store: &JobStore, id: JobId, enabled: bool) -> Result<()> {
    if !store.set_enabled(id, enabled).await? {
        bail!("no job with id {id}");
    }
    let verb = if enabled { "Enabled" } else { "Disabled" };
    println!("{verb} job {id}");
    Ok(())
}
