//! `scrapejob recover` – reset jobs a crashed scheduler left running.

use anyhow::Result;
use scrapejob_core::store::JobStore;

pub async fn run_recover(store: &JobStore) -> Result<()> {
    let n = store.stop_running_jobs().await?;
    println!("Reset {n} running job(s) to waiting");
    Ok(())
}
