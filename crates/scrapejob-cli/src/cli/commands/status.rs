//! `scrapejob status` – list all job records.

use anyhow::Result;
use scrapejob_core::now_millis;
use scrapejob_core::store::JobStore;

/// Human-readable distance from `now` to `at`, e.g. `in 5m` or `3h ago`.
pub(crate) fn relative(at: Option<i64>, now: i64) -> String {
    let Some(at) = at else {
        return "-".to_string();
    };
    let delta = (at - now) / 1000;
    let abs = delta.unsigned_abs();
    let span = if abs < 60 {
        format!("{abs}s")
    } else if abs < 3600 {
        format!("{}m", abs / 60)
    } else if abs < 86_400 {
        format!("{}h", abs / 3600)
    } else {
        format!("{}d", abs / 86_400)
    };
    if delta >= 0 {
        format!("in {span}")
    } else {
        format!("{span} ago")
    }
}

pub async fn run_status(store: &JobStore, json: bool) -> Result<()> {
    let jobs = store.list_jobs().await?;
    if json {
        for j in &jobs {
            println!("{}", serde_json::to_string(j)?);
        }
        return Ok(());
    }
    if jobs.is_empty() {
        println!("No jobs in database.");
        return Ok(());
    }
    let now = now_millis();
    println!(
        "{:<6} {:<26} {:<8} {:<4} {:<10} {}",
        "ID", "TYPE", "STATE", "ON", "NEXT RUN", "NAME"
    );
    for j in jobs {
        println!(
            "{:<6} {:<26} {:<8} {:<4} {:<10} {}",
            j.id,
            j.job_type.as_str(),
            j.state.as_str(),
            if j.enabled { "yes" } else { "no" },
            relative(j.next_run, now),
            j.name
        );
    }
    Ok(())
}
