//! `scrapejob add <type> <name>` – persist a new job record.

use anyhow::{bail, Result};
use scrapejob_core::store::{JobId, JobRef, JobRequest, JobStore, JobType};

#[derive(Debug)]
pub struct AddArgs {
    pub job_type: JobType,
    pub name: String,
    pub interval: i64,
    pub args: Option<String>,
    pub run_immediately: bool,
    pub delete_after_run: bool,
    pub run_after: Option<JobId>,
}

impl AddArgs {
    fn into_request(self) -> Result<JobRequest> {
        let mut req = JobRequest::new(self.job_type, self.name).interval(self.interval);
        if let Some(args) = self.args {
            serde_json::from_str::<serde_json::Value>(&args)
                .map_err(|e| anyhow::anyhow!("--args is not valid JSON: {e}"))?;
            req = req.arguments(args);
        }
        if self.run_immediately {
            req = req.run_immediately();
        }
        if self.delete_after_run {
            req = req.delete_after_run();
        }
        if let Some(id) = self.run_after {
            req = req.run_after(JobRef::Id(id));
        }
        Ok(req)
    }
}

pub async fn run_add(store: &JobStore, args: AddArgs) -> Result<()> {
    if let Some(id) = args.run_after {
        if store.get_job(id).await?.is_none() {
            bail!("job {id} (--run-after) does not exist");
        }
    }
    if store.get_job_by_name(&args.name).await?.is_some() {
        bail!("a job named `{}` already exists", args.name);
    }
    let req = args.into_request()?;
    let id = store.add_job(&req).await?;
    println!("Added job {id}: {}", req.name);
    Ok(())
}
