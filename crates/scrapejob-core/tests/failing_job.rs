//! Integration test: a failing job on a file-backed store is reported, rescheduled and
//! counted against its hook.

mod common;

use std::time::Duration;

use scrapejob_core::diagnostics::{Diagnostics, JobEvent};
use scrapejob_core::scheduler::{JobHandler, JobRegistry, JobScheduler};
use scrapejob_core::store::{JobRequest, JobState, JobStore, JobType, MIN_INTERVAL_MS};
use tempfile::tempdir;

#[tokio::test]
async fn failing_job_is_reported_and_rescheduled() {
    let state_dir = tempdir().unwrap();
    let store = JobStore::open_at(state_dir.path().join("jobs.db")).await.unwrap();
    let id = store
        .add_job(
            &JobRequest::new(JobType::Toc, "toc-https://a.com/novel/1")
                .interval(MIN_INTERVAL_MS)
                .run_immediately(),
        )
        .await
        .unwrap();

    let mut registry = JobRegistry::new();
    registry.register(
        JobType::Toc,
        JobHandler::new(|_, _| async { Err(anyhow::anyhow!("boom")) }).with_hooks(["hook"]),
    );
    let diagnostics = Diagnostics::new();
    let mut events = diagnostics.jobs.subscribe();
    let scheduler = JobScheduler::new(&common::config(), store.clone(), registry, diagnostics);

    assert_eq!(scheduler.fetch_jobs().await.unwrap(), 1);
    scheduler.queue().start();

    let (result, reason) = loop {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("job event")
            .unwrap();
        if let JobEvent::Finished {
            job_id,
            result,
            reason,
            ..
        } = event
        {
            assert_eq!(job_id, id);
            break (result, reason);
        }
    };
    assert_eq!(result, "failed");
    assert!(reason.unwrap_or_default().contains("boom"));

    let s = store.clone();
    common::wait_for("record to be rescheduled", move || {
        let s = s.clone();
        async move {
            s.get_job(id)
                .await
                .unwrap()
                .map(|r| r.state == JobState::Waiting && r.last_run.is_some())
                .unwrap_or(false)
        }
    })
    .await;
    let record = store.get_job(id).await.unwrap().unwrap();
    assert!(record.next_run.unwrap() >= record.last_run.unwrap() + MIN_INTERVAL_MS);

    let sc = scheduler.clone();
    common::wait_for("failure to be counted", move || {
        let sc = sc.clone();
        async move { sc.failure_count("hook", JobType::Toc, id) == 1 }
    })
    .await;
}
