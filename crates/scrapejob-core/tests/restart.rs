//! Integration test: jobs survive a scheduler restart on the same database file.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use scrapejob_core::diagnostics::Diagnostics;
use scrapejob_core::job::JobOutput;
use scrapejob_core::now_millis;
use scrapejob_core::scheduler::{JobHandler, JobRegistry, JobScheduler};
use scrapejob_core::store::{JobRequest, JobState, JobStore, JobType, MIN_INTERVAL_MS};
use tempfile::tempdir;

#[tokio::test]
async fn crashed_running_job_is_recovered_and_runs_again() {
    let state_dir = tempdir().unwrap();
    let db_path = state_dir.path().join("jobs.db");

    let id = {
        let store = JobStore::open_at(&db_path).await.unwrap();
        let id = store
            .add_job(&JobRequest::new(JobType::Feed, "feed-https://b.com/rss").interval(MIN_INTERVAL_MS))
            .await
            .unwrap();
        // Simulate a process that died mid-run.
        let mut record = store.get_job(id).await.unwrap().unwrap();
        record.state = JobState::Running;
        record.running_since = Some(now_millis());
        record.next_run = Some(now_millis() - 1);
        store.update_job(&record).await.unwrap();
        id
    };

    let store = JobStore::open_at(&db_path).await.unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let mut registry = JobRegistry::new();
    registry.register(
        JobType::Feed,
        JobHandler::new(move |_, _| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(JobOutput::Nothing)
            }
        }),
    );
    let scheduler = JobScheduler::new(&common::config(), store.clone(), registry, Diagnostics::new());

    // Running records are never fetched until setup resets them.
    assert_eq!(scheduler.fetch_jobs().await.unwrap(), 0);
    scheduler.setup(Vec::new()).await.unwrap();
    assert_eq!(store.get_job(id).await.unwrap().unwrap().state, JobState::Waiting);

    assert_eq!(scheduler.fetch_jobs().await.unwrap(), 1);
    scheduler.queue().start();
    let r = Arc::clone(&runs);
    common::wait_for("job to run", move || {
        let r = Arc::clone(&r);
        async move { r.load(Ordering::SeqCst) == 1 }
    })
    .await;
}
