//! Tests for the job store (in-memory database).

use crate::now_millis;
use crate::store::{
    JobRef, JobRequest, JobState, JobStore, JobType, Notification, MIN_INTERVAL_MS,
};

#[tokio::test]
async fn add_and_get_job_roundtrip() {
    let store = JobStore::open_memory().await.unwrap();
    let req = JobRequest::new(JobType::Toc, "toc-https://a.com/novel/1")
        .interval(3_600_000)
        .arguments(r#"{"mediumId":3}"#);
    let before = now_millis();
    let id = store.add_job(&req).await.unwrap();

    let job = store.get_job(id).await.unwrap().expect("job exists");
    assert_eq!(job.id, id);
    assert_eq!(job.job_type, JobType::Toc);
    assert_eq!(job.state, JobState::Waiting);
    assert!(job.enabled);
    assert_eq!(job.interval, 3_600_000);
    assert_eq!(job.arguments.as_deref(), Some(r#"{"mediumId":3}"#));
    let next_run = job.next_run.expect("next run set");
    assert!(next_run >= before + 3_600_000);

    let by_name = store
        .get_job_by_name("toc-https://a.com/novel/1")
        .await
        .unwrap()
        .expect("found by name");
    assert_eq!(by_name, job);
}

#[tokio::test]
async fn queryable_jobs_only_returns_due_enabled_waiting() {
    let store = JobStore::open_memory().await.unwrap();
    let due = store
        .add_job(&JobRequest::new(JobType::Feed, "due").run_immediately())
        .await
        .unwrap();
    let _later = store
        .add_job(&JobRequest::new(JobType::Feed, "later").interval(MIN_INTERVAL_MS * 10))
        .await
        .unwrap();
    let disabled = store
        .add_job(&JobRequest::new(JobType::Feed, "disabled").run_immediately())
        .await
        .unwrap();
    store.set_enabled(disabled, false).await.unwrap();
    let running = store
        .add_job(&JobRequest::new(JobType::Feed, "running").run_immediately())
        .await
        .unwrap();
    let mut r = store.get_job(running).await.unwrap().unwrap();
    r.state = JobState::Running;
    store.update_job(&r).await.unwrap();
    let _dependent = store
        .add_job(
            &JobRequest::new(JobType::Feed, "dependent")
                .run_immediately()
                .run_after(JobRef::Id(due)),
        )
        .await
        .unwrap();

    let ids: Vec<_> = store
        .queryable_jobs(now_millis())
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(ids, vec![due]);

    let after = store.jobs_after(due).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].name, "dependent");
}

#[tokio::test]
async fn add_job_rejects_unresolved_run_after() {
    let store = JobStore::open_memory().await.unwrap();
    let req = JobRequest::new(JobType::Toc, "child").run_after(JobRef::Name("parent".into()));
    assert!(store.add_job(&req).await.is_err());
}

#[tokio::test]
async fn ensure_job_is_idempotent_by_name() {
    let store = JobStore::open_memory().await.unwrap();
    let req = JobRequest::new(JobType::CheckTocs, "Check Toc").interval(3_600_000);
    let a = store.ensure_job(&req).await.unwrap();
    let b = store.ensure_job(&req).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(store.list_jobs().await.unwrap().len(), 1);
}

#[tokio::test]
async fn stop_running_jobs_resets_to_waiting() {
    let store = JobStore::open_memory().await.unwrap();
    let id = store
        .add_job(&JobRequest::new(JobType::News, "news"))
        .await
        .unwrap();
    let mut job = store.get_job(id).await.unwrap().unwrap();
    job.state = JobState::Running;
    job.running_since = Some(now_millis());
    store.update_job(&job).await.unwrap();
    assert_eq!(store.jobs_in_state(JobState::Running).await.unwrap().len(), 1);

    let n = store.stop_running_jobs().await.unwrap();
    assert_eq!(n, 1);
    let job = store.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Waiting);
    assert_eq!(job.running_since, None);
}

#[tokio::test]
async fn remove_job_releases_dependents() {
    let store = JobStore::open_memory().await.unwrap();
    let parent = store
        .add_job(&JobRequest::new(JobType::Toc, "parent"))
        .await
        .unwrap();
    let child = store
        .add_job(&JobRequest::new(JobType::Toc, "child").run_after(JobRef::Id(parent)))
        .await
        .unwrap();
    store.remove_job(parent).await.unwrap();
    assert!(store.get_job(parent).await.unwrap().is_none());
    assert_eq!(store.get_job(child).await.unwrap().unwrap().run_after, None);
}

#[tokio::test]
async fn save_run_state_leaves_operator_columns_alone() {
    let store = JobStore::open_memory().await.unwrap();
    let parent = store
        .add_job(&JobRequest::new(JobType::OneTimeToc, "parent").delete_after_run())
        .await
        .unwrap();
    let child = store
        .add_job(
            &JobRequest::new(JobType::Feed, "child")
                .interval(MIN_INTERVAL_MS)
                .run_after(JobRef::Id(parent)),
        )
        .await
        .unwrap();

    // A snapshot taken before the parent went away and the job was disabled.
    let mut snapshot = store.get_job(child).await.unwrap().unwrap();
    store.remove_job(parent).await.unwrap();
    assert!(store.set_enabled(child, false).await.unwrap());

    let now = now_millis();
    snapshot.last_run = Some(now);
    snapshot.next_run = Some(now + MIN_INTERVAL_MS);
    store.save_run_state(&snapshot).await.unwrap();

    let stored = store.get_job(child).await.unwrap().unwrap();
    assert_eq!(stored.run_after, None);
    assert!(!stored.enabled);
    assert_eq!(stored.last_run, Some(now));
    assert_eq!(stored.next_run, Some(now + MIN_INTERVAL_MS));
}

#[tokio::test]
async fn notifications_newest_first() {
    let store = JobStore::open_memory().await.unwrap();
    for (i, title) in ["first", "second"].iter().enumerate() {
        store
            .insert_notification(&Notification {
                title: title.to_string(),
                content: "content".to_string(),
                key: "hook:toc".to_string(),
                kind: "scraper_hook_failing".to_string(),
                date: 1_000 + i as i64,
            })
            .await
            .unwrap();
    }
    let list = store.list_notifications(10).await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].notification.title, "second");
    assert!(!list[0].read);
}
