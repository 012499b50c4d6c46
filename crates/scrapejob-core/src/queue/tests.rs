//! Job queue tests. These run on real time; the poll cadence is 500ms/1000ms.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::config::QueueConfig;
use crate::job::JobOutput;
use crate::store::{JobRequest, JobState, JobStore, JobType, MIN_INTERVAL_MS};

fn config(max_active: usize) -> QueueConfig {
    QueueConfig {
        max_active,
        ..QueueConfig::default()
    }
}

async fn job_with<F, Fut>(store: &JobStore, name: &str, f: F) -> Arc<Job>
where
    F: FnOnce(crate::job::JobContext) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = anyhow::Result<JobOutput>> + Send + 'static,
{
    let id = store
        .add_job(&JobRequest::new(JobType::Toc, name).interval(MIN_INTERVAL_MS))
        .await
        .unwrap();
    let record = store.get_job(id).await.unwrap().unwrap();
    Arc::new(Job::from_fn(record, store.clone(), EventChannel::new(), f))
}

async fn idle_job(store: &JobStore, name: &str) -> Arc<Job> {
    job_with(store, name, |_| async { Ok(JobOutput::Nothing) }).await
}

async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn schedulable_jobs_is_clamped() {
    let store = JobStore::open_memory().await.unwrap();
    let queue = JobQueue::new(&config(2), EventChannel::new());
    assert_eq!(queue.schedulable_jobs(), 0);
    for i in 0..5 {
        queue.add_job(idle_job(&store, &format!("job-{}", i)).await);
    }
    assert_eq!(queue.waiting_count(), 5);
    assert_eq!(queue.schedulable_jobs(), 2);
    assert!(queue.is_full());
    // Not started: no poll timer, nothing admitted.
    assert!(!queue.is_polling());
    assert_eq!(queue.active_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn never_exceeds_max_active() {
    let store = JobStore::open_memory().await.unwrap();
    let queue = JobQueue::new(&config(2), EventChannel::new());
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));

    for i in 0..4 {
        let (running, peak, done) = (Arc::clone(&running), Arc::clone(&peak), Arc::clone(&done));
        let job = job_with(&store, &format!("slow-{}", i), move |_| async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1200)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            done.fetch_add(1, Ordering::SeqCst);
            Ok(JobOutput::Nothing)
        })
        .await;
        queue.add_job(job);
    }
    queue.start();

    let q = Arc::clone(&queue);
    let d = Arc::clone(&done);
    wait_until("all jobs to finish", move || {
        assert!(q.active_count() <= 2);
        d.load(Ordering::SeqCst) == 4
    })
    .await;
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(peak.load(Ordering::SeqCst), 2);

    let q = Arc::clone(&queue);
    wait_until("poll timer to stop", move || !q.is_polling()).await;
    assert_eq!(queue.active_count(), 0);
    assert_eq!(queue.waiting_count(), 0);
}

#[tokio::test]
async fn completed_job_is_persisted_waiting() {
    let store = JobStore::open_memory().await.unwrap();
    let queue = JobQueue::new(&config(5), EventChannel::new());
    let job = idle_job(&store, "persisted").await;
    queue.add_job(Arc::clone(&job));
    queue.start();

    let j = Arc::clone(&job);
    wait_until("job to end", move || j.status() == crate::job::JobStatus::End).await;
    assert_eq!(job.context().result(), Some(JobResult::Success));
    let record = store.get_job(job.id()).await.unwrap().unwrap();
    assert_eq!(record.state, JobState::Waiting);
    assert!(record.last_run.is_some());
}

#[tokio::test]
async fn failed_job_gets_failed_result_and_structured_message() {
    let store = JobStore::open_memory().await.unwrap();
    let queue = JobQueue::new(&config(5), EventChannel::new());
    let job = job_with(&store, "broken", |_| async { Err(anyhow::anyhow!("boom")) }).await;
    queue.add_job(Arc::clone(&job));
    queue.start();

    let j = Arc::clone(&job);
    wait_until("job to end", move || j.status() == crate::job::JobStatus::End).await;
    assert_eq!(job.context().result(), Some(JobResult::Failed));
    assert!(job.context().error().unwrap_or_default().contains("boom"));
}

#[tokio::test]
async fn aborted_job_gets_aborted_result() {
    let store = JobStore::open_memory().await.unwrap();
    let queue = JobQueue::new(&config(5), EventChannel::new());
    let job = job_with(&store, "waits-for-abort", |ctx| async move {
        ctx.cancelled().await;
        Ok(JobOutput::Nothing)
    })
    .await;
    queue.add_job(Arc::clone(&job));
    queue.start();

    let q = Arc::clone(&queue);
    wait_until("job to become active", move || q.active_count() == 1).await;
    let snapshot = queue.running_jobs();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].running);
    assert!(Arc::ptr_eq(&snapshot[0].job, &job));

    job.abort();
    let j = Arc::clone(&job);
    wait_until("job to end", move || j.status() == crate::job::JobStatus::End).await;
    assert_eq!(job.context().result(), Some(JobResult::Aborted));
    let message = job.context().message().expect("structured message");
    let parsed: serde_json::Value = serde_json::from_str(&message).unwrap();
    assert_eq!(parsed["result"], "aborted");
}

#[tokio::test]
async fn invalid_running_counts_jobs_started_before_cutoff() {
    let store = JobStore::open_memory().await.unwrap();
    let queue = JobQueue::new(&config(5), EventChannel::new());
    let job = job_with(&store, "long", |ctx| async move {
        ctx.cancelled().await;
        Ok(JobOutput::Nothing)
    })
    .await;
    let before_start = now_millis();
    queue.add_job(Arc::clone(&job));
    queue.start();

    let q = Arc::clone(&queue);
    wait_until("job to become active", move || q.active_count() == 1).await;
    assert!(queue.invalid_running(now_millis() + 1, 1));
    assert!(!queue.invalid_running(now_millis() + 1, 2));
    assert!(!queue.invalid_running(before_start, 1));
    job.abort();
}

#[tokio::test]
async fn pause_twice_matches_pause_once() {
    let store = JobStore::open_memory().await.unwrap();
    let queue = JobQueue::new(&config(5), EventChannel::new());
    queue.start();
    queue.add_job(idle_job(&store, "held").await);
    assert!(queue.is_polling());

    queue.pause();
    queue.pause();
    assert!(!queue.is_started());
    assert!(!queue.is_polling());
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(queue.waiting_count(), 1);
    assert_eq!(queue.active_count(), 0);

    queue.start();
    let q = Arc::clone(&queue);
    wait_until("job to be admitted", move || q.waiting_count() == 0).await;
}

#[tokio::test]
async fn clear_empties_lists_and_stops_polling() {
    let store = JobStore::open_memory().await.unwrap();
    let queue = JobQueue::new(&config(5), EventChannel::new());
    for i in 0..3 {
        queue.add_job(idle_job(&store, &format!("clear-{}", i)).await);
    }
    queue.start();
    queue.clear();
    assert_eq!(queue.waiting_count(), 0);
    assert_eq!(queue.active_count(), 0);
    assert!(!queue.is_polling());
}

#[tokio::test]
async fn remove_job_by_identity() {
    let store = JobStore::open_memory().await.unwrap();
    let queue = JobQueue::new(&config(5), EventChannel::new());
    let keep = idle_job(&store, "keep").await;
    let dropped = idle_job(&store, "drop").await;
    queue.add_job(Arc::clone(&keep));
    queue.add_job(Arc::clone(&dropped));

    assert!(queue.remove_job(&dropped));
    assert!(!queue.remove_job(&dropped));
    let waiting = queue.waiting_jobs();
    assert_eq!(waiting.len(), 1);
    assert!(Arc::ptr_eq(&waiting[0].job, &keep));
    assert!(!waiting[0].active);
}

#[tokio::test]
async fn publishes_occupancy_on_tick() {
    let store = JobStore::open_memory().await.unwrap();
    let events = EventChannel::new();
    let mut rx = events.subscribe();
    let queue = JobQueue::new(&config(3), events);
    queue.add_job(idle_job(&store, "observed").await);
    queue.start();

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("tick within timeout")
        .unwrap();
    assert_eq!(event.max, 3);
    assert_eq!(event.active + event.queued, 1);
}

#[tokio::test]
async fn cadence_slows_when_capacity_is_used() {
    let store = JobStore::open_memory().await.unwrap();
    let queue = JobQueue::new(&config(1), EventChannel::new());
    for i in 0..2 {
        let job = job_with(&store, &format!("hold-{}", i), |ctx| async move {
            ctx.cancelled().await;
            Ok(JobOutput::Nothing)
        })
        .await;
        queue.add_job(job);
    }
    queue.start();
    assert_eq!(queue.poll_period(), Some(FAST_POLL));

    let q = Arc::clone(&queue);
    wait_until("first job admitted", move || q.active_count() == 1).await;
    assert_eq!(queue.poll_period(), Some(SLOW_POLL));
    assert_eq!(queue.waiting_count(), 1);

    for j in queue.running_jobs() {
        j.job.abort();
    }
    for j in queue.waiting_jobs() {
        j.job.abort();
    }
}

#[tokio::test]
async fn cadence_slows_once_running_jobs_match_spare_capacity() {
    let store = JobStore::open_memory().await.unwrap();
    let queue = JobQueue::new(&config(4), EventChannel::new());
    for i in 0..4 {
        let job = job_with(&store, &format!("hold-{}", i), |ctx| async move {
            ctx.cancelled().await;
            Ok(JobOutput::Nothing)
        })
        .await;
        queue.add_job(job);
    }
    queue.start();

    // One running, three more admissible: still fast.
    let q = Arc::clone(&queue);
    wait_until("first job admitted", move || q.active_count() >= 1).await;
    // Two running, two admissible: spare capacity no longer exceeds the running count.
    let q = Arc::clone(&queue);
    wait_until("second job admitted", move || q.active_count() >= 2).await;
    assert_eq!(queue.poll_period(), Some(SLOW_POLL));
    assert!(queue.schedulable_jobs() > 0);

    for j in queue.running_jobs().into_iter().chain(queue.waiting_jobs()) {
        j.job.abort();
    }
}
