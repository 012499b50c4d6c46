//! Single-host request queue with randomized spacing.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use rand::Rng;
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::diagnostics::{EventChannel, RequestQueueEvent};
use crate::error::ThrottleError;

/// Spacing used when no interval is configured.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_millis(1000);
/// Smallest accepted maximum interval.
pub const MIN_MAX_INTERVAL: Duration = Duration::from_millis(10);

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default)]
struct Pending {
    tasks: VecDeque<Task>,
    working: bool,
}

/// Serializes requests to one host.
///
/// At most one pushed callback runs at a time. After each callback (successful or not)
/// the worker sleeps a delay drawn uniformly from `[max_interval / 2, max_interval]`
/// before starting the next one.
pub struct RequestQueue {
    name: String,
    max_interval: Duration,
    interval_variation: Duration,
    pending: Mutex<Pending>,
    events: EventChannel<RequestQueueEvent>,
}

impl RequestQueue {
    /// Create a queue. `max_interval` defaults to 1s and is clamped to at least 10ms.
    pub fn new(
        name: impl Into<String>,
        max_interval: Option<Duration>,
        events: EventChannel<RequestQueueEvent>,
    ) -> Arc<Self> {
        let max_interval = max_interval
            .unwrap_or(DEFAULT_MAX_INTERVAL)
            .max(MIN_MAX_INTERVAL);
        Arc::new(Self {
            name: name.into(),
            max_interval,
            interval_variation: max_interval / 2,
            pending: Mutex::new(Pending::default()),
            events,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Number of callbacks waiting to be dispatched.
    pub fn queued(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_working(&self) -> bool {
        self.lock().working
    }

    /// Queue `f` and resolve with its output once it ran.
    ///
    /// The callback is enqueued immediately, even if the returned future is polled later.
    /// It runs inside a `request_queue` span so its log lines carry the queue name.
    pub fn push<F, Fut, T>(
        self: &Arc<Self>,
        f: F,
    ) -> impl Future<Output = Result<T, ThrottleError>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let span = tracing::debug_span!("request_queue", queue = %self.name);
        let task: Task = Box::pin(
            async move {
                let out = f().await;
                let _ = tx.send(out);
            }
            .instrument(span),
        );

        let start_worker = {
            let mut pending = self.lock();
            pending.tasks.push_back(task);
            !std::mem::replace(&mut pending.working, true)
        };
        if start_worker {
            tokio::spawn(Arc::clone(self).work());
        }

        let queue = self.name.clone();
        async move { rx.await.map_err(|_| ThrottleError::Dropped { queue }) }
    }

    async fn work(self: Arc<Self>) {
        loop {
            let (task, queued) = {
                let mut pending = self.lock();
                match pending.tasks.pop_front() {
                    Some(task) => (task, pending.tasks.len()),
                    None => {
                        pending.working = false;
                        return;
                    }
                }
            };

            self.events.publish_with(|| RequestQueueEvent {
                queue_name: self.name.clone(),
                max_interval_ms: self.max_interval.as_millis() as u64,
                queued,
                working: true,
            });

            if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                tracing::warn!(queue = %self.name, "queued request panicked");
            }

            tokio::time::sleep(self.next_delay()).await;
        }
    }

    /// Uniform delay in `[max_interval - max_interval / 2, max_interval]`.
    fn next_delay(&self) -> Duration {
        let max = self.max_interval.as_millis() as u64;
        let min = max - self.interval_variation.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn queue(max_ms: u64) -> Arc<RequestQueue> {
        RequestQueue::new(
            "example.com",
            Some(Duration::from_millis(max_ms)),
            EventChannel::new(),
        )
    }

    #[test]
    fn interval_is_clamped_and_defaulted() {
        let q = RequestQueue::new("a", Some(Duration::from_millis(1)), EventChannel::new());
        assert_eq!(q.max_interval(), MIN_MAX_INTERVAL);
        let q = RequestQueue::new("a", None, EventChannel::new());
        assert_eq!(q.max_interval(), DEFAULT_MAX_INTERVAL);
    }

    #[test]
    fn delay_stays_within_jitter_window() {
        let q = queue(1000);
        for _ in 0..500 {
            let d = q.next_delay();
            assert!(d >= Duration::from_millis(500), "{d:?}");
            assert!(d <= Duration::from_millis(1000), "{d:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn push_resolves_with_callback_outcome() {
        let q = queue(100);
        let ok = q.push(|| async { Ok::<_, String>(7) }).await.unwrap();
        assert_eq!(ok, Ok(7));
        let err = q
            .push(|| async { Err::<u32, _>("boom".to_string()) })
            .await
            .unwrap();
        assert_eq!(err, Err("boom".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn callbacks_never_overlap_and_respect_spacing() {
        let q = queue(200);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let windows = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            let windows = Arc::clone(&windows);
            handles.push(q.push(move || async move {
                let start = Instant::now();
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                windows.lock().unwrap().push((start, Instant::now()));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        let windows = windows.lock().unwrap();
        assert_eq!(windows.len(), 5);
        for pair in windows.windows(2) {
            let gap = pair[1].0 - pair[0].1;
            assert!(gap >= Duration::from_millis(100), "gap too short: {gap:?}");
            assert!(gap <= Duration::from_millis(201), "gap too long: {gap:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn worker_goes_idle_and_restarts() {
        let q = queue(50);
        q.push(|| async {}).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!q.is_working());
        assert_eq!(q.queued(), 0);
        assert_eq!(q.push(|| async { 1 }).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_callback_does_not_wedge_queue() {
        let q = queue(20);
        let failed = q.push(|| async { panic!("request exploded") }).await;
        assert!(matches!(failed, Err(ThrottleError::Dropped { .. })));
        assert_eq!(q.push(|| async { "next" }).await.unwrap(), "next");
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_publishes_state() {
        let events = EventChannel::new();
        let mut rx = events.subscribe();
        let q = RequestQueue::new("b.com", Some(Duration::from_millis(40)), events);
        let first = q.push(|| async {});
        let second = q.push(|| async {});
        first.await.unwrap();
        second.await.unwrap();

        let e1 = rx.recv().await.unwrap();
        assert_eq!(e1.queue_name, "b.com");
        assert_eq!(e1.max_interval_ms, 40);
        assert!(e1.working);
        assert_eq!(e1.queued, 1);
        let e2 = rx.recv().await.unwrap();
        assert_eq!(e2.queued, 0);
    }
}
