//! Lazily populated registries of per-host request queues.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::ThrottleConfig;
use crate::diagnostics::{EventChannel, RequestQueueEvent};
use crate::error::ThrottleError;

use super::key::queue_key;
use super::queue::RequestQueue;

/// Two host-keyed registries: normal hosts and hosts allowed a faster request rate.
pub struct RequestQueues {
    normal: Mutex<HashMap<String, Arc<RequestQueue>>>,
    fast: Mutex<HashMap<String, Arc<RequestQueue>>>,
    normal_interval: Duration,
    fast_interval: Duration,
    events: EventChannel<RequestQueueEvent>,
}

impl RequestQueues {
    pub fn new(cfg: &ThrottleConfig, events: EventChannel<RequestQueueEvent>) -> Self {
        Self {
            normal: Mutex::new(HashMap::new()),
            fast: Mutex::new(HashMap::new()),
            normal_interval: Duration::from_millis(cfg.default_interval_ms),
            fast_interval: Duration::from_millis(cfg.fast_interval_ms),
            events,
        }
    }

    /// The queue responsible for `url`'s host, created on first use.
    /// Returns `None` for URLs without an http(s) host.
    pub fn queue_for(&self, url: &str, fast: bool) -> Option<Arc<RequestQueue>> {
        let key = queue_key(url)?;
        let (map, interval) = if fast {
            (&self.fast, self.fast_interval)
        } else {
            (&self.normal, self.normal_interval)
        };
        let mut map = map.lock().unwrap_or_else(|e| e.into_inner());
        let queue = map.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(queue = %key, fast, "creating request queue");
            RequestQueue::new(key, Some(interval), self.events.clone())
        });
        Some(Arc::clone(queue))
    }

    /// Run `f` through the queue for `url`'s host, or directly if the URL has no host key.
    pub async fn throttle<F, Fut, T>(&self, url: &str, fast: bool, f: F) -> Result<T, ThrottleError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        match self.queue_for(url, fast) {
            Some(queue) => queue.push(f).await,
            None => Ok(f().await),
        }
    }

    /// Number of known hosts in the normal and fast registries.
    pub fn host_count(&self) -> (usize, usize) {
        let normal = self.normal.lock().unwrap_or_else(|e| e.into_inner()).len();
        let fast = self.fast.lock().unwrap_or_else(|e| e.into_inner()).len();
        (normal, fast)
    }
}
