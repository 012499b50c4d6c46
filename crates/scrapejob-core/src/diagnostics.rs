//! Publish/subscribe channels for queue occupancy, job lifecycle and request-queue state.
//!
//! Every channel is optional to listen on. Publishing with no subscriber is a no-op and
//! never builds the payload.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::job::JobStatistics;
use crate::store::JobId;

const CHANNEL_CAPACITY: usize = 256;

/// A broadcast topic whose publication is free when nobody listens.
#[derive(Debug)]
pub struct EventChannel<T> {
    tx: broadcast::Sender<T>,
}

impl<T> Clone for EventChannel<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> EventChannel<T> {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn has_subscribers(&self) -> bool {
        self.tx.receiver_count() > 0
    }

    /// Build and send the payload only if at least one subscriber is attached.
    pub fn publish_with<F>(&self, build: F)
    where
        F: FnOnce() -> T,
    {
        if !self.has_subscribers() {
            return;
        }
        // A receiver may drop between the check and the send; that is fine.
        let _ = self.tx.send(build());
    }
}

/// Job queue occupancy after a poll tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEvent {
    pub active: usize,
    pub queued: usize,
    pub max: usize,
}

/// Job lifecycle events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Started {
        job_id: JobId,
        job_name: String,
        job_type: String,
        timestamp: i64,
    },
    Finished {
        job_id: JobId,
        job_name: String,
        job_type: String,
        timestamp: i64,
        result: String,
        reason: Option<String>,
        statistics: JobStatistics,
    },
}

/// Per-host request queue state, published before each dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestQueueEvent {
    pub queue_name: String,
    pub max_interval_ms: u64,
    pub queued: usize,
    pub working: bool,
}

/// Business event emitted for job types that declare an event name.
#[derive(Debug, Clone, Serialize)]
pub struct JobResultEvent {
    /// Event name; failures are published as `<event>:error`.
    pub event: String,
    pub job_id: JobId,
    pub payload: serde_json::Value,
}

/// The diagnostics topics handed to the queue, jobs and throttles.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub queue: EventChannel<QueueEvent>,
    pub jobs: EventChannel<JobEvent>,
    pub requests: EventChannel<RequestQueueEvent>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_never_builds_payload() {
        let channel: EventChannel<QueueEvent> = EventChannel::new();
        let mut built = false;
        channel.publish_with(|| {
            built = true;
            QueueEvent {
                active: 0,
                queued: 0,
                max: 1,
            }
        });
        assert!(!built);
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let channel: EventChannel<QueueEvent> = EventChannel::new();
        let mut rx = channel.subscribe();
        channel.publish_with(|| QueueEvent {
            active: 1,
            queued: 2,
            max: 5,
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            QueueEvent {
                active: 1,
                queued: 2,
                max: 5
            }
        );
    }
}
