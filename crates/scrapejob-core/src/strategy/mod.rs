//! Admission strategies: which persisted jobs to pull into the queue next.

mod balance;
mod baseline;

use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;

use crate::config::StrategyKind;
use crate::now_millis;
use crate::queue::JobQueue;
use crate::store::{JobRecord, JobStore};

pub use balance::balance_by_queue_key;
pub use baseline::{compute_baseline, forced_balance_filter};

const BASELINE_TTL: Duration = Duration::from_secs(60 * 60);

struct CachedBaseline {
    value: usize,
    computed_at: Instant,
}

/// A scheduling strategy plus the state it keeps between fetches.
pub struct Strategy {
    kind: StrategyKind,
    baseline: Mutex<Option<CachedBaseline>>,
}

impl Strategy {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            baseline: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    /// Ordered records to enqueue next, given the records already in flight.
    pub async fn select(
        &self,
        store: &JobStore,
        queue: &JobQueue,
        current: &[JobRecord],
    ) -> Result<Vec<JobRecord>> {
        let now = now_millis();
        match self.kind {
            StrategyKind::Fcfs => store.queryable_jobs(now).await,
            StrategyKind::RequestQueueBalanced => {
                self.request_queue_balanced(store, queue, current, now).await
            }
            StrategyKind::JobsQueueForcedBalanced => {
                let baseline = self.baseline(store, queue.max_active()).await?;
                let candidates = self
                    .request_queue_balanced(store, queue, current, now)
                    .await?;
                Ok(forced_balance_filter(
                    candidates,
                    baseline,
                    queue.active_count(),
                    now,
                ))
            }
        }
    }

    async fn request_queue_balanced(
        &self,
        store: &JobStore,
        queue: &JobQueue,
        current: &[JobRecord],
        now: i64,
    ) -> Result<Vec<JobRecord>> {
        let available = store.queryable_jobs(now).await?;
        let queued = queue.active_count() + queue.waiting_count();
        let slots = queue.max_active().saturating_sub(queued);
        Ok(balance_by_queue_key(current, available, slots))
    }

    /// Baseline jobs-per-minute, recomputed at most once per hour.
    async fn baseline(&self, store: &JobStore, max_active: usize) -> Result<usize> {
        {
            let cached = self.baseline.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(c) = cached.as_ref() {
                if c.computed_at.elapsed() < BASELINE_TTL {
                    return Ok(c.value);
                }
            }
        }
        let all = store.list_jobs().await?;
        let value = compute_baseline(&all, max_active);
        tracing::info!(baseline = value, jobs = all.len(), "recomputed job baseline");
        *self.baseline.lock().unwrap_or_else(|e| e.into_inner()) = Some(CachedBaseline {
            value,
            computed_at: Instant::now(),
        });
        Ok(value)
    }
}
