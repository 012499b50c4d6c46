//! Jobs-per-minute baseline and the forced-balance filter built on it.

use crate::store::JobRecord;

const MINUTE_MS: f64 = 60_000.0;

/// Expected jobs per minute over all persisted jobs, clamped to
/// `[10% of max_active, max_active]` and rounded.
///
/// Run-once jobs (no positive interval) each contribute `1 / total`.
pub fn compute_baseline(all: &[JobRecord], max_active: usize) -> usize {
    let total = all.len();
    let per_minute: f64 = all
        .iter()
        .map(|job| {
            if job.interval > 0 {
                MINUTE_MS / job.interval as f64
            } else {
                1.0 / total as f64
            }
        })
        .sum();
    let max = max_active as f64;
    per_minute.clamp(max * 0.1, max).round() as usize
}

/// Keep candidates within the baseline rate, plus any that are well overdue.
///
/// The candidate at position `i` passes if `i + 1 + running <= baseline` or it has no
/// interval. Otherwise it passes only if its `next_run` lies more than 10% of its interval
/// in the past.
pub fn forced_balance_filter(
    candidates: Vec<JobRecord>,
    baseline: usize,
    running: usize,
    now: i64,
) -> Vec<JobRecord> {
    let before = candidates.len();
    let kept: Vec<JobRecord> = candidates
        .into_iter()
        .enumerate()
        .filter(|(i, job)| {
            if i + 1 + running <= baseline || job.interval <= 0 {
                return true;
            }
            let grace = job.interval as f64 * 0.1;
            job.next_run
                .is_some_and(|next_run| (now - next_run) as f64 > grace)
        })
        .map(|(_, job)| job)
        .collect();
    if kept.len() < before {
        tracing::debug!(
            baseline,
            running,
            held_back = before - kept.len(),
            "holding back jobs above baseline"
        );
    }
    kept
}
