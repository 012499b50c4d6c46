//! Record bookkeeping applied when a run completes or is found interrupted.

use crate::store::{JobRecord, JobState, MIN_INTERVAL_MS};

/// Apply a completed run at `now`: shift the schedule and reset the record to waiting.
///
/// `previous_scheduled_at` takes the old `next_run`; repeating jobs are next due one
/// (floored) interval after `now`, run-once jobs are not scheduled again.
pub fn complete_run(record: &mut JobRecord, now: i64) {
    if record.interval > 0 {
        record.interval = record.interval.max(MIN_INTERVAL_MS);
    }
    record.last_run = Some(now);
    record.previous_scheduled_at = record.next_run;
    record.next_run = record.effective_interval().map(|interval| now + interval);
    record.state = JobState::Waiting;
    record.running_since = None;
}

/// Reset a record left in `running` without a live job behind it.
pub fn reset_interrupted(record: &mut JobRecord, now: i64) {
    if record.interval > 0 {
        record.interval = record.interval.max(MIN_INTERVAL_MS);
    }
    record.next_run = Some(match record.effective_interval() {
        Some(interval) => record.last_run.unwrap_or(now) + interval,
        None => now,
    });
    record.state = JobState::Waiting;
    record.running_since = None;
}
