//! Consecutive-failure accounting per hook, job type and job, and the notifications it
//! decides to emit. Kept in memory only; it starts from zero on every process start.

use std::collections::HashMap;

use crate::config::NotifyConfig;
use crate::store::{JobId, JobType, Notification};

#[derive(Debug, Default)]
struct TypeState {
    failing: bool,
    jobs: HashMap<JobId, u32>,
}

#[derive(Debug, Default)]
struct HookState {
    failing: bool,
    types: HashMap<JobType, TypeState>,
}

/// One finished job, as seen by the failure accounting.
#[derive(Debug, Clone)]
pub struct JobCompletion<'a> {
    pub job_id: JobId,
    pub job_name: &'a str,
    pub job_type: JobType,
    pub success: bool,
    pub date: i64,
}

#[derive(Debug)]
pub struct FailureTracker {
    cfg: NotifyConfig,
    hooks: HashMap<String, HookState>,
}

impl FailureTracker {
    pub fn new(cfg: NotifyConfig) -> Self {
        Self {
            cfg,
            hooks: HashMap::new(),
        }
    }

    /// Consecutive failures recorded for a job under `hook`.
    pub fn failure_count(&self, hook: &str, job_type: JobType, job_id: JobId) -> u32 {
        self.hooks
            .get(hook)
            .and_then(|h| h.types.get(&job_type))
            .and_then(|t| t.jobs.get(&job_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_hook_failing(&self, hook: &str) -> bool {
        self.hooks.get(hook).is_some_and(|h| h.failing)
    }

    pub fn is_job_type_failing(&self, hook: &str, job_type: JobType) -> bool {
        self.hooks
            .get(hook)
            .and_then(|h| h.types.get(&job_type))
            .is_some_and(|t| t.failing)
    }

    /// Account one completion under `hook` and return the notifications it triggers.
    pub fn record(&mut self, hook: &str, done: &JobCompletion<'_>) -> Vec<Notification> {
        let cfg = &self.cfg;
        let mut out = Vec::new();
        let hook_state = self.hooks.entry(hook.to_string()).or_default();
        let type_state = hook_state.types.entry(done.job_type).or_default();
        let type_was_failing = type_state.failing;

        let count = type_state.jobs.entry(done.job_id).or_insert(0);
        let previous = *count;
        if done.success {
            *count = 0;
            if previous >= cfg.job_notify_failure
                && (cfg.notify_recovery || cfg.notify_recovery_job)
            {
                out.push(notification(
                    "job_recovered",
                    format!("Job {} recovered", done.job_name),
                    format!(
                        "Job {} ({}) of hook {} succeeded after {} consecutive failures",
                        done.job_name, done.job_type, hook, previous
                    ),
                    format!("{}:{}:{}", hook, done.job_type, done.job_id),
                    done.date,
                ));
            }
        } else {
            *count += 1;
            if *count == cfg.job_notify_failure && !type_was_failing {
                out.push(notification(
                    "job_failing",
                    format!("Job {} is failing", done.job_name),
                    format!(
                        "Job {} ({}) of hook {} failed {} times in a row",
                        done.job_name, done.job_type, hook, count
                    ),
                    format!("{}:{}:{}", hook, done.job_type, done.job_id),
                    done.date,
                ));
            }
        }

        let tracked = type_state.jobs.len();
        let failing_jobs = type_state
            .jobs
            .values()
            .filter(|&&c| c >= cfg.job_failed)
            .count();
        let type_failing = failing_jobs > 0
            && (failing_jobs >= cfg.job_type_failed_absolute
                || failing_jobs as f64 / tracked as f64 >= cfg.job_type_failed_perc);
        if type_failing != type_state.failing {
            type_state.failing = type_failing;
            if type_failing {
                out.push(notification(
                    "job_type_failing",
                    format!("Job type {} of hook {} is failing", done.job_type, hook),
                    format!("{} of {} tracked jobs are failing", failing_jobs, tracked),
                    format!("{}:{}", hook, done.job_type),
                    done.date,
                ));
            } else if cfg.notify_recovery || cfg.notify_recovery_job_type {
                out.push(notification(
                    "job_type_recovered",
                    format!("Job type {} of hook {} recovered", done.job_type, hook),
                    format!("{} of {} tracked jobs are failing", failing_jobs, tracked),
                    format!("{}:{}", hook, done.job_type),
                    done.date,
                ));
            }
        }

        let failing_types = hook_state.types.values().filter(|t| t.failing).count();
        let hook_failing = failing_types > 0 && failing_types >= cfg.hook_job_type_failed;
        if hook_failing != hook_state.failing {
            hook_state.failing = hook_failing;
            if hook_failing {
                out.push(notification(
                    "scraper_hook_failing",
                    format!("Hook {} is failing", hook),
                    format!("{} job types of hook {} are failing", failing_types, hook),
                    hook.to_string(),
                    done.date,
                ));
            } else if cfg.notify_recovery || cfg.notify_recovery_hook {
                out.push(notification(
                    "scraper_hook_recovered",
                    format!("Hook {} recovered", hook),
                    format!("{} job types of hook {} are failing", failing_types, hook),
                    hook.to_string(),
                    done.date,
                ));
            }
        }

        out
    }
}

fn notification(kind: &str, title: String, content: String, key: String, date: i64) -> Notification {
    Notification {
        title,
        content,
        key,
        kind: kind.to_string(),
        date,
    }
}
