//! Types used by the job store.

use serde::{Deserialize, Serialize};

/// Job identifier.
pub type JobId = i64;

/// Sentinel request-queue key for jobs whose name carries no URL.
pub const UNKNOWN_QUEUE_KEY: &str = "UNKNOWN";

/// Smallest interval a repeating job may run at.
pub const MIN_INTERVAL_MS: i64 = 60_000;

/// Persisted run state of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Running,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Running => "running",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "running" => JobState::Running,
            _ => JobState::Waiting,
        }
    }
}

/// The kinds of scrape work a job record can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Toc,
    OneTimeToc,
    Feed,
    News,
    Search,
    OneTimeUser,
    CheckTocs,
    QueueTocs,
    RemapMediaParts,
    QueueExternalUser,
    QueueExternalUserList,
    RemoveUsedMediaInWaits,
}

impl JobType {
    pub const ALL: [JobType; 12] = [
        JobType::Toc,
        JobType::OneTimeToc,
        JobType::Feed,
        JobType::News,
        JobType::Search,
        JobType::OneTimeUser,
        JobType::CheckTocs,
        JobType::QueueTocs,
        JobType::RemapMediaParts,
        JobType::QueueExternalUser,
        JobType::QueueExternalUserList,
        JobType::RemoveUsedMediaInWaits,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Toc => "toc",
            JobType::OneTimeToc => "one_time_toc",
            JobType::Feed => "feed",
            JobType::News => "news",
            JobType::Search => "search",
            JobType::OneTimeUser => "one_time_user",
            JobType::CheckTocs => "check_tocs",
            JobType::QueueTocs => "queue_tocs",
            JobType::RemapMediaParts => "remap_media_parts",
            JobType::QueueExternalUser => "queue_external_user",
            JobType::QueueExternalUserList => "queue_external_user_list",
            JobType::RemoveUsedMediaInWaits => "remove_used_media_in_waits",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full persisted job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub job_type: JobType,
    pub name: String,
    pub enabled: bool,
    pub state: JobState,
    /// Milliseconds between runs; `<= 0` means the job runs once.
    pub interval: i64,
    pub delete_after_run: bool,
    pub run_immediately: bool,
    pub last_run: Option<i64>,
    pub next_run: Option<i64>,
    pub previous_scheduled_at: Option<i64>,
    pub running_since: Option<i64>,
    /// Opaque string-serialized arguments for the job handler.
    pub arguments: Option<String>,
    /// Job this one waits for before it is dispatched.
    pub run_after: Option<JobId>,
}

impl JobRecord {
    /// Interval with the repeating-job floor applied; `None` for run-once jobs.
    pub fn effective_interval(&self) -> Option<i64> {
        (self.interval > 0).then(|| self.interval.max(MIN_INTERVAL_MS))
    }

    /// Request-queue key of the host embedded in the job name, or [`UNKNOWN_QUEUE_KEY`].
    pub fn queue_key(&self) -> String {
        self.name
            .find("http")
            .and_then(|start| {
                let tail = &self.name[start..];
                let end = tail.find(char::is_whitespace).unwrap_or(tail.len());
                crate::throttle::queue_key(&tail[..end])
            })
            .unwrap_or_else(|| UNKNOWN_QUEUE_KEY.to_string())
    }
}

/// Reference to the job a new job should run after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobRef {
    Id(JobId),
    /// Name of a job that may not be persisted yet (e.g. later in the same batch).
    Name(String),
}

/// A job to be persisted; produced by bootstrap, adapters or job results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_type: JobType,
    pub name: String,
    #[serde(default)]
    pub interval: i64,
    #[serde(default)]
    pub delete_after_run: bool,
    #[serde(default)]
    pub run_immediately: bool,
    #[serde(default)]
    pub arguments: Option<String>,
    #[serde(default)]
    pub run_after: Option<JobRef>,
}

impl JobRequest {
    pub fn new(job_type: JobType, name: impl Into<String>) -> Self {
        Self {
            job_type,
            name: name.into(),
            interval: 0,
            delete_after_run: false,
            run_immediately: false,
            arguments: None,
            run_after: None,
        }
    }

    pub fn interval(mut self, interval_ms: i64) -> Self {
        self.interval = interval_ms;
        self
    }

    pub fn arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }

    pub fn run_immediately(mut self) -> Self {
        self.run_immediately = true;
        self
    }

    pub fn delete_after_run(mut self) -> Self {
        self.delete_after_run = true;
        self
    }

    pub fn run_after(mut self, target: JobRef) -> Self {
        self.run_after = Some(target);
        self
    }
}

/// Notification record shown to operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub content: String,
    /// Stable key of the subject (hook, job type or job) for de-duplication by readers.
    pub key: String,
    /// Category, e.g. `scraper_hook_failing` or `job_recovered`.
    pub kind: String,
    pub date: i64,
}

/// A stored notification with its row id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNotification {
    pub id: i64,
    pub notification: Notification,
    pub read: bool,
}
