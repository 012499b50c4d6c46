use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Unit in which `memory_limit` is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryUnit {
    Bytes,
    Kb,
    #[default]
    Mb,
    Gb,
}

impl MemoryUnit {
    /// Number of bytes in one unit.
    pub fn bytes(self) -> u64 {
        match self {
            MemoryUnit::Bytes => 1,
            MemoryUnit::Kb => 1024,
            MemoryUnit::Mb => 1024 * 1024,
            MemoryUnit::Gb => 1024 * 1024 * 1024,
        }
    }
}

/// Job queue admission limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of concurrently active jobs (at least 1).
    pub max_active: usize,
    /// Resident memory ceiling for admitting new jobs, in `memory_unit`. 0 disables the check.
    #[serde(default)]
    pub memory_limit: u64,
    #[serde(default)]
    pub memory_unit: MemoryUnit,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_active: 50,
            memory_limit: 0,
            memory_unit: MemoryUnit::Mb,
        }
    }
}

/// Per-host request throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Maximum spacing between two requests to a normal host.
    pub default_interval_ms: u64,
    /// Maximum spacing between two requests to a host registered as fast.
    pub fast_interval_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: 1000,
            fast_interval_ms: 50,
        }
    }
}

/// Which scheduling strategy pulls persisted jobs into the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Fcfs,
    RequestQueueBalanced,
    #[default]
    JobsQueueForcedBalanced,
}

/// Scheduler maintenance loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between fetch/health-check cycles.
    pub tick_secs: u64,
    #[serde(default)]
    pub strategy: StrategyKind,
    /// `host:port` resolved as a network liveness probe.
    pub probe_host: String,
    /// News adapter hooks that get a periodic job seeded on setup.
    #[serde(default)]
    pub news_adapters: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            strategy: StrategyKind::default(),
            probe_host: "google.com:443".to_string(),
            news_adapters: Vec::new(),
        }
    }
}

/// Thresholds and toggles for failure notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Consecutive failures after which a job counts as failing.
    pub job_failed: u32,
    /// Failing jobs after which a job type counts as failing.
    pub job_type_failed_absolute: usize,
    /// Fraction of tracked jobs failing after which a job type counts as failing.
    pub job_type_failed_perc: f64,
    /// Failing job types after which a hook counts as failing.
    pub hook_job_type_failed: usize,
    /// Consecutive failures after which a single job gets its own notification.
    pub job_notify_failure: u32,
    #[serde(default)]
    pub notify_recovery: bool,
    #[serde(default)]
    pub notify_recovery_hook: bool,
    #[serde(default)]
    pub notify_recovery_job_type: bool,
    #[serde(default)]
    pub notify_recovery_job: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            job_failed: 2,
            job_type_failed_absolute: 10,
            job_type_failed_perc: 0.5,
            hook_job_type_failed: 2,
            job_notify_failure: 5,
            notify_recovery: false,
            notify_recovery_hook: false,
            notify_recovery_job_type: false,
            notify_recovery_job: false,
        }
    }
}

impl NotifyConfig {
    /// Apply `SCRAPEJOB_NOTIFY_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Missing or unparseable values keep the current one.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(raw: Option<String>, current: T) -> T {
            raw.and_then(|v| v.trim().parse().ok()).unwrap_or(current)
        }

        self.job_failed = parsed(lookup("SCRAPEJOB_NOTIFY_JOB_FAILED"), self.job_failed);
        self.job_type_failed_absolute = parsed(
            lookup("SCRAPEJOB_NOTIFY_JOB_TYPE_FAILED_ABSOLUTE"),
            self.job_type_failed_absolute,
        );
        self.job_type_failed_perc = parsed(
            lookup("SCRAPEJOB_NOTIFY_JOB_TYPE_FAILED_PERC"),
            self.job_type_failed_perc,
        );
        self.hook_job_type_failed = parsed(
            lookup("SCRAPEJOB_NOTIFY_HOOK_JOB_TYPE_FAILED"),
            self.hook_job_type_failed,
        );
        self.job_notify_failure = parsed(
            lookup("SCRAPEJOB_NOTIFY_JOB_FAILURE"),
            self.job_notify_failure,
        );
        self.notify_recovery = parsed(lookup("SCRAPEJOB_NOTIFY_RECOVERY"), self.notify_recovery);
        self.notify_recovery_hook = parsed(
            lookup("SCRAPEJOB_NOTIFY_RECOVERY_HOOK"),
            self.notify_recovery_hook,
        );
        self.notify_recovery_job_type = parsed(
            lookup("SCRAPEJOB_NOTIFY_RECOVERY_JOB_TYPE"),
            self.notify_recovery_job_type,
        );
        self.notify_recovery_job = parsed(
            lookup("SCRAPEJOB_NOTIFY_RECOVERY_JOB"),
            self.notify_recovery_job,
        );
        self
    }
}

/// Global configuration loaded from `~/.config/scrapejob/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("scrapejob")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
/// Notification thresholds are then overridden from the environment.
pub fn load_or_init() -> Result<ScraperConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ScraperConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        let mut cfg = default_cfg;
        cfg.notify = cfg.notify.with_env_overrides();
        return Ok(cfg);
    }

    let data = fs::read_to_string(&path)?;
    let mut cfg: ScraperConfig = toml::from_str(&data)?;
    cfg.notify = cfg.notify.with_env_overrides();
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ScraperConfig::default();
        assert_eq!(cfg.queue.max_active, 50);
        assert_eq!(cfg.queue.memory_limit, 0);
        assert_eq!(cfg.throttle.default_interval_ms, 1000);
        assert_eq!(cfg.throttle.fast_interval_ms, 50);
        assert_eq!(cfg.scheduler.tick_secs, 60);
        assert_eq!(cfg.scheduler.strategy, StrategyKind::JobsQueueForcedBalanced);
        assert_eq!(cfg.notify.job_failed, 2);
        assert_eq!(cfg.notify.job_type_failed_absolute, 10);
        assert!((cfg.notify.job_type_failed_perc - 0.5).abs() < 1e-9);
        assert_eq!(cfg.notify.hook_job_type_failed, 2);
        assert_eq!(cfg.notify.job_notify_failure, 5);
        assert!(!cfg.notify.notify_recovery);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = ScraperConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ScraperConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.queue.max_active, cfg.queue.max_active);
        assert_eq!(parsed.scheduler.probe_host, cfg.scheduler.probe_host);
        assert_eq!(parsed.notify, cfg.notify);
    }

    #[test]
    fn config_toml_partial_sections() {
        let toml = r#"
            [queue]
            max_active = 8
            memory_limit = 512
            memory_unit = "mb"

            [scheduler]
            tick_secs = 30
            strategy = "fcfs"
            probe_host = "example.com:53"
            news_adapters = ["novelupdates", "wuxiaworld"]
        "#;
        let cfg: ScraperConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.queue.max_active, 8);
        assert_eq!(cfg.queue.memory_limit, 512);
        assert_eq!(cfg.queue.memory_unit, MemoryUnit::Mb);
        assert_eq!(cfg.scheduler.strategy, StrategyKind::Fcfs);
        assert_eq!(cfg.scheduler.news_adapters.len(), 2);
        assert_eq!(cfg.throttle.default_interval_ms, 1000);
        assert_eq!(cfg.notify.job_notify_failure, 5);
    }

    #[test]
    fn notify_overrides_apply_and_ignore_garbage() {
        let cfg = NotifyConfig::default().with_overrides(|key| match key {
            "SCRAPEJOB_NOTIFY_JOB_FAILED" => Some("4".to_string()),
            "SCRAPEJOB_NOTIFY_JOB_TYPE_FAILED_PERC" => Some("0.25".to_string()),
            "SCRAPEJOB_NOTIFY_JOB_FAILURE" => Some("not-a-number".to_string()),
            "SCRAPEJOB_NOTIFY_RECOVERY_JOB" => Some("true".to_string()),
            _ => None,
        });
        assert_eq!(cfg.job_failed, 4);
        assert!((cfg.job_type_failed_perc - 0.25).abs() < 1e-9);
        assert_eq!(cfg.job_notify_failure, 5);
        assert!(cfg.notify_recovery_job);
        assert!(!cfg.notify_recovery_hook);
    }

    #[test]
    fn memory_unit_sizes() {
        assert_eq!(MemoryUnit::Bytes.bytes(), 1);
        assert_eq!(MemoryUnit::Kb.bytes(), 1024);
        assert_eq!(MemoryUnit::Gb.bytes(), 1 << 30);
    }
}
