//! Shared setup for scheduler integration tests.

use std::time::Duration;

use scrapejob_core::config::{ScraperConfig, StrategyKind};

pub fn config() -> ScraperConfig {
    let mut cfg = ScraperConfig::default();
    cfg.scheduler.strategy = StrategyKind::Fcfs;
    cfg.scheduler.probe_host = "localhost:80".to_string();
    cfg.queue.max_active = 4;
    cfg
}

/// Poll `cond` every 20ms for up to 20s.
pub async fn wait_for<F, Fut>(what: &str, cond: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    while !cond().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
