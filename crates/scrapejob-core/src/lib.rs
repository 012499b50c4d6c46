pub mod config;
pub mod logging;

pub mod diagnostics;
pub mod error;
pub mod job;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod strategy;
pub mod throttle;

/// Current wall-clock time as Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
