//! Persistent job store (SQLite via sqlx).
//!
//! Stores scrape job records with their schedule and run state, plus the
//! notification records emitted by failure accounting.

mod db;
mod jobs;
mod notifications;
mod types;

pub use db::*;
pub use types::*;

#[cfg(test)]
mod tests;
