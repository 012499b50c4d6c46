//! Connection setup and schema for the job store.
//!
//! Job queries live in `jobs`, notification queries in `notifications`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

/// Persistent store for job records and notifications. Clones share one pool.
///
/// By default the database lives at `$XDG_STATE_HOME/scrapejob/jobs.db`.
#[derive(Clone)]
pub struct JobStore {
    pub(crate) pool: Pool<Sqlite>,
}

impl JobStore {
    pub async fn open_default() -> Result<Self> {
        let dirs = xdg::BaseDirectories::with_prefix("scrapejob")?;
        Self::open_at(dirs.get_state_home().join("jobs.db")).await
    }

    /// Open the database file at `path`, creating it and its parent directory if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create state dir {}", dir.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .with_context(|| format!("open job store {}", path.display()))?;
        let store = JobStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open a private in-memory database (single connection so every query sees the same data).
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = JobStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        // Timestamps are Unix epoch milliseconds.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                name TEXT NOT NULL UNIQUE,
                enabled INTEGER NOT NULL DEFAULT 1,
                state TEXT NOT NULL,
                interval INTEGER NOT NULL DEFAULT 0,
                delete_after_run INTEGER NOT NULL DEFAULT 0,
                run_immediately INTEGER NOT NULL DEFAULT 0,
                last_run INTEGER,
                next_run INTEGER,
                previous_scheduled_at INTEGER,
                running_since INTEGER,
                arguments TEXT,
                run_after INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Fetch filters on state/next_run; dependents are looked up by run_after.
        sqlx::query("CREATE INDEX IF NOT EXISTS jobs_due ON jobs (state, next_run)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS jobs_run_after ON jobs (run_after)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                key TEXT NOT NULL,
                type TEXT NOT NULL,
                date INTEGER NOT NULL,
                read INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
