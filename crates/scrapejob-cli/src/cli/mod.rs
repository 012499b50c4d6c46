//! CLI for inspecting and maintaining the scrapejob store.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use scrapejob_core::config;
use scrapejob_core::store::{JobId, JobStore, JobType};

use commands::{
    run_add, run_notifications, run_recover, run_remove, run_set_enabled, run_status, AddArgs,
};

/// Top-level CLI for the scrapejob store.
#[derive(Debug, Parser)]
#[command(name = "scrapejob")]
#[command(about = "scrapejob: inspect and maintain scraper job records", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// List all job records.
    Status {
        /// Print records as JSON lines instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Persist a new job record.
    Add {
        /// Job type, e.g. `toc`, `feed`, `news`.
        #[arg(value_parser = parse_job_type)]
        job_type: JobType,
        /// Unique job name; embed the target URL to group it by host.
        name: String,
        /// Milliseconds between runs; 0 runs the job once.
        #[arg(long, default_value = "0", value_name = "MS")]
        interval: i64,
        /// Arguments passed to the job handler (JSON).
        #[arg(long, value_name = "JSON")]
        args: Option<String>,
        /// Make the job due right away instead of one interval from now.
        #[arg(long)]
        run_immediately: bool,
        /// Delete the record after its first completed run.
        #[arg(long)]
        delete_after_run: bool,
        /// Run only after the job with this id completes.
        #[arg(long, value_name = "ID")]
        run_after: Option<JobId>,
    },

    /// Remove a job record by ID. Jobs waiting on it are released.
    Remove {
        /// Job identifier.
        id: JobId,
    },

    /// Enable a job by ID.
    Enable {
        /// Job identifier.
        id: JobId,
    },

    /// Disable a job by ID; it stays stored but is never fetched.
    Disable {
        /// Job identifier.
        id: JobId,
    },

    /// Reset jobs left `running` by a crashed scheduler back to `waiting`.
    Recover,

    /// Show the most recent notifications.
    Notifications {
        /// Maximum number of notifications to show.
        #[arg(long, default_value = "20", value_name = "N")]
        limit: u32,
    },
}

fn parse_job_type(s: &str) -> Result<JobType, String> {
    JobType::parse(s).ok_or_else(|| {
        let known: Vec<&str> = JobType::ALL.iter().map(|t| t.as_str()).collect();
        format!("unknown job type `{}` (expected one of: {})", s, known.join(", "))
    })
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let store = JobStore::open_default().await?;

        match cli.command {
            CliCommand::Status { json } => run_status(&store, json).await?,
            CliCommand::Add {
                job_type,
                name,
                interval,
                args,
                run_immediately,
                delete_after_run,
                run_after,
            } => {
                run_add(
                    &store,
                    AddArgs {
                        job_type,
                        name,
                        interval,
                        args,
                        run_immediately,
                        delete_after_run,
                        run_after,
                    },
                )
                .await?
            }
            CliCommand::Remove { id } => run_remove(&store, id).await?,
            CliCommand::Enable { id } => run_set_enabled(&store, id, true).await?,
            CliCommand::Disable { id } => run_set_enabled(&store, id, false).await?,
            CliCommand::Recover => run_recover(&store).await?,
            CliCommand::Notifications { limit } => run_notifications(&store, limit).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
