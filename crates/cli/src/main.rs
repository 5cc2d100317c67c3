//! heraldctl - operator CLI for the Herald job store
//! Talks to the SQLite database directly; the daemon picks changes up on its next poll.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use herald_core::application::constants::{DEFAULT_CLAIM_TIMEOUT, DEFAULT_MAX_TOTAL_ATTEMPTS};
use herald_core::application::{AdminService, NewContent};
use herald_core::domain::{Job, JobKind, JobStatus};
use herald_core::port::id_provider::UuidProvider;
use herald_core::port::time_provider::SystemTimeProvider;
use herald_infra_sqlite::{
    create_pool_with, run_migrations, SqliteJobRepository, SqlitePayloadStore,
};
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_DB_PATH: &str = "~/.herald/herald.db";

/// Default lease age for `reap`, the daemon's claim timeout
const DEFAULT_REAP_AGE_SECS: u64 = DEFAULT_CLAIM_TIMEOUT.as_secs();

#[derive(Parser)]
#[command(name = "heraldctl")]
#[command(about = "Herald job pipeline control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database path or URL
    #[arg(long, env = "HERALD_DATABASE_URL", default_value = DEFAULT_DB_PATH)]
    database_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the pipeline flag and job counts
    Status,

    /// Allow the daemon to claim and process jobs
    Enable,

    /// Stop the daemon from starting new work
    Disable,

    /// List failed jobs
    Failed {
        /// Maximum number of rows
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Return failed jobs to pending
    Resume {
        /// Leave jobs at or above this attempt count failed
        #[arg(long, default_value_t = DEFAULT_MAX_TOTAL_ATTEMPTS)]
        max_total_attempts: i32,
    },

    /// Requeue in-progress jobs whose claim is older than the given age
    Reap {
        /// Claim age in seconds
        #[arg(long, default_value_t = DEFAULT_REAP_AGE_SECS)]
        older_than_secs: u64,

        /// Fail stale jobs at or above this attempt count instead of requeueing
        #[arg(long, default_value_t = DEFAULT_MAX_TOTAL_ATTEMPTS)]
        max_total_attempts: i32,
    },

    /// Enqueue a job for an existing payload
    Enqueue {
        /// Job family
        #[arg(short, long, value_enum)]
        kind: KindArg,

        /// Content record or scan target id
        #[arg(short, long)]
        payload_ref: String,
    },

    /// Store a content record and enqueue its publish job
    AddContent {
        #[arg(long)]
        title: String,

        /// URL handle on the content host
        #[arg(long)]
        handle: String,

        #[arg(long)]
        body: String,

        /// Extra metadata as a JSON string
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Store a scan target and enqueue its scan job
    AddTarget {
        #[arg(long)]
        url: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Publish,
    Scan,
}

impl From<KindArg> for JobKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Publish => JobKind::Publish,
            KindArg::Scan => JobKind::Scan,
        }
    }
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Jobs")]
    count: i64,
}

#[derive(Tabled)]
struct FailedRow {
    #[tabled(rename = "Job ID")]
    id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Payload")]
    payload_ref: String,
    #[tabled(rename = "Attempts")]
    attempts: i32,
    #[tabled(rename = "Updated")]
    updated: String,
    #[tabled(rename = "Last Error")]
    last_error: String,
}

impl From<Job> for FailedRow {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            kind: job.kind.to_string(),
            payload_ref: job.payload_ref,
            attempts: job.attempt_count,
            updated: format_millis(job.updated_at),
            last_error: job.last_error.unwrap_or_default(),
        }
    }
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

async fn connect(database_url: &str) -> Result<AdminService> {
    let database_url = shellexpand::tilde(database_url).into_owned();
    // One-shot commands run sequentially
    let pool = create_pool_with(&database_url, 1)
        .await
        .map_err(|e| anyhow!("Failed to open {}: {}", database_url, e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow!("Migration failed: {}", e))?;

    let time_provider = Arc::new(SystemTimeProvider);
    Ok(AdminService::new(
        Arc::new(SqliteJobRepository::new(pool.clone(), time_provider.clone())),
        Arc::new(SqlitePayloadStore::new(pool)),
        Arc::new(UuidProvider),
        time_provider,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let admin = connect(&cli.database_url).await?;

    match cli.command {
        Commands::Status => {
            let report = admin.status().await?;
            println!("{}", "Herald Status".cyan().bold());
            println!();
            let flag = if report.enabled {
                "ENABLED".green()
            } else {
                "DISABLED".red()
            };
            println!("  {} {}", "Pipeline:".bold(), flag);
            if let Some(updated_at) = report.flag_updated_at {
                println!("  {} {}", "Toggled:".bold(), format_millis(updated_at));
            }
            println!();

            let rows: Vec<CountRow> = JobStatus::ALL
                .iter()
                .map(|status| CountRow {
                    status: status.to_string(),
                    count: report.counts.get(*status),
                })
                .collect();
            println!("{}", Table::new(rows));
        }

        Commands::Enable => {
            admin.set_enabled(true).await?;
            println!("{}", "✓ Pipeline enabled".green().bold());
        }

        Commands::Disable => {
            admin.set_enabled(false).await?;
            println!("{}", "✓ Pipeline disabled".yellow().bold());
            println!("  In-flight batches finish; no new work starts");
        }

        Commands::Failed { limit } => {
            let jobs = admin.failed_jobs(limit).await?;
            if jobs.is_empty() {
                println!("{}", "No failed jobs".green());
            } else {
                println!("{} {}", "Failed jobs:".red().bold(), jobs.len());
                let rows: Vec<FailedRow> = jobs.into_iter().map(FailedRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Resume { max_total_attempts } => {
            let resumed = admin.resume_failed(max_total_attempts).await?;
            println!(
                "{} {} failed jobs returned to pending",
                "✓".green().bold(),
                resumed
            );
        }

        Commands::Reap {
            older_than_secs,
            max_total_attempts,
        } => {
            let sweep = admin
                .reap(Duration::from_secs(older_than_secs), max_total_attempts)
                .await?;
            println!("{}", "✓ Stale claim sweep completed".green().bold());
            println!("  {} {}", "Requeued:".bold(), sweep.requeued);
            println!("  {} {}", "Abandoned:".bold(), sweep.abandoned);
        }

        Commands::Enqueue { kind, payload_ref } => {
            let job_id = admin.enqueue(kind.into(), &payload_ref).await?;
            println!("{}", "✓ Job enqueued successfully".green().bold());
            println!("  {} {}", "Job ID:".bold(), job_id);
        }

        Commands::AddContent {
            title,
            handle,
            body,
            metadata,
        } => {
            let metadata = match metadata {
                Some(raw) => serde_json::from_str(&raw).context("Invalid --metadata JSON")?,
                None => serde_json::Value::Null,
            };
            let (content_id, job_id) = admin
                .add_content(NewContent {
                    title,
                    handle,
                    body,
                    metadata,
                })
                .await?;
            println!("{}", "✓ Content stored and publish job enqueued".green().bold());
            println!("  {} {}", "Content ID:".bold(), content_id);
            println!("  {} {}", "Job ID:".bold(), job_id);
        }

        Commands::AddTarget { url } => {
            let (target_id, job_id) = admin.add_scan_target(&url).await?;
            println!("{}", "✓ Scan target stored and scan job enqueued".green().bold());
            println!("  {} {}", "Target ID:".bold(), target_id);
            println!("  {} {}", "Job ID:".bold(), job_id);
        }
    }

    Ok(())
}
