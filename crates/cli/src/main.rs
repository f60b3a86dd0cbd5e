use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use chrono::{DateTime, Utc};

use xqueue_client::{GraderClient, HttpGraderClient, LmsClient};
use xqueue_core::config::{Config, RawConfig};
use xqueue_store::{SubmissionStore, UserStore};
use xqueue_store_postgres::PostgresSubmissionStore;
use xqueue_worker::maintenance::{
    count_queued_submissions, delete_old_submissions, push_orphaned_submissions, requeue_pulled_submissions,
    retire_failed_submissions, retire_old_submissions, update_users, StdoutTelemetrySink, TelemetrySink, TracingTelemetrySink,
};
use xqueue_worker::supervisor::run_supervisor;

/// Operational commands for the xqueue dispatcher, each a thin driver over a
/// `SubmissionStore` backed directly by Postgres (not an HTTP ops client).
#[derive(Parser, Debug)]
#[command(name = "xqueue", about = "Operational CLI for the xqueue dispatcher")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "xqueue.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Aggregate unretired counts per queue and emit them.
    CountQueuedSubmissions {
        /// "stdout" (default, always runs) or "tracing".
        #[arg(long)]
        telemetry_sink: Option<String>,
    },
    /// Delete submissions older than `--days-old` in chunks of `--chunk-size`.
    DeleteOldSubmissions {
        #[arg(long, default_value_t = 1000)]
        chunk_size: u32,
        #[arg(long, default_value_t = 1)]
        sleep_between: u64,
        #[arg(long, default_value_t = 30)]
        days_old: i64,
    },
    /// Requeue pulled-but-unreturned submissions past the pull timeout.
    RequeuePulledSubmissions { queue_names: Vec<String> },
    /// Retire submissions that have accrued too many failures.
    RetireFailedSubmissions {
        #[arg(short, long)]
        force: bool,
        queue_names: Vec<String>,
    },
    /// Unconditionally retire every unretired submission in one queue.
    RetireOldSubmissions {
        queue_name: String,
        #[arg(long)]
        retire_before: Option<String>,
    },
    /// One-shot push attempt against submissions never picked up by a worker.
    PushOrphanedSubmissions {
        #[arg(required = true)]
        queue_names: Vec<String>,
    },
    /// Start the push worker pool and block until shutdown.
    RunConsumer,
    /// Reconcile the configured `[users]` table against the auth store.
    UpdateUsers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let store = Arc::new(PostgresSubmissionStore::connect(&config.database_url, 5).await?);

    match cli.command {
        Command::CountQueuedSubmissions { telemetry_sink } => {
            let store: Arc<dyn SubmissionStore> = store;
            let counts = match telemetry_sink.as_deref() {
                Some("tracing") => count_queued_submissions(&store, &TracingTelemetrySink).await?,
                _ => count_queued_submissions(&store, &StdoutTelemetrySink).await?,
            };
            println!("{} queues reporting", counts.len());
        }
        Command::DeleteOldSubmissions { chunk_size, sleep_between, days_old } => {
            if chunk_size == 0 {
                bail!("--chunk-size must be positive");
            }
            if days_old < 0 {
                bail!("--days-old must be non-negative");
            }
            let store: Arc<dyn SubmissionStore> = store;
            let deleted =
                delete_old_submissions(&store, days_old, chunk_size, Duration::from_secs(sleep_between)).await?;
            println!("deleted {deleted} submissions");
        }
        Command::RequeuePulledSubmissions { queue_names } => {
            let store: Arc<dyn SubmissionStore> = store;
            validate_queue_names(&queue_names, &config)?;
            if queue_names.is_empty() {
                requeue_pulled_submissions(&store, None, &config.thresholds).await?;
            } else {
                for name in &queue_names {
                    requeue_pulled_submissions(&store, Some(name.as_str()), &config.thresholds).await?;
                }
            }
        }
        Command::RetireFailedSubmissions { force, queue_names } => {
            let store: Arc<dyn SubmissionStore> = store;
            let lms = build_lms_client(&config);
            validate_queue_names(&queue_names, &config)?;
            if queue_names.is_empty() {
                retire_failed_submissions(&store, &lms, None, &config.thresholds, force).await?;
            } else {
                for name in &queue_names {
                    retire_failed_submissions(&store, &lms, Some(name.as_str()), &config.thresholds, force).await?;
                }
            }
        }
        Command::RetireOldSubmissions { queue_name, retire_before } => {
            let retire_before = retire_before
                .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
                .transpose()
                .context("--retire-before must be an ISO-8601 timestamp")?;
            if config.queue(&queue_name).is_none() {
                bail!("unknown queue '{queue_name}'");
            }
            let store: Arc<dyn SubmissionStore> = store;
            let lms = build_lms_client(&config);
            retire_old_submissions(&store, &lms, &queue_name, retire_before).await?;
        }
        Command::PushOrphanedSubmissions { queue_names } => {
            let store: Arc<dyn SubmissionStore> = store;
            let lms = build_lms_client(&config);
            for name in &queue_names {
                let queue = config.queue(name).with_context(|| format!("unknown queue '{name}'"))?;
                let Some(grader_url) = queue.grader_url() else {
                    bail!("queue '{name}' is pull-only, has no grader to push orphans to");
                };
                let timeout = Duration::from_secs(config.thresholds.grading_timeout_seconds);
                let grader: Arc<dyn GraderClient> = Arc::new(HttpGraderClient::new(grader_url, timeout));
                push_orphaned_submissions(&store, &grader, &lms, queue, &config.thresholds).await?;
            }
        }
        Command::RunConsumer => {
            let store: Arc<dyn SubmissionStore> = store;
            let lms = build_lms_client(&config);
            let push_queues: Vec<_> = config.push_queues().cloned().collect();
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

            let supervisor = tokio::spawn(run_supervisor(push_queues, store, lms, config.thresholds.clone(), shutdown_rx));
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
            supervisor.await?;
        }
        Command::UpdateUsers => {
            let users: Arc<dyn UserStore> = store;
            update_users(&users, &config.users).await?;
        }
    }

    Ok(())
}

fn build_lms_client(config: &Config) -> Arc<LmsClient> {
    Arc::new(LmsClient::new(
        Duration::from_secs(config.thresholds.requests_timeout_seconds),
        config.lms.basic_auth.clone(),
    ))
}

/// Validates that every name in `names` is a configured queue. An empty list
/// means "all queues" and is always valid.
fn validate_queue_names(names: &[String], config: &Config) -> anyhow::Result<()> {
    for name in names {
        if config.queue(name).is_none() {
            bail!("unknown queue '{name}'");
        }
    }
    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path).with_context(|| format!("failed to read config at {path}"))?;
        Ok(RawConfig::from_toml_str(&contents)
            .with_context(|| format!("failed to parse config at {path}"))?
            .into_config())
    } else {
        bail!("config file not found at {path}");
    }
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM; mirrors `xqueue-server`'s own
/// `shutdown_signal` so `run-consumer` shuts down the same way the server's
/// background supervisor does.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT"); }
        () = terminate => { tracing::info!("received SIGTERM"); }
    }
}
