use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use xqueue_blobstore::{BlobStore, FilesystemBlobStore};
use xqueue_client::LmsClient;
use xqueue_core::config::{Config, RawConfig};
use xqueue_store::{SubmissionStore, UserStore};
use xqueue_store_postgres::PostgresSubmissionStore;
use xqueue_worker::maintenance;
use xqueue_worker::supervisor::run_supervisor;

use xqueue_server::auth::SessionConfig;
use xqueue_server::state::AppState;

/// xqueue dispatcher HTTP server.
#[derive(Parser, Debug)]
#[command(name = "xqueue-server", about = "HTTP server exposing the xqueue push/pull/intake surface")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "xqueue.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config: Config = if Path::new(&cli.config).exists() {
        let contents = std::fs::read_to_string(&cli.config)?;
        RawConfig::from_toml_str(&contents)?.into_config()
    } else {
        info!(path = %cli.config, "config file not found, using defaults");
        RawConfig::from_toml_str("database_url = \"\"")?.into_config()
    };
    let config = Arc::new(config);

    let pg_store = Arc::new(PostgresSubmissionStore::connect(&config.database_url, 10).await?);
    let store: Arc<dyn SubmissionStore> = pg_store.clone();
    let users: Arc<dyn UserStore> = pg_store.clone();

    maintenance::update_users(&users, &config.users).await?;

    let blobs: Arc<dyn BlobStore> = Arc::new(FilesystemBlobStore::new(
        config.blob_store.root_dir.clone(),
        config.blob_store.base_url.clone(),
    ));

    let lms = Arc::new(LmsClient::new(
        Duration::from_secs(config.thresholds.requests_timeout_seconds),
        config.lms.basic_auth.clone(),
    ));

    let session = SessionConfig {
        secret: config.server.session_secret.clone(),
        ttl_seconds: config.server.session_ttl_seconds,
    };

    let state = AppState {
        store: store.clone(),
        users,
        blobs,
        lms: lms.clone(),
        config: config.clone(),
        session,
    };
    let app = xqueue_server::api::router(state);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let push_queues: Vec<_> = config.push_queues().cloned().collect();
    let supervisor_handle = tokio::spawn(run_supervisor(
        push_queues,
        store.clone(),
        lms.clone(),
        config.thresholds.clone(),
        shutdown_rx.clone(),
    ));

    let maintenance_handle = tokio::spawn(run_maintenance_loop(store.clone(), lms.clone(), config.clone(), shutdown_rx.clone()));

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "xqueue-server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    supervisor_handle.await?;
    maintenance_handle.await?;

    info!("xqueue-server shut down");
    Ok(())
}

/// Runs the background maintenance jobs on a fixed interval (§5 "Scheduling
/// model"): requeue-pulled, retire-failed (soft), push-orphaned for each push
/// queue, and count-queued. `retire-old`, `delete-old`, and `update-users` are
/// operator-triggered only and stay on the CLI surface.
async fn run_maintenance_loop(
    store: Arc<dyn SubmissionStore>,
    lms: Arc<LmsClient>,
    config: Arc<Config>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(config.thresholds.poll_interval_seconds.max(1) * 30));
    let sink = maintenance::StdoutTelemetrySink;
    let graders: Vec<_> = config
        .push_queues()
        .map(|queue| {
            let timeout = Duration::from_secs(config.thresholds.grading_timeout_seconds);
            let grader: Arc<dyn xqueue_client::GraderClient> =
                Arc::new(xqueue_client::HttpGraderClient::new(queue.grader_url().unwrap_or_default(), timeout));
            (queue.clone(), grader)
        })
        .collect();

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => return,
        }
        if *shutdown.borrow() {
            return;
        }

        if let Err(e) = maintenance::requeue_pulled_submissions(&store, None, &config.thresholds).await {
            tracing::error!(error = %e, "requeue-pulled-submissions failed");
        }
        if let Err(e) = maintenance::retire_failed_submissions(&store, &lms, None, &config.thresholds, false).await {
            tracing::error!(error = %e, "retire-failed-submissions failed");
        }
        for (queue, grader) in &graders {
            if let Err(e) = maintenance::push_orphaned_submissions(&store, grader, &lms, queue, &config.thresholds).await {
                tracing::error!(error = %e, queue = %queue.name, "push-orphaned-submissions failed");
            }
        }
        if let Err(e) = maintenance::count_queued_submissions(&store, &sink).await {
            tracing::error!(error = %e, "count-queued-submissions failed");
        }
    }
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, then returns to trigger graceful shutdown.
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
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
