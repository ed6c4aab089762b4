//! drydockd — the drydock daemon.
//!
//! Single binary that assembles every drydock subsystem:
//! - JSON-backed instance/task store
//! - Deployment queue + the single pipeline worker
//! - Process supervisor
//! - Cron scheduler
//!
//! The transport layer (REST, console streaming) lives elsewhere; this
//! binary wires the subsystems together and keeps them running until
//! Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! drydockd run --config /etc/drydock.toml
//! drydockd init-config drydock.toml
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use drydock_core::{Config, StatusHub};
use drydock_scheduler::Scheduler;
use drydock_store::Store;
use drydock_supervisor::Supervisor;

/// TTL of the status cache that serves deployment progress polls.
const STATUS_TTL: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "drydockd", about = "drydock daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon.
    Run {
        /// Path to drydock.toml; a missing file falls back to defaults.
        #[arg(long, default_value = "drydock.toml")]
        config: PathBuf,

        /// Override the configured data directory.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Write a default drydock.toml and exit.
    InitConfig {
        /// Destination path; refuses to overwrite an existing file.
        #[arg(default_value = "drydock.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,drydockd=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, data_dir } => run(config, data_dir).await,
        Command::InitConfig { path } => init_config(path),
    }
}

async fn run(config_path: PathBuf, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = if config_path.is_file() {
        Config::from_file(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        info!(path = %config_path.display(), "no config file, using defaults");
        Config::default()
    };
    if let Some(dir) = data_dir {
        config.paths.data_dir = dir;
    }

    info!(data_dir = %config.paths.data_dir.display(), "drydock daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(config.servers_dir()).context("creating servers directory")?;
    std::fs::create_dir_all(config.runtimes_dir()).context("creating runtimes directory")?;
    std::fs::create_dir_all(config.uploads_dir()).context("creating uploads directory")?;

    let store = Store::open(&config.paths.data_dir).context("opening the store")?;
    info!("store opened");

    let hub = StatusHub::new(STATUS_TTL);

    let supervisor = Supervisor::new(store.clone(), &config.supervisor);
    info!("supervisor initialized");

    let pipeline = drydock_deploy::Pipeline::new(store.clone(), config.clone())
        .context("building the deployment pipeline")?;
    let (queue, worker) = drydock_queue::channel(
        config.queue.capacity,
        pipeline,
        supervisor.clone(),
        hub.clone(),
    );
    info!(capacity = config.queue.capacity, "deployment queue ready");

    let scheduler = Scheduler::new(store.clone(), supervisor.clone(), hub.clone(), config.clone());
    info!(tick_secs = config.scheduler.tick_secs, "scheduler initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background loops ─────────────────────────────────

    let worker_handle = tokio::spawn(worker.run(shutdown_rx.clone()));
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    // The transport layer submits through this handle; holding it here
    // keeps the queue channel open for the daemon's lifetime.
    let _queue = queue;

    tokio::signal::ctrl_c()
        .await
        .context("installing the Ctrl-C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    supervisor.shutdown_all().await;

    let _ = worker_handle.await;
    let _ = scheduler_handle.await;

    info!("drydock daemon stopped");
    Ok(())
}

fn init_config(path: PathBuf) -> anyhow::Result<()> {
    anyhow::ensure!(!path.exists(), "{} already exists", path.display());
    let rendered = Config::default().to_toml_string()?;
    std::fs::write(&path, rendered).with_context(|| format!("writing {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}
