//! # Sensa Uploader
//!
//! Command line entry point: loads the configuration, opens the point store
//! and runs one sync against the collector.
//!
//! ## Commands
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sensa-uploader sync [--json]     one sync run, prints the report       │
//! │  sensa-uploader status            pending measurements and points       │
//! │  sensa-uploader init-config       writes a default sync.toml            │
//! │                                                                         │
//! │  Ctrl-C during `sync` stops after the current batch.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sensa_core::{MeasurementStatus, PointKind};
use sensa_db::{Database, DbConfig};
use sensa_sync::{LogListener, SyncConfig, SyncEngine, SyncReport};

#[derive(Debug, Parser)]
#[command(name = "sensa-uploader", version, about = "Upload finished measurements to the Sensa collector")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "SENSA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one sync over all finished measurements
    Sync {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show measurements waiting for upload
    Status,
    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Sync { json } => sync(cli.config, json).await,
        Command::Status => status(cli.config).await,
        Command::InitConfig { force } => init_config(cli.config, force),
    }
}

async fn open_database(config: &SyncConfig) -> Result<Database> {
    let path = &config.storage.database_path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }

    let db = Database::new(DbConfig::new(path))
        .await
        .with_context(|| format!("opening database {}", path.display()))?;
    Ok(db)
}

async fn sync(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let config = SyncConfig::load(config_path).context("loading configuration")?;
    let db = open_database(&config).await?;

    let engine = SyncEngine::from_config(&config, db.clone())?;
    engine.add_listener(Arc::new(LogListener));

    let handle = engine.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            handle.cancel();
        }
    });

    let report = engine.run().await;
    db.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    // Per-measurement failures are reported, not fatal.
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!(
        "Synced {} of {} measurements, {} of {} points transmitted",
        report.synced_count(),
        report.outcomes.len(),
        report.transmitted_points,
        report.total_points
    );
    if report.cancelled {
        println!("Run was cancelled");
    }
    for err in &report.errors {
        let target = err
            .measurement_id
            .map(|id| format!("measurement {id}"))
            .unwrap_or_else(|| "run".to_string());
        println!(
            "  [{}] {target}: {}{}",
            err.code,
            err.message,
            if err.retryable { " (will retry)" } else { "" }
        );
    }
}

async fn status(config_path: Option<PathBuf>) -> Result<()> {
    let config = SyncConfig::load(config_path).context("loading configuration")?;
    let db = open_database(&config).await?;

    let pending = db.measurements().list_by_status(MeasurementStatus::Finished).await?;
    let open = db.measurements().list_by_status(MeasurementStatus::Open).await?;

    println!("Collector: {}", config.collector.base_url);
    println!("Device:    {}", config.device_id());
    println!("Open measurements: {}", open.len());
    println!("Waiting for upload: {}", pending.len());

    for measurement in &pending {
        let counts = db.points().count_unsynced_by_kind(measurement.id).await?;
        let per_kind = PointKind::ALL
            .iter()
            .map(|kind| format!("{kind}={}", counts[*kind]))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "  #{:<6} {:<10} {:>8} points  ({per_kind})",
            measurement.id,
            measurement.vehicle,
            counts.total()
        );
    }

    db.close().await;
    Ok(())
}

fn init_config(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let target = config_path
        .or_else(SyncConfig::default_config_path)
        .context("no config path available on this platform")?;

    if target.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", target.display());
    }

    let path = SyncConfig::new().save(Some(target))?;
    info!(?path, "Default configuration written");
    println!("Wrote {}", path.display());
    Ok(())
}
