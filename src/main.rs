//! # Restock Entry Point
//!
//! | Command | Description |
//! |---------|-------------|
//! | `restock run` | Crawl every configured source once |
//! | `restock monitor` | Print shop liveness and exit with its status code |
//! | `restock serve` | Serve the read-only catalog API |
//! | `restock migrate` | Apply pending database migrations |

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use restock::config::{AppConfig, ConfigLoader};
use restock::guard::{GuardHandle, ProcessGuard};
use restock::monitor::LivenessMonitor;
use restock::repositories::CatalogRepository;
use restock::server::{AppState, run_server};
use restock::{app, db, telemetry};

/// Restock crawler: watches shops and announces when products come back in stock.
#[derive(Parser)]
#[command(name = "restock", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every configured source once.
    Run {
        /// Record changes without sending notifications.
        #[arg(long)]
        disable_notifications: bool,

        /// Number of sources crawled concurrently.
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Check that every shop was crawled recently.
    ///
    /// Prints one status line and exits 0 (ok), 1 (warning), 2 (critical)
    /// or 3 (unknown).
    Monitor,

    /// Serve the read-only catalog API.
    Serve,

    /// Apply pending database migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = telemetry::init_tracing(&config) {
        eprintln!("Warning: {}", e);
    }

    if let Ok(redacted) = config.redacted_json() {
        info!(profile = %config.profile, config = %redacted, "configuration loaded");
    }

    let result = match cli.command {
        Commands::Monitor => return monitor(&config).await,
        Commands::Run { .. } => run(config).await,
        Commands::Serve => serve(config).await,
        Commands::Migrate => migrate(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "restock failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = ConfigLoader::new()
        .load()
        .context("Failed to load configuration")?;

    if let Commands::Run {
        disable_notifications,
        workers,
    } = &cli.command
    {
        config.crawl.disable_notifications |= *disable_notifications;
        if let Some(workers) = workers {
            config.crawl.workers = *workers;
        }
        config.validate().context("Invalid configuration")?;
    }

    Ok(config)
}

async fn migrate(config: AppConfig) -> Result<()> {
    let db = db::init_pool(&config).await?;
    db::run_migrations(&db).await?;
    info!("migrations applied");
    Ok(())
}

async fn run(config: AppConfig) -> Result<()> {
    let _guard = acquire_guard(&config).await?;

    let db = db::init_pool(&config).await?;
    db::run_migrations(&db).await?;

    let report = app::run_crawl(&config, Arc::new(db)).await?;
    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        created = report.stats.created,
        became_available = report.stats.became_available,
        became_unavailable = report.stats.became_unavailable,
        "run finished"
    );
    Ok(())
}

async fn acquire_guard(config: &AppConfig) -> Result<Option<GuardHandle>> {
    let Some(path) = &config.guard.pid_file else {
        return Ok(None);
    };
    let timeout = Duration::from_secs(config.guard.pid_wait_timeout_seconds);
    let handle = ProcessGuard::acquire(path, timeout).await?;
    Ok(Some(handle))
}

async fn serve(config: AppConfig) -> Result<()> {
    let db = db::init_pool(&config).await?;
    db::run_migrations(&db).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        signal.cancel();
    });

    let state = AppState {
        config: Arc::new(config),
        db: Arc::new(db),
    };
    run_server(state, shutdown).await
}

async fn monitor(config: &AppConfig) -> ExitCode {
    let report = match db::init_pool(config).await {
        Ok(db) => {
            let catalog = CatalogRepository::new(Arc::new(db));
            LivenessMonitor::new(catalog, &config.monitor).check().await
        }
        Err(e) => restock::monitor::LivenessReport::unknown(format!("{:#}", e)),
    };

    println!("{}", report);
    ExitCode::from(report.code() as u8)
}
