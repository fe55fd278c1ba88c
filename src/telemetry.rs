//! Process-wide tracing setup.
//!
//! Every subcommand logs to stderr; `restock monitor` owns stdout for its
//! status line.

use std::io;
use std::sync::OnceLock;

use log::LevelFilter;
use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::AppConfig;

/// Crates whose `log` output is only useful when debugging the database.
const NOISY_TARGETS: &[&str] = &["sqlx", "sea_orm", "hyper_util", "reqwest"];

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
    #[error("invalid log filter {filter:?}: {message}")]
    Filter { filter: String, message: String },
}

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    /// Unknown names fall back to JSON.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" | "text" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Filter directives for a configured level: the level applies to restock,
/// dependencies are capped at `warn` unless the level is `debug` or finer.
pub fn filter_directives(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    let verbose = matches!(level.as_str(), "debug" | "trace");
    let mut directives = vec![level.clone()];
    if !verbose {
        directives.extend(NOISY_TARGETS.iter().map(|target| format!("{target}=warn")));
    }
    directives.push(format!("restock={level}"));
    directives.join(",")
}

fn build_filter(config: &AppConfig) -> Result<EnvFilter, TelemetryInitError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = filter_directives(&config.log_level);
    EnvFilter::try_new(&directives).map_err(|e| TelemetryInitError::Filter {
        filter: directives,
        message: e.to_string(),
    })
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let filter = build_filter(config)?;
    let fmt_layer = match LogFormat::parse(&config.log_format) {
        LogFormat::Pretty => fmt::layer().pretty().with_writer(io::stderr).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(io::stderr).boxed(),
    };

    // sea-orm and sqlx report statements through `log`
    LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    let _ = INSTALLED.set(());
    Ok(())
}
