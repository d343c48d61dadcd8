//! Logging system configuration and initialization
//!
//! - Console output (plain or JSON)
//! - Optional non-blocking daily file output in the log directory
//! - Verbose dependency targets suppressed unless TRACE is requested
//! - `RUST_LOG` overrides the configured filter entirely

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, bail};
use once_cell::sync::Lazy;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::{self, time::FormatTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::app_data_dir;

// Keeps file writers flushing for the life of the process.
static LOG_GUARDS: Lazy<Mutex<Vec<WorkerGuard>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Dependency targets that drown out the run log below TRACE.
const QUIET_DIRECTIVES: &[&str] = &[
    "sqlx::query=warn",
    "sqlx::sqlite=warn",
    "reqwest=info",
    "hyper=warn",
    "hyper_util=warn",
    "h2=warn",
    "tungstenite=warn",
    "tokio_tungstenite=warn",
    "tokio=info",
    "runtime=warn",
];

struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Resolve the log directory, defaulting to `<data_dir>/incident-sync/logs`.
pub fn log_directory(config: &LoggingConfig) -> Result<PathBuf> {
    match &config.log_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(app_data_dir()?.join("logs")),
    }
}

/// Filter directives derived from the configured level.
pub fn default_directives(config: &LoggingConfig) -> Vec<String> {
    let mut directives = vec![config.level.clone()];
    if config.level.to_lowercase().contains("trace") {
        return directives;
    }
    directives.extend(QUIET_DIRECTIVES.iter().map(|d| (*d).to_string()));
    // A bare level keeps our own crate at that level regardless of the quiet list.
    if config.level.parse::<LevelFilter>().is_ok() {
        directives.push(format!("incident_sync={}", config.level.to_lowercase()));
    }
    directives
}

fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(default_directives(config).join(","))
        .with_context(|| format!("Invalid log level '{}'", config.level))
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.console_output && !config.file_output {
        bail!("No logging output configured");
    }

    let env_filter = build_env_filter(config)?;
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let console_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_timer(LocalTimeFormatter)
            .with_target(false);
        layers.push(if config.json_format {
            console_layer.json().boxed()
        } else {
            console_layer.boxed()
        });
    }

    let mut log_dir = None;
    if config.file_output {
        let dir = log_directory(config)?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

        let file_appender = rolling::daily(&dir, format!("{}.log", config.file_prefix));
        let (file_writer, file_guard) = non_blocking(file_appender);
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("log guard registry poisoned"))?
            .push(file_guard);

        // No ANSI color codes for file output
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_timer(LocalTimeFormatter)
            .with_ansi(false);
        layers.push(if config.json_format {
            file_layer
                .json()
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        } else {
            file_layer.with_target(false).boxed()
        });
        log_dir = Some(dir);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    info!("JSON format: {}", config.json_format);
    if let Some(dir) = log_dir {
        info!("Log directory: {:?}", dir);
    }
    if config.level.to_lowercase().contains("trace") {
        info!("TRACE level active - dependency logs are not filtered");
    }
    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Incident Sync ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
    info!("=====================");
}
