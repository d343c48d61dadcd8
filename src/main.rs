use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::error;

use incident_sync::application::run_with_browser;
use incident_sync::infrastructure::browser::{BrowserSession, PageOptions};
use incident_sync::infrastructure::config::{AppConfig, PaginationKind, StorageKind};
use incident_sync::infrastructure::logging::{init_logging_with_config, log_system_info};
use incident_sync::infrastructure::storage::writer_from_config;

#[derive(Parser, Debug)]
#[command(name = "incident-sync", version, about = "Sync incidents from the web client into storage")]
struct Cli {
    #[arg(long, help = "JSON configuration file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Only capture the first listing page")]
    first_page_only: bool,
    #[arg(long, help = "Stop paginating after this many pages")]
    max_pages: Option<u32>,
    #[arg(long, value_enum, help = "Storage sink")]
    sink: Option<Sink>,
    #[arg(long, help = "Normalize and log rows without writing them")]
    dry_run: bool,
    #[arg(long, help = "Log level (overrides configuration)")]
    log_level: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Sink {
    Postgrest,
    Sqlite,
}

impl From<Sink> for StorageKind {
    fn from(sink: Sink) -> Self {
        match sink {
            Sink::Postgrest => Self::Postgrest,
            Sink::Sqlite => Self::Sqlite,
        }
    }
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if self.first_page_only {
            config.listing.pagination = PaginationKind::FirstPageOnly;
        }
        if let Some(max_pages) = self.max_pages {
            config.listing.max_pages = max_pages;
        }
        if let Some(sink) = self.sink {
            config.storage.kind = sink.into();
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            // Logging may not be up yet.
            eprintln!("incident-sync: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);

    init_logging_with_config(&config.logging).context("Failed to initialize logging")?;
    log_system_info();

    config
        .validate(!cli.dry_run)
        .context("Invalid configuration")?;

    let writer = if cli.dry_run {
        None
    } else {
        Some(
            writer_from_config(&config.storage)
                .await
                .context("Failed to open storage")?,
        )
    };

    let page_options = PageOptions {
        navigation_timeout: config.timeouts.navigation(),
        typing_delay: config.timeouts.typing_delay(),
    };
    let browser = BrowserSession::launch(&config.browser, page_options)
        .await
        .context("Failed to launch browser")?;

    match run_with_browser(browser, &config, writer).await {
        Ok(summary) => {
            summary.log();
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Script failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
