//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate, lowest precedence first:
//! 1. Built-in defaults (`defaults` module)
//! 2. JSON file (`--config`, else `<config_dir>/incident-sync/config.json` when present)
//! 3. `INCIDENT_SYNC__SECTION__KEY` environment variables
//! 4. Legacy variables `EMAIL`, `PSKY`, `SUPABASE_URL`, `SUPABASE_KEY`

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::infrastructure::errors::{ScrapeError, ScrapeResult};

pub const ENV_PREFIX: &str = "INCIDENT_SYNC";
pub const APP_DIR_NAME: &str = "incident-sync";

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub credentials: Credentials,
    pub target: TargetConfig,
    pub selectors: SelectorConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub listing: ListingSettings,
    pub browser: BrowserConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Login credentials for the target application.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// URLs of the target application.
///
/// Endpoint templates contain an `{id}` placeholder for the incident id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub sign_in_url: String,
    /// Incident list page; detail pages are resolved relative to it.
    pub list_url: String,
    pub detail_page: String,
    pub listing_api: String,
    pub assessment_api: String,
    pub comments_api: String,
    pub contact_api: String,
    /// URL fragments that disqualify a listing or assessment response.
    pub excluded_fragments: Vec<String>,
}

impl TargetConfig {
    pub fn detail_url(&self, id: &str) -> String {
        format!("{}{}", self.list_url, fill_id(&self.detail_page, id))
    }

    pub fn assessment_fragment(&self, id: &str) -> String {
        fill_id(&self.assessment_api, id)
    }

    pub fn comments_fragment(&self, id: &str) -> String {
        fill_id(&self.comments_api, id)
    }

    pub fn contact_fragment(&self, id: &str) -> String {
        fill_id(&self.contact_api, id)
    }
}

fn fill_id(template: &str, id: &str) -> String {
    template.replace("{id}", id)
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            sign_in_url: defaults::SIGN_IN_URL.to_string(),
            list_url: defaults::LIST_URL.to_string(),
            detail_page: defaults::DETAIL_PAGE.to_string(),
            listing_api: defaults::LISTING_API.to_string(),
            assessment_api: defaults::ASSESSMENT_API.to_string(),
            comments_api: defaults::COMMENTS_API.to_string(),
            contact_api: defaults::CONTACT_API.to_string(),
            excluded_fragments: defaults::EXCLUDED_FRAGMENTS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

/// CSS selectors for the handful of controls the run interacts with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub email_input: String,
    pub password_input: String,
    pub submit_button: String,
    pub avatar: String,
    pub pagination: String,
    pub error_banner: String,
    /// Page-N control, `{n}` is the 1-based page number.
    pub page_button: String,
    pub contact_button_text: String,
    pub contact_badge: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            email_input: defaults::EMAIL_INPUT.to_string(),
            password_input: defaults::PASSWORD_INPUT.to_string(),
            submit_button: defaults::SUBMIT_BUTTON.to_string(),
            avatar: defaults::AVATAR.to_string(),
            pagination: defaults::PAGINATION.to_string(),
            error_banner: defaults::ERROR_BANNER.to_string(),
            page_button: defaults::PAGE_BUTTON.to_string(),
            contact_button_text: defaults::CONTACT_BUTTON_TEXT.to_string(),
            contact_badge: defaults::CONTACT_BADGE.to_string(),
        }
    }
}

/// Timeouts in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub navigation_ms: u64,
    pub selector_ms: u64,
    pub login_ms: u64,
    pub response_ms: u64,
    pub contact_ms: u64,
    pub poll_interval_ms: u64,
    pub typing_delay_ms: u64,
}

impl TimeoutConfig {
    pub const fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub const fn selector(&self) -> Duration {
        Duration::from_millis(self.selector_ms)
    }

    pub const fn login(&self) -> Duration {
        Duration::from_millis(self.login_ms)
    }

    pub const fn response(&self) -> Duration {
        Duration::from_millis(self.response_ms)
    }

    pub const fn contact(&self) -> Duration {
        Duration::from_millis(self.contact_ms)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn typing_delay(&self) -> Duration {
        Duration::from_millis(self.typing_delay_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation_ms: defaults::NAVIGATION_TIMEOUT_MS,
            selector_ms: defaults::SELECTOR_TIMEOUT_MS,
            login_ms: defaults::LOGIN_TIMEOUT_MS,
            response_ms: defaults::RESPONSE_TIMEOUT_MS,
            contact_ms: defaults::CONTACT_TIMEOUT_MS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            typing_delay_ms: defaults::TYPING_DELAY_MS,
        }
    }
}

/// Fixed-delay retry settings for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_ATTEMPTS,
            delay_ms: defaults::RETRY_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub login: RetrySettings,
    pub listing: RetrySettings,
    pub detail: RetrySettings,
    pub contact: RetrySettings,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            login: RetrySettings::default(),
            listing: RetrySettings::default(),
            detail: RetrySettings::default(),
            contact: RetrySettings {
                max_attempts: defaults::CONTACT_RETRY_ATTEMPTS,
                delay_ms: defaults::RETRY_DELAY_MS,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationKind {
    #[default]
    AllPages,
    FirstPageOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSettings {
    pub pagination: PaginationKind,
    pub max_pages: u32,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            pagination: PaginationKind::AllPages,
            max_pages: defaults::MAX_PAGES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chromium binary; searched on `PATH` when unset.
    pub executable: Option<PathBuf>,
    pub debug_port: u16,
    /// Existing DevTools endpoint: a page `ws://` URL or an `http://host:port` base.
    pub ws_url: Option<String>,
    pub headless: bool,
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
    pub startup_timeout_ms: u64,
    /// Where to write a screenshot when the run aborts.
    pub screenshot_path: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            debug_port: defaults::DEBUG_PORT,
            ws_url: None,
            headless: true,
            user_agent: defaults::USER_AGENT.to_string(),
            window_width: defaults::WINDOW_WIDTH,
            window_height: defaults::WINDOW_HEIGHT,
            startup_timeout_ms: defaults::BROWSER_STARTUP_TIMEOUT_MS,
            screenshot_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    #[default]
    Postgrest,
    Sqlite,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    /// PostgREST/Supabase project URL.
    pub url: Option<String>,
    /// PostgREST/Supabase API key.
    pub key: Option<String>,
    pub table: String,
    pub sqlite_path: Option<PathBuf>,
    pub request_timeout_ms: u64,
}

impl StorageConfig {
    /// SQLite database file, defaulting to the per-user data directory.
    pub fn sqlite_path_or_default(&self) -> Result<PathBuf> {
        if let Some(path) = &self.sqlite_path {
            return Ok(path.clone());
        }
        Ok(app_data_dir()?.join(defaults::SQLITE_FILE))
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("table", &self.table)
            .field("sqlite_path", &self.sqlite_path)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Postgrest,
            url: None,
            key: None,
            table: defaults::TABLE.to_string(),
            sqlite_path: None,
            request_timeout_ms: defaults::STORAGE_REQUEST_TIMEOUT_MS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    /// Defaults to `<data_dir>/incident-sync/logs`.
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            file_prefix: APP_DIR_NAME.to_string(),
        }
    }
}

/// Per-user configuration directory
pub fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Failed to get user config directory")?
        .join(APP_DIR_NAME))
}

/// Per-user data directory (SQLite file, logs)
pub fn app_data_dir() -> Result<PathBuf> {
    Ok(dirs::data_local_dir()
        .context("Failed to get user data directory")?
        .join(APP_DIR_NAME))
}

impl AppConfig {
    /// Load from the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, std::env::vars().collect())
    }

    /// Load with an explicit environment map.
    pub fn load_with_env(path: Option<&Path>, env: HashMap<String, String>) -> Result<Self> {
        let defaults = Config::try_from(&Self::default())
            .context("Failed to serialize default configuration")?;
        let mut builder = Config::builder().add_source(defaults);

        match path {
            Some(path) => {
                info!("📄 Loading configuration from {:?}", path);
                builder = builder.add_source(File::from(path).format(FileFormat::Json).required(true));
            }
            None => {
                if let Ok(default_path) = config_dir().map(|d| d.join("config.json")) {
                    if default_path.exists() {
                        info!("📄 Loading configuration from {:?}", default_path);
                        builder = builder
                            .add_source(File::from(default_path).format(FileFormat::Json).required(false));
                    }
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        );

        for (var, key) in [
            ("EMAIL", "credentials.email"),
            ("PSKY", "credentials.password"),
            ("SUPABASE_URL", "storage.url"),
            ("SUPABASE_KEY", "storage.key"),
        ] {
            let value = env.get(var).filter(|v| !v.is_empty()).cloned();
            builder = builder
                .set_override_option(key, value)
                .with_context(|| format!("Failed to apply {var}"))?;
        }

        builder
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Configuration has an invalid shape")
    }

    /// Reject configurations the run cannot start with.
    pub fn validate(&self, require_storage: bool) -> ScrapeResult<()> {
        if self.credentials.email.trim().is_empty() || self.credentials.password.is_empty() {
            return Err(configuration(
                "login credentials are missing (set EMAIL and PSKY or credentials.*)",
            ));
        }
        if self.listing.max_pages == 0 {
            return Err(configuration("listing.max_pages must be at least 1"));
        }
        if !require_storage {
            return Ok(());
        }
        match self.storage.kind {
            StorageKind::Postgrest => {
                let url_missing = self.storage.url.as_deref().is_none_or(str::is_empty);
                let key_missing = self.storage.key.as_deref().is_none_or(str::is_empty);
                if url_missing || key_missing {
                    return Err(configuration(
                        "Missing SUPABASE_URL or SUPABASE_KEY for the postgrest sink",
                    ));
                }
            }
            StorageKind::Sqlite => {
                if self.storage.table.trim().is_empty() {
                    return Err(configuration("storage.table must not be empty"));
                }
            }
        }
        Ok(())
    }
}

fn configuration(message: &str) -> ScrapeError {
    ScrapeError::Configuration {
        message: message.to_string(),
    }
}

/// Default configuration values
pub mod defaults {
    pub const SIGN_IN_URL: &str = "https://client.firenotification.com/auth/sign-in";
    pub const LIST_URL: &str = "https://client.firenotification.com/";
    pub const DETAIL_PAGE: &str = "incident?incidentId={id}";
    pub const LISTING_API: &str = "/api/incident";
    pub const ASSESSMENT_API: &str = "/api/assessment/incident/{id}";
    pub const COMMENTS_API: &str = "/api/incident/{id}/comments";
    pub const CONTACT_API: &str = "/api/incident/{id}/contact";
    pub const EXCLUDED_FRAGMENTS: &[&str] = &["comments", "contact"];

    pub const EMAIL_INPUT: &str = r#"input[type="email"]"#;
    pub const PASSWORD_INPUT: &str = r#"input[type="password"]"#;
    pub const SUBMIT_BUTTON: &str = r#"button[type="submit"]"#;
    pub const AVATAR: &str = r#"img[src="/assets/placeholders/user.png"][alt="Placeholder avatar"]"#;
    pub const PAGINATION: &str = r#"button.MuiPaginationItem-page[aria-label="page 1"]"#;
    pub const ERROR_BANNER: &str = r#".MuiAlert-message, .MuiAlert-root, [role="alert"], .error"#;
    pub const PAGE_BUTTON: &str = r#"button[aria-label="page {n}"]"#;
    pub const CONTACT_BUTTON_TEXT: &str = "Contact";
    pub const CONTACT_BADGE: &str = ".MuiBadge-badge";

    pub const NAVIGATION_TIMEOUT_MS: u64 = 60_000;
    pub const SELECTOR_TIMEOUT_MS: u64 = 20_000;
    pub const LOGIN_TIMEOUT_MS: u64 = 30_000;
    pub const RESPONSE_TIMEOUT_MS: u64 = 60_000;
    pub const CONTACT_TIMEOUT_MS: u64 = 15_000;
    pub const POLL_INTERVAL_MS: u64 = 250;
    pub const TYPING_DELAY_MS: u64 = 100;

    pub const RETRY_ATTEMPTS: u32 = 3;
    pub const RETRY_DELAY_MS: u64 = 2000;
    pub const CONTACT_RETRY_ATTEMPTS: u32 = 2;

    pub const MAX_PAGES: u32 = 50;

    pub const DEBUG_PORT: u16 = 9222;
    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
    pub const WINDOW_WIDTH: u32 = 1280;
    pub const WINDOW_HEIGHT: u32 = 800;
    pub const BROWSER_STARTUP_TIMEOUT_MS: u64 = 30_000;

    pub const TABLE: &str = "incidents";
    pub const SQLITE_FILE: &str = "incidents.db";
    pub const STORAGE_REQUEST_TIMEOUT_MS: u64 = 30_000;

    pub const LOG_LEVEL: &str = "info";
}
