//! Infrastructure layer: browser automation, storage sinks and ambient services
//!
//! The browser module drives Chromium over CDP, storage holds the sync
//! writers, and config/logging/errors are shared by every layer.

pub mod browser; // CDP client, page driver, launcher
pub mod config; // Layered configuration
pub mod database_connection; // SQLite pool for the local sink
pub mod errors; // ScrapeError taxonomy
pub mod logging; // tracing subscriber setup
pub mod storage; // Sync writers

// Re-export commonly used items
pub use browser::{BrowserError, BrowserPage, BrowserSession, CdpPage, NetworkResponse};
pub use config::AppConfig;
pub use database_connection::DatabaseConnection;
pub use errors::{ScrapeError, ScrapeResult};
pub use logging::{init_logging, init_logging_with_config};
pub use storage::{PostgrestWriter, SqliteWriter, SyncWriter, UpsertReport};
