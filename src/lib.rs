//! Incident Sync - browser-driven incident extraction
//!
//! Drives a real browser through a session-authenticated web application,
//! correlates UI actions with the internal API responses they trigger,
//! normalizes the captured JSON into a fixed row schema and upserts the
//! batch idempotently.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{RunSummary, SyncPipeline};
pub use infrastructure::{AppConfig, ScrapeError, ScrapeResult};
