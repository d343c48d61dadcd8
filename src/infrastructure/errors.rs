//! Error taxonomy of the extraction pipeline.
//!
//! Each variant maps to one recovery policy: transient UI and correlation
//! timeouts are retried, authentication failures are retried at whole-login
//! granularity, a missing UI control fails the current attempt, and storage
//! failures are reported without retry.

use std::time::Duration;

use thiserror::Error;

use crate::infrastructure::browser::BrowserError;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("transient UI failure: {message}")]
    TransientUi {
        message: String,
        #[source]
        source: Option<BrowserError>,
    },

    #[error("authentication failed: {reason}")]
    AuthFailure { reason: String },

    #[error("no response matching {predicate} within {timeout:?}")]
    CorrelationTimeout { predicate: String, timeout: Duration },

    #[error("expected UI control is missing: {control}")]
    MissingUiElement { control: String },

    #[error("storage write failed: {message}")]
    StorageWriteFailure {
        message: String,
        status: Option<u16>,
    },

    #[error("browser failure: {0}")]
    Browser(#[source] BrowserError),

    #[error("unexpected response body from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl ScrapeError {
    pub fn auth_failure(reason: impl Into<String>) -> Self {
        Self::AuthFailure {
            reason: reason.into(),
        }
    }

    pub fn missing_ui_element(control: impl Into<String>) -> Self {
        Self::MissingUiElement {
            control: control.into(),
        }
    }

    pub fn storage(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::StorageWriteFailure {
            message: message.into(),
            status,
        }
    }

    pub fn is_correlation_timeout(&self) -> bool {
        matches!(self, Self::CorrelationTimeout { .. })
    }

    /// Short label used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientUi { .. } => "transient_ui",
            Self::AuthFailure { .. } => "auth_failure",
            Self::CorrelationTimeout { .. } => "correlation_timeout",
            Self::MissingUiElement { .. } => "missing_ui_element",
            Self::StorageWriteFailure { .. } => "storage_write_failure",
            Self::Browser(_) => "browser",
            Self::Decode { .. } => "decode",
            Self::Configuration { .. } => "configuration",
        }
    }
}

impl From<BrowserError> for ScrapeError {
    fn from(err: BrowserError) -> Self {
        if err.is_transient_ui() {
            Self::TransientUi {
                message: err.to_string(),
                source: Some(err),
            }
        } else {
            Self::Browser(err)
        }
    }
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
