//! Failures of the CDP page driver and the browser launcher.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    /// No Chromium binary started, or its DevTools endpoint never answered.
    #[error("browser launch failed: {reason}")]
    LaunchFailed { reason: String },

    #[error("DevTools connection to {url} failed: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// The browser answered a command with an error object.
    #[error("{method} rejected by the browser ({code}): {message}")]
    CommandRejected {
        method: String,
        code: i64,
        message: String,
    },

    #[error("{method} got no answer within {duration:?}")]
    CommandTimeout { method: String, duration: Duration },

    /// Socket closed, unparseable frame or a reply missing an expected field.
    #[error("DevTools protocol error: {detail}")]
    Protocol { detail: String },

    #[error("no element matches {selector}")]
    ElementNotFound { selector: String },

    #[error("selector {selector} did not appear within {duration:?}")]
    SelectorTimeout { selector: String, duration: Duration },

    #[error("navigation failed: {reason}")]
    NavigationFailed { reason: String },

    #[error("page script threw: {message}")]
    ScriptException { message: String },

    /// `DOMContentLoaded` never fired.
    #[error("page did not finish loading within {duration:?}")]
    LoadTimeout { duration: Duration },

    /// The element has no clickable box (hidden or zero-size).
    #[error("element cannot be clicked: {reason}")]
    NotClickable { reason: String },
}

impl BrowserError {
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }

    /// UI that is slow or not rendered yet; the same step may succeed later.
    pub fn is_transient_ui(&self) -> bool {
        matches!(
            self,
            Self::CommandTimeout { .. }
                | Self::SelectorTimeout { .. }
                | Self::LoadTimeout { .. }
                | Self::ElementNotFound { .. }
                | Self::NotClickable { .. }
                | Self::NavigationFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_commands_are_not_transient() {
        let err = BrowserError::CommandRejected {
            method: "DOM.getBoxModel".into(),
            code: -32000,
            message: "Could not compute box model.".into(),
        };
        assert!(!err.is_transient_ui());
        assert!(err.to_string().starts_with("DOM.getBoxModel rejected"));
        assert!(!BrowserError::protocol("socket closed").is_transient_ui());
    }

    #[test]
    fn test_waiting_failures_are_transient() {
        assert!(BrowserError::LoadTimeout { duration: Duration::from_secs(1) }.is_transient_ui());
        assert!(
            BrowserError::ElementNotFound { selector: "#email".into() }.is_transient_ui()
        );
    }
}
