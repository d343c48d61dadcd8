//! The browser capability the extraction core is written against.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::error::BrowserError;

/// Polling cadence for selector waits.
pub const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A completed network response observed on the active page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
    /// Browser-side request id, used to fetch the body.
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub status: u16,
}

/// One page of one browser context.
///
/// Network responses are published on a broadcast channel once their body
/// is available; subscribers only see responses that finish after they
/// subscribed.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for `DOMContentLoaded`.
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    async fn exists(&self, selector: &str) -> Result<bool, BrowserError>;

    /// Trimmed text of the first match, `None` when nothing matches.
    async fn text_content(&self, selector: &str) -> Result<Option<String>, BrowserError>;

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), BrowserError>;

    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// Click the first `<button>` whose text contains `text` and which holds a
    /// `badge_selector` descendant. Returns `false` when no such button exists.
    async fn click_button_with_badge(
        &self,
        text: &str,
        badge_selector: &str,
    ) -> Result<bool, BrowserError>;

    fn subscribe_responses(&self) -> broadcast::Receiver<NetworkResponse>;

    /// JSON body of a response previously published on the response stream.
    async fn response_body(&self, response: &NetworkResponse) -> Result<Value, BrowserError>;

    async fn content(&self) -> Result<String, BrowserError>;

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.exists(selector).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::SelectorTimeout {
                    selector: selector.to_string(),
                    duration: timeout,
                });
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }
}
