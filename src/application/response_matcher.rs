//! Response matcher
//!
//! Correlates a UI action with the network response it triggers. A wait is
//! armed (subscribed to the page's response stream) before the action runs,
//! so a fast response cannot slip past it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::infrastructure::browser::{BrowserError, BrowserPage, NetworkResponse};
use crate::infrastructure::errors::{ScrapeError, ScrapeResult};

/// Predicate over URL, method and status of a network response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponsePredicate {
    pub url_contains: Vec<String>,
    pub url_excludes: Vec<String>,
    pub method: Option<String>,
    pub status: Option<u16>,
}

impl ResponsePredicate {
    pub fn url_contains(fragment: impl Into<String>) -> Self {
        Self {
            url_contains: vec![fragment.into()],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn and_contains(mut self, fragment: impl Into<String>) -> Self {
        self.url_contains.push(fragment.into());
        self
    }

    #[must_use]
    pub fn excluding<I, S>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.url_excludes.extend(fragments.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, response: &NetworkResponse) -> bool {
        self.url_contains.iter().all(|f| response.url.contains(f.as_str()))
            && !self.url_excludes.iter().any(|f| response.url.contains(f.as_str()))
            && self
                .method
                .as_deref()
                .is_none_or(|m| m.eq_ignore_ascii_case(&response.method))
            && self.status.is_none_or(|s| s == response.status)
    }
}

impl fmt::Display for ResponsePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "url contains {:?}", self.url_contains)?;
        if !self.url_excludes.is_empty() {
            write!(f, " excluding {:?}", self.url_excludes)?;
        }
        if let Some(method) = &self.method {
            write!(f, ", method {method}")?;
        }
        if let Some(status) = self.status {
            write!(f, ", status {status}")?;
        }
        Ok(())
    }
}

/// A matched response together with its decoded JSON body.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub response: NetworkResponse,
    pub body: Value,
}

impl CapturedResponse {
    /// Decode the body into `T`, reporting the URL on shape mismatches.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> ScrapeResult<T> {
        serde_json::from_value(self.body.clone()).map_err(|e| ScrapeError::Decode {
            url: self.response.url.clone(),
            reason: e.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct ResponseMatcher {
    page: Arc<dyn BrowserPage>,
}

impl ResponseMatcher {
    pub fn new(page: Arc<dyn BrowserPage>) -> Self {
        Self { page }
    }

    /// Subscribe now; resolve on the first later response matching `predicate`.
    pub fn arm(&self, predicate: ResponsePredicate, timeout: Duration) -> ArmedResponse {
        debug!(%predicate, ?timeout, "arming response wait");
        ArmedResponse {
            page: Arc::clone(&self.page),
            receiver: self.page.subscribe_responses(),
            predicate,
            timeout,
        }
    }

    /// Arm, then run `action` and the wait concurrently.
    ///
    /// An action error wins if it arrives before the capture; otherwise the
    /// action is still driven to completion before returning.
    pub async fn trigger_and_wait<A>(
        &self,
        predicate: ResponsePredicate,
        timeout: Duration,
        action: A,
    ) -> ScrapeResult<CapturedResponse>
    where
        A: Future<Output = Result<(), BrowserError>>,
    {
        let armed = self.arm(predicate, timeout);
        let wait = armed.wait();
        tokio::pin!(wait);
        tokio::pin!(action);

        tokio::select! {
            acted = &mut action => {
                acted?;
                wait.await
            }
            captured = &mut wait => {
                let captured = captured?;
                action.await?;
                Ok(captured)
            }
        }
    }
}

/// A wait that is already listening.
pub struct ArmedResponse {
    page: Arc<dyn BrowserPage>,
    receiver: broadcast::Receiver<NetworkResponse>,
    predicate: ResponsePredicate,
    timeout: Duration,
}

impl ArmedResponse {
    pub async fn wait(mut self) -> ScrapeResult<CapturedResponse> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let matched = tokio::time::timeout_at(deadline, async {
            loop {
                match self.receiver.recv().await {
                    Ok(response) if self.predicate.matches(&response) => return Ok(response),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, predicate = %self.predicate, "response stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(ScrapeError::Browser(BrowserError::protocol(
                            "response stream closed",
                        )));
                    }
                }
            }
        })
        .await;

        let response = match matched {
            Ok(result) => result?,
            Err(_) => {
                return Err(ScrapeError::CorrelationTimeout {
                    predicate: self.predicate.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        debug!(url = %response.url, status = response.status, "captured response");
        let body = self.page.response_body(&response).await?;
        Ok(CapturedResponse { response, body })
    }
}
