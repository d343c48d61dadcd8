//! List traversal: the roster of incident summaries, one or many pages.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::application::response_matcher::{CapturedResponse, ResponseMatcher, ResponsePredicate};
use crate::application::retry::{RetryPolicy, with_retry};
use crate::domain::IncidentSummary;
use crate::domain::incident::ListingPayload;
use crate::infrastructure::browser::BrowserPage;
use crate::infrastructure::config::{AppConfig, PaginationKind};
use crate::infrastructure::errors::ScrapeResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationMode {
    /// Degraded mode: the first page only.
    FirstPageOnly,
    AllPages { max_pages: u32 },
}

impl PaginationMode {
    const fn page_after(self, number: u32) -> Option<u32> {
        match self {
            Self::FirstPageOnly => None,
            Self::AllPages { max_pages } if number < max_pages => Some(number + 1),
            Self::AllPages { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListingConfig {
    pub list_url: String,
    pub listing_api: String,
    pub excluded_fragments: Vec<String>,
    /// Page-N control selector, `{n}` is the page number.
    pub page_button: String,
    pub pagination: PaginationMode,
    pub response_timeout: Duration,
    pub retry: RetryPolicy,
}

impl ListingConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let pagination = match config.listing.pagination {
            PaginationKind::FirstPageOnly => PaginationMode::FirstPageOnly,
            PaginationKind::AllPages => PaginationMode::AllPages {
                max_pages: config.listing.max_pages,
            },
        };
        Self {
            list_url: config.target.list_url.clone(),
            listing_api: config.target.listing_api.clone(),
            excluded_fragments: config.target.excluded_fragments.clone(),
            page_button: config.selectors.page_button.clone(),
            pagination,
            response_timeout: config.timeouts.response(),
            retry: config.retry.listing.into(),
        }
    }

    fn page_button_for(&self, number: u32) -> String {
        self.page_button.replace("{n}", &number.to_string())
    }
}

pub struct ListTraversal {
    page: Arc<dyn BrowserPage>,
    config: ListingConfig,
    matcher: ResponseMatcher,
}

impl ListTraversal {
    pub fn new(page: Arc<dyn BrowserPage>, config: ListingConfig, matcher: ResponseMatcher) -> Self {
        Self {
            page,
            config,
            matcher,
        }
    }

    /// Master-listing response: 200 from the listing API, not a comments or contact call.
    pub fn listing_predicate(&self) -> ResponsePredicate {
        ResponsePredicate::url_contains(self.config.listing_api.clone())
            .with_status(200)
            .excluding(self.config.excluded_fragments.iter().cloned())
    }

    /// Lazy, finite stream of per-page summaries.
    ///
    /// A first-page failure is yielded as an error and ends the stream; a
    /// later failure ends it quietly, keeping what was already yielded.
    pub fn pages(&self) -> impl Stream<Item = ScrapeResult<Vec<IncidentSummary>>> + '_ {
        stream::unfold(Some(1_u32), move |cursor| async move {
            let number = cursor?;
            match self.next_page(number).await {
                Ok(Some(incidents)) => {
                    Some((Ok(incidents), self.config.pagination.page_after(number)))
                }
                Ok(None) => None,
                Err(e) if number == 1 => Some((Err(e), None)),
                Err(e) => {
                    warn!("⚠️ Stopping pagination at page {}: {}", number, e);
                    None
                }
            }
        })
    }

    /// Flattened summaries in listing order.
    pub fn fetch_listing(&self) -> impl Stream<Item = ScrapeResult<IncidentSummary>> + '_ {
        self.pages().flat_map(|page| {
            stream::iter(match page {
                Ok(incidents) => incidents.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(e)],
            })
        })
    }

    /// Whole listing, first occurrence of each incident id only.
    ///
    /// Incidents can shift across page boundaries while the traversal runs,
    /// so the same id may be listed twice.
    pub async fn collect_listing(&self) -> ScrapeResult<Vec<IncidentSummary>> {
        let mut seen = HashSet::new();
        let incidents: Vec<IncidentSummary> = self
            .fetch_listing()
            .try_filter(|incident| {
                let first = seen.insert(incident.incident_id.clone());
                if !first {
                    warn!("⚠️ Incident {} listed again, keeping the first entry", incident.incident_id);
                }
                future::ready(first)
            })
            .try_collect()
            .await?;
        info!("📋 Total incidents found: {}", incidents.len());
        Ok(incidents)
    }

    async fn next_page(&self, number: u32) -> ScrapeResult<Option<Vec<IncidentSummary>>> {
        let label = format!("listing page {number}");
        if number == 1 {
            let incidents = with_retry(self.config.retry, &label, || self.capture_first_page()).await?;
            return Ok(Some(incidents));
        }

        let selector = self.config.page_button_for(number);
        if !self.page.exists(&selector).await? {
            debug!("No control for page {}, pagination complete", number);
            return Ok(None);
        }
        let incidents =
            with_retry(self.config.retry, &label, || self.capture_page(number, &selector)).await?;
        Ok(Some(incidents))
    }

    async fn capture_first_page(&self) -> ScrapeResult<Vec<IncidentSummary>> {
        debug!("Navigating to list URL {}", self.config.list_url);
        let captured = self
            .matcher
            .trigger_and_wait(
                self.listing_predicate(),
                self.config.response_timeout,
                self.page.navigate(&self.config.list_url),
            )
            .await?;
        let incidents = summaries_from(&captured, 1)?;
        info!("Found {} incidents on page 1 ({})", incidents.len(), captured.response.url);
        Ok(incidents)
    }

    async fn capture_page(&self, number: u32, selector: &str) -> ScrapeResult<Vec<IncidentSummary>> {
        let captured = self
            .matcher
            .trigger_and_wait(
                self.listing_predicate(),
                self.config.response_timeout,
                self.page.click(selector),
            )
            .await?;
        let incidents = summaries_from(&captured, number)?;
        info!("Found {} incidents on page {}", incidents.len(), number);
        Ok(incidents)
    }
}

/// Readable entries of one listing page; unreadable ones are logged and dropped.
fn summaries_from(captured: &CapturedResponse, number: u32) -> ScrapeResult<Vec<IncidentSummary>> {
    let (incidents, rejected) = captured.decode::<ListingPayload>()?.into_summaries();
    for entry in rejected {
        warn!(
            page = number,
            index = entry.index,
            "⚠️ Skipping unreadable listing entry: {}",
            entry.reason
        );
    }
    Ok(incidents)
}
