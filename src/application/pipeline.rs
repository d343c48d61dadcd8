//! Sync pipeline: session → listing → per-incident detail → normalize → upsert.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::detail::{DetailConfig, DetailCorrelator};
use crate::application::listing::{ListTraversal, ListingConfig};
use crate::application::response_matcher::ResponseMatcher;
use crate::application::session::{LoginConfig, SessionManager};
use crate::domain::{CONFLICT_KEY, NormalizedRow, SessionState, normalize};
use crate::infrastructure::browser::{BrowserPage, BrowserSession};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::errors::ScrapeResult;
use crate::infrastructure::storage::SyncWriter;

/// Characters of page content logged when a run aborts.
pub const ERROR_CONTENT_PREVIEW: usize = 1000;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedIncident {
    pub incident_id: String,
    pub reason: String,
}

/// Outcome of one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub listed: usize,
    pub normalized: usize,
    pub written: usize,
    pub skipped: Vec<SkippedIncident>,
    pub storage_error: Option<String>,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            listed = self.listed,
            normalized = self.normalized,
            written = self.written,
            skipped = self.skipped.len(),
            "📊 Run finished in {}s",
            (self.finished_at - self.started_at).num_seconds()
        );
        for skipped in &self.skipped {
            warn!("  skipped {}: {}", skipped.incident_id, skipped.reason);
        }
        if let Some(err) = &self.storage_error {
            error!("  storage error: {}", err);
        }
    }
}

pub struct SyncPipeline {
    page: Arc<dyn BrowserPage>,
    session: SessionManager,
    listing: ListTraversal,
    detail: DetailCorrelator,
    /// `None` runs dry: rows are logged instead of written.
    writer: Option<Arc<dyn SyncWriter>>,
    screenshot_path: Option<PathBuf>,
}

impl SyncPipeline {
    pub fn new(page: Arc<dyn BrowserPage>, config: &AppConfig, writer: Option<Arc<dyn SyncWriter>>) -> Self {
        let matcher = ResponseMatcher::new(Arc::clone(&page));
        let session = SessionManager::new(
            Arc::clone(&page),
            LoginConfig::from_app_config(config),
            config.retry.login.into(),
        );
        let listing = ListTraversal::new(
            Arc::clone(&page),
            ListingConfig::from_app_config(config),
            matcher.clone(),
        );
        let detail = DetailCorrelator::new(
            Arc::clone(&page),
            DetailConfig::from_app_config(config),
            matcher,
        );
        Self {
            page,
            session,
            listing,
            detail,
            writer,
            screenshot_path: config.browser.screenshot_path.clone(),
        }
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Run once. Session or first-page failures abort before any write.
    pub async fn run(&self) -> ScrapeResult<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "🚀 Starting incident sync");

        match self.run_stages(run_id, started_at).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!(%run_id, kind = e.kind(), "💥 Run aborted: {}", e);
                self.dump_diagnostics().await;
                Err(e)
            }
        }
    }

    async fn run_stages(&self, run_id: Uuid, started_at: DateTime<Utc>) -> ScrapeResult<RunSummary> {
        self.session.establish().await?;

        let incidents = self.listing.collect_listing().await?;

        let mut rows: Vec<NormalizedRow> = Vec::with_capacity(incidents.len());
        let mut skipped = Vec::new();
        for summary in &incidents {
            let id = &summary.incident_id;
            info!("Processing incident → {}", id);
            match self.detail.fetch_detail_with_retry(id).await {
                Ok(detail) => rows.push(normalize(summary, &detail)),
                Err(e) => {
                    warn!(kind = e.kind(), "⏭️ Skipping incident {}: {}", id, e);
                    skipped.push(SkippedIncident {
                        incident_id: id.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let (written, storage_error) = self.write_rows(&rows).await;

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            listed: incidents.len(),
            normalized: rows.len(),
            written,
            skipped,
            storage_error,
            dry_run: self.writer.is_none(),
        })
    }

    async fn write_rows(&self, rows: &[NormalizedRow]) -> (usize, Option<String>) {
        if rows.is_empty() {
            info!("No rows to upsert");
            return (0, None);
        }

        let Some(writer) = &self.writer else {
            info!("🧪 Dry run: {} rows normalized, nothing written", rows.len());
            for row in rows {
                match serde_json::to_string(row) {
                    Ok(json) => info!("{}", json),
                    Err(e) => warn!("Failed to render row {}: {}", row.incident_id, e),
                }
            }
            return (0, None);
        };

        info!("Upserting {} rows via {}...", rows.len(), writer.name());
        match writer.batch_upsert(rows, CONFLICT_KEY).await {
            Ok(report) => (report.rows, None),
            Err(e) => {
                error!(kind = e.kind(), "Storage error: {}", e);
                (0, Some(e.to_string()))
            }
        }
    }

    async fn dump_diagnostics(&self) {
        match self.page.content().await {
            Ok(content) => {
                let preview: String = content.chars().take(ERROR_CONTENT_PREVIEW).collect();
                error!("Page content on error: {}", preview);
            }
            Err(e) => warn!("Could not read page content: {}", e),
        }

        let Some(path) = &self.screenshot_path else {
            return;
        };
        match self.page.screenshot().await {
            Ok(png) => match tokio::fs::write(path, png).await {
                Ok(()) => info!("📸 Error screenshot written to {:?}", path),
                Err(e) => warn!("Failed to write screenshot {:?}: {}", path, e),
            },
            Err(e) => warn!("Could not capture screenshot: {}", e),
        }
    }
}

/// Run the pipeline on `browser`, closing it on every exit path.
pub async fn run_with_browser(
    browser: BrowserSession,
    config: &AppConfig,
    writer: Option<Arc<dyn SyncWriter>>,
) -> ScrapeResult<RunSummary> {
    let pipeline = SyncPipeline::new(browser.page(), config, writer);
    let result = pipeline.run().await;
    drop(pipeline);
    info!("Closing browser...");
    browser.close().await;
    result
}
