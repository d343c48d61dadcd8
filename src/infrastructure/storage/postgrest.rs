//! PostgREST (Supabase) sink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, info};

use super::{SyncWriter, UpsertReport};
use crate::domain::NormalizedRow;
use crate::infrastructure::config::StorageConfig;
use crate::infrastructure::errors::{ScrapeError, ScrapeResult};

const PREFER_MERGE: &str = "resolution=merge-duplicates,return=minimal";

pub struct PostgrestWriter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl PostgrestWriter {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        table: impl Into<String>,
        timeout: Duration,
    ) -> ScrapeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScrapeError::storage(format!("failed to build HTTP client: {e}"), None))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            table: table.into(),
        })
    }

    pub fn from_config(config: &StorageConfig) -> ScrapeResult<Self> {
        let (Some(url), Some(key)) = (config.url.as_deref(), config.key.as_deref()) else {
            return Err(ScrapeError::Configuration {
                message: "Missing SUPABASE_URL or SUPABASE_KEY".to_string(),
            });
        };
        Self::new(
            url,
            key,
            config.table.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    pub fn endpoint(&self, conflict_key: &str) -> String {
        format!(
            "{}/rest/v1/{}?on_conflict={}",
            self.base_url, self.table, conflict_key
        )
    }

    fn headers(&self) -> ScrapeResult<HeaderMap> {
        let invalid = |e: reqwest::header::InvalidHeaderValue| {
            ScrapeError::Configuration {
                message: format!("API key is not a valid header value: {e}"),
            }
        };
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&self.api_key).map_err(invalid)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(invalid)?,
        );
        headers.insert("Prefer", HeaderValue::from_static(PREFER_MERGE));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// The upsert request, without sending it.
    pub fn build_request(
        &self,
        rows: &[NormalizedRow],
        conflict_key: &str,
    ) -> ScrapeResult<reqwest::Request> {
        self.client
            .post(self.endpoint(conflict_key))
            .headers(self.headers()?)
            .json(rows)
            .build()
            .map_err(|e| ScrapeError::storage(format!("failed to build upsert request: {e}"), None))
    }
}

/// Map a PostgREST reply to success or a storage failure.
pub fn check_status(status: reqwest::StatusCode, body: &str) -> ScrapeResult<()> {
    if status.is_success() {
        return Ok(());
    }
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", body.trim())
    };
    Err(ScrapeError::storage(detail, Some(status.as_u16())))
}

#[async_trait]
impl SyncWriter for PostgrestWriter {
    fn name(&self) -> &'static str {
        "postgrest"
    }

    async fn batch_upsert(
        &self,
        rows: &[NormalizedRow],
        conflict_key: &str,
    ) -> ScrapeResult<UpsertReport> {
        if rows.is_empty() {
            return Ok(UpsertReport::default());
        }

        let request = self.build_request(rows, conflict_key)?;
        debug!(url = %request.url(), rows = rows.len(), "posting upsert batch");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| ScrapeError::storage(format!("upsert request failed: {e}"), None))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        check_status(status, &body)?;

        info!("💾 Upserted {} rows into {}", rows.len(), self.table);
        Ok(UpsertReport { rows: rows.len() })
    }
}
