//! Detail correlator: assessment, comments and contact for one incident.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::application::response_matcher::{ResponseMatcher, ResponsePredicate};
use crate::application::retry::{
    RetryPolicy, StepOutcome, StepPolicy, apply_step_policy, with_retry, with_retry_when,
};
use crate::domain::incident::{AssessmentPayload, CommentsPayload, ContactPayload};
use crate::domain::{ContactEntry, IncidentDetail, IncidentId};
use crate::infrastructure::browser::BrowserPage;
use crate::infrastructure::config::{AppConfig, TargetConfig};
use crate::infrastructure::errors::{ScrapeError, ScrapeResult};

#[derive(Debug, Clone)]
pub struct DetailConfig {
    pub target: TargetConfig,
    pub contact_button_text: String,
    pub contact_badge: String,
    pub response_timeout: Duration,
    pub contact_timeout: Duration,
    /// Whole-incident retry.
    pub retry: RetryPolicy,
    /// Click-and-wait retry for the contact panel, timeouts only.
    pub contact_retry: RetryPolicy,
}

impl DetailConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            target: config.target.clone(),
            contact_button_text: config.selectors.contact_button_text.clone(),
            contact_badge: config.selectors.contact_badge.clone(),
            response_timeout: config.timeouts.response(),
            contact_timeout: config.timeouts.contact(),
            retry: config.retry.detail.into(),
            contact_retry: config.retry.contact.into(),
        }
    }
}

pub struct DetailCorrelator {
    page: Arc<dyn BrowserPage>,
    config: DetailConfig,
    matcher: ResponseMatcher,
}

impl DetailCorrelator {
    pub fn new(page: Arc<dyn BrowserPage>, config: DetailConfig, matcher: ResponseMatcher) -> Self {
        Self {
            page,
            config,
            matcher,
        }
    }

    pub fn assessment_predicate(&self, id: &IncidentId) -> ResponsePredicate {
        ResponsePredicate::url_contains(self.config.target.assessment_fragment(id.as_str()))
            .excluding(self.config.target.excluded_fragments.iter().cloned())
    }

    pub fn comments_predicate(&self, id: &IncidentId) -> ResponsePredicate {
        ResponsePredicate::url_contains(self.config.target.comments_fragment(id.as_str()))
    }

    pub fn contact_predicate(&self, id: &IncidentId) -> ResponsePredicate {
        ResponsePredicate::url_contains(self.config.target.contact_fragment(id.as_str()))
            .with_method("GET")
            .with_status(200)
    }

    /// [`Self::fetch_detail`] under the per-incident retry policy.
    pub async fn fetch_detail_with_retry(&self, id: &IncidentId) -> ScrapeResult<IncidentDetail> {
        let label = format!("incident {id}");
        with_retry(self.config.retry, &label, || self.fetch_detail(id)).await
    }

    /// One attempt.
    pub async fn fetch_detail(&self, id: &IncidentId) -> ScrapeResult<IncidentDetail> {
        let timeout = self.config.response_timeout;
        let assessment = self.matcher.arm(self.assessment_predicate(id), timeout);
        let comments = self.matcher.arm(self.comments_predicate(id), timeout);

        let detail_url = self.config.target.detail_url(id.as_str());
        debug!("Navigating to incident detail: {}", detail_url);

        let (_, assessment, comments) = tokio::try_join!(
            async { self.page.navigate(&detail_url).await.map_err(ScrapeError::from) },
            assessment.wait(),
            comments.wait(),
        )?;

        let assessments = apply_step_policy(StepPolicy::Required, assessment.decode::<AssessmentPayload>())?
            .into_value_or_default()
            .assessments;
        let comments = apply_step_policy(StepPolicy::Required, comments.decode::<CommentsPayload>())?
            .into_value_or_default()
            .comments;

        let contacts = match self.fetch_contacts(id).await? {
            StepOutcome::Captured(contacts) => contacts,
            StepOutcome::Degraded { reason } => {
                warn!("⚠️ Contact panel for {} degraded to empty: {}", id, reason);
                Vec::new()
            }
        };

        let detail = IncidentDetail {
            assessments,
            comments,
            contacts,
        };
        debug!("Full comments for {}:\n{}", id, detail.comments_digest());
        info!(
            "Detail captured for {} ({} assessments, {} comments, {} contacts)",
            id,
            detail.assessments.len(),
            detail.comments.len(),
            detail.contacts.len()
        );
        Ok(detail)
    }

    async fn fetch_contacts(&self, id: &IncidentId) -> ScrapeResult<StepOutcome<Vec<ContactEntry>>> {
        let label = format!("contact panel {id}");
        let result = with_retry_when(
            self.config.contact_retry,
            &label,
            ScrapeError::is_correlation_timeout,
            || self.open_contact_panel(id),
        )
        .await;
        apply_step_policy(StepPolicy::Degradable, result)
    }

    async fn open_contact_panel(&self, id: &IncidentId) -> ScrapeResult<Vec<ContactEntry>> {
        let armed = self
            .matcher
            .arm(self.contact_predicate(id), self.config.contact_timeout);

        let clicked = self
            .page
            .click_button_with_badge(&self.config.contact_button_text, &self.config.contact_badge)
            .await?;
        if !clicked {
            return Err(ScrapeError::missing_ui_element(format!(
                "{} button",
                self.config.contact_button_text
            )));
        }
        debug!("Contact button clicked for {}", id);

        let captured = armed.wait().await?;
        Ok(captured.decode::<ContactPayload>()?.contact_notes)
    }
}
