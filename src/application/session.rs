//! Session manager: login state machine against an unreliable sign-in UI.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::application::retry::{RetryPolicy, with_retry};
use crate::domain::{LoginSignal, SessionState};
use crate::infrastructure::browser::BrowserPage;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::errors::{ScrapeError, ScrapeResult};

/// Everything the login flow needs, resolved from [`AppConfig`].
#[derive(Clone)]
pub struct LoginConfig {
    pub sign_in_url: String,
    pub email: String,
    pub password: String,
    pub email_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    pub avatar_selector: String,
    pub pagination_selector: String,
    pub error_banner_selector: String,
    /// Budget for each credential input to appear.
    pub selector_timeout: Duration,
    /// Budget for a success signal after submitting.
    pub login_timeout: Duration,
    pub poll_interval: Duration,
}

impl LoginConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            sign_in_url: config.target.sign_in_url.clone(),
            email: config.credentials.email.clone(),
            password: config.credentials.password.clone(),
            email_selector: config.selectors.email_input.clone(),
            password_selector: config.selectors.password_input.clone(),
            submit_selector: config.selectors.submit_button.clone(),
            avatar_selector: config.selectors.avatar.clone(),
            pagination_selector: config.selectors.pagination.clone(),
            error_banner_selector: config.selectors.error_banner.clone(),
            selector_timeout: config.timeouts.selector(),
            login_timeout: config.timeouts.login(),
            poll_interval: config.timeouts.poll_interval(),
        }
    }
}

impl fmt::Debug for LoginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginConfig")
            .field("sign_in_url", &self.sign_in_url)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("login_timeout", &self.login_timeout)
            .finish_non_exhaustive()
    }
}

pub struct SessionManager {
    page: Arc<dyn BrowserPage>,
    config: LoginConfig,
    retry: RetryPolicy,
    state: watch::Sender<SessionState>,
}

impl SessionManager {
    pub fn new(page: Arc<dyn BrowserPage>, config: LoginConfig, retry: RetryPolicy) -> Self {
        let (state, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            page,
            config,
            retry,
            state,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Log in, retrying whole attempts. Ends `Authenticated` or `Failed`.
    pub async fn establish(&self) -> ScrapeResult<LoginSignal> {
        info!("🔐 Logging in as {}", self.config.email);
        let result = with_retry(self.retry, "login", || self.attempt()).await;
        match &result {
            Ok(signal) => {
                self.transition(SessionState::Authenticated);
                info!("✅ Login successful ({:?})", signal);
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                warn!("❌ Login failed: {}", e);
            }
        }
        result
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "session state");
        }
    }

    async fn attempt(&self) -> ScrapeResult<LoginSignal> {
        self.transition(SessionState::Unauthenticated);
        let result = self.submit_credentials_and_verify().await;
        if result.is_err() {
            self.transition(SessionState::Failed);
        }
        result
    }

    async fn submit_credentials_and_verify(&self) -> ScrapeResult<LoginSignal> {
        let cfg = &self.config;
        self.transition(SessionState::Authenticating);

        self.page.navigate(&cfg.sign_in_url).await?;
        debug!("Sign-in page loaded");

        self.page
            .wait_for_selector(&cfg.email_selector, cfg.selector_timeout)
            .await?;
        self.page.type_text(&cfg.email_selector, &cfg.email).await?;

        self.page
            .wait_for_selector(&cfg.password_selector, cfg.selector_timeout)
            .await?;
        self.page.type_text(&cfg.password_selector, &cfg.password).await?;

        self.page.click(&cfg.submit_selector).await?;
        debug!("Credentials submitted, waiting for a dashboard indicator");

        match tokio::time::timeout(cfg.login_timeout, self.race_login_signals()).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::auth_failure(format!(
                "no dashboard indicator within {:?}",
                cfg.login_timeout
            ))),
        }
    }

    /// First of: avatar, pagination, credential form gone. An error banner
    /// with text fails the race.
    async fn race_login_signals(&self) -> ScrapeResult<LoginSignal> {
        let cfg = &self.config;
        tokio::select! {
            biased;
            r = self.until_present(&cfg.avatar_selector) => r.map(|()| LoginSignal::AvatarVisible),
            r = self.until_present(&cfg.pagination_selector) => r.map(|()| LoginSignal::PaginationVisible),
            r = self.until_absent(&cfg.email_selector) => r.map(|()| LoginSignal::CredentialFormGone),
            e = self.error_banner() => Err(e),
        }
    }

    async fn until_present(&self, selector: &str) -> ScrapeResult<()> {
        while !self.page.exists(selector).await? {
            tokio::time::sleep(self.config.poll_interval).await;
        }
        Ok(())
    }

    async fn until_absent(&self, selector: &str) -> ScrapeResult<()> {
        while self.page.exists(selector).await? {
            tokio::time::sleep(self.config.poll_interval).await;
        }
        Ok(())
    }

    /// Resolves only with an error: the banner text, or a browser failure.
    async fn error_banner(&self) -> ScrapeError {
        loop {
            match self.page.text_content(&self.config.error_banner_selector).await {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    return ScrapeError::auth_failure(format!("Login error: {}", text.trim()));
                }
                Ok(_) => {}
                Err(e) => return e.into(),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
