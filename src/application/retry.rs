//! Retry orchestrator
//!
//! One fixed-delay retry decorator, applied at login, page-capture,
//! per-incident and contact-step granularity, plus the degrade policy for
//! optional steps.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::infrastructure::config::RetrySettings;
use crate::infrastructure::errors::{ScrapeError, ScrapeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run once, never retry.
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(2000))
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self::new(settings.max_attempts, Duration::from_millis(settings.delay_ms))
    }
}

/// Run `step` until it succeeds or `policy.max_attempts` attempts have failed.
///
/// The last attempt's error is returned unchanged.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, step: F) -> ScrapeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ScrapeResult<T>>,
{
    with_retry_when(policy, label, |_| true, step).await
}

/// Like [`with_retry`], but errors for which `should_retry` is false are
/// surfaced immediately.
pub async fn with_retry_when<T, F, Fut, P>(
    policy: RetryPolicy,
    label: &str,
    should_retry: P,
    mut step: F,
) -> ScrapeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ScrapeResult<T>>,
    P: Fn(&ScrapeError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match step().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("✅ {} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(err) if attempt < max_attempts && should_retry(&err) => {
                warn!(
                    kind = err.kind(),
                    "🔄 {} attempt {}/{} failed: {}. Retrying in {:?}",
                    label,
                    attempt,
                    max_attempts,
                    err,
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(kind = err.kind(), "❌ {} failed after {} attempt(s): {}", label, attempt, err);
                return Err(err);
            }
        }
    }
}

/// Whether a step's failure may be replaced by an empty value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    Required,
    Degradable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<T> {
    Captured(T),
    Degraded { reason: String },
}

impl<T: Default> StepOutcome<T> {
    pub fn into_value_or_default(self) -> T {
        match self {
            Self::Captured(value) => value,
            Self::Degraded { .. } => T::default(),
        }
    }
}

impl<T> StepOutcome<T> {
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Only a correlation timeout of a degradable step degrades; anything else
/// propagates.
pub fn apply_step_policy<T>(policy: StepPolicy, result: ScrapeResult<T>) -> ScrapeResult<StepOutcome<T>> {
    match result {
        Ok(value) => Ok(StepOutcome::Captured(value)),
        Err(err) if policy == StepPolicy::Degradable && err.is_correlation_timeout() => {
            Ok(StepOutcome::Degraded {
                reason: err.to_string(),
            })
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn timeout_error() -> ScrapeError {
        ScrapeError::CorrelationTimeout {
            predicate: "url contains /api/incident/1/contact".into(),
            timeout: Duration::from_secs(15),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_is_returned() {
        let calls = AtomicU32::new(0);
        let value = with_retry(RetryPolicy::default(), "listing", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ScrapeError>(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let value = with_retry(RetryPolicy::default(), "login", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(timeout_error())
            } else {
                Ok("ok")
            }
        })
        .await
        .unwrap();
        assert_eq!(value, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two fixed delays between three attempts.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(4000) && elapsed < Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_error_is_returned_unchanged() {
        let calls = AtomicU32::new(0);
        let err = with_retry(RetryPolicy::default(), "detail", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ScrapeError::missing_ui_element(format!("Contact button #{n}")))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            ScrapeError::MissingUiElement { control } => assert_eq!(control, "Contact button #2"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_when_stops_on_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let err = with_retry_when(
            RetryPolicy::default(),
            "contact",
            ScrapeError::is_correlation_timeout,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ScrapeError::auth_failure("session expired"))
            },
        )
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), "auth_failure");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let _ = with_retry(RetryPolicy::new(0, Duration::from_secs(1)), "x", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(timeout_error())
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_degradable_timeout_yields_empty_collection() {
        let outcome = apply_step_policy::<Vec<u8>>(StepPolicy::Degradable, Err(timeout_error())).unwrap();
        assert!(outcome.is_degraded());
        assert!(outcome.into_value_or_default().is_empty());
    }

    #[test]
    fn test_required_timeout_fails() {
        let result = apply_step_policy::<Vec<u8>>(StepPolicy::Required, Err(timeout_error()));
        assert!(result.unwrap_err().is_correlation_timeout());
    }

    #[test]
    fn test_degradable_step_propagates_other_errors() {
        let result = apply_step_policy::<Vec<u8>>(
            StepPolicy::Degradable,
            Err(ScrapeError::missing_ui_element("Contact button")),
        );
        assert_eq!(result.unwrap_err().kind(), "missing_ui_element");
    }

    #[test]
    fn test_policy_from_settings() {
        let policy = RetryPolicy::from(RetrySettings {
            max_attempts: 5,
            delay_ms: 250,
        });
        assert_eq!(policy, RetryPolicy::new(5, Duration::from_millis(250)));
    }
}
