//! Application layer module
//!
//! The extraction core: response correlation, retries, the login state
//! machine, listing and detail capture, and the pipeline that ties them
//! together. Everything here talks to the browser through
//! [`crate::infrastructure::browser::BrowserPage`].

pub mod detail;
pub mod listing;
pub mod pipeline;
pub mod response_matcher;
pub mod retry;
pub mod session;

pub use detail::{DetailConfig, DetailCorrelator};
pub use listing::{ListTraversal, ListingConfig, PaginationMode};
pub use pipeline::{RunSummary, SkippedIncident, SyncPipeline, run_with_browser};
pub use response_matcher::{ArmedResponse, CapturedResponse, ResponseMatcher, ResponsePredicate};
pub use retry::{RetryPolicy, StepOutcome, StepPolicy, apply_step_policy, with_retry, with_retry_when};
pub use session::{LoginConfig, SessionManager};
