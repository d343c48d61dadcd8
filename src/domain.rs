//! Domain module - incident entities, session states and the output schema
//!
//! Everything here is free of I/O: the entities decode from captured JSON,
//! the normalizer turns them into rows.

pub mod incident;
pub mod normalized_row;
pub mod normalizer;
pub mod session;

// Re-export commonly used items for convenience
pub use incident::{
    AssessmentEntry, CommentEntry, ContactEntry, IncidentDetail, IncidentId, IncidentSummary,
};
pub use normalized_row::{NormalizedRow, CONFLICT_KEY};
pub use normalizer::normalize;
pub use session::{LoginSignal, SessionState};
