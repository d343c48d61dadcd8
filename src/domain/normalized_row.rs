//! Fixed output schema written to storage.

use serde::{Deserialize, Serialize};

/// Column every upsert reconciles on.
pub const CONFLICT_KEY: &str = "incident_id";

/// Stage literal for rows ingested by this pipeline.
pub const STAGE_NEW_ALERT: &str = "New Alert";

pub const FAMILY_NOTE_PAGED: &str = "PAGED - Urgent Follow-Up";
pub const FAMILY_NOTE_NOT_PAGED: &str = "Not Paged";

/// Severity tiers derived from the comment count.
pub mod ai_score {
    pub const BASE: i32 = 60;
    pub const MID: i32 = 80;
    pub const TOP: i32 = 95;
}

/// One output row per successfully correlated incident.
///
/// Field names are the storage column names. Rows are built once by
/// [`crate::domain::normalizer::normalize`] and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub incident_id: String,
    pub preset_label: Option<String>,
    pub incident_type: Option<String>,
    pub structure_type: Option<String>,
    pub address: Option<String>,
    pub street_address: Option<String>,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    pub county: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub reported_at: Option<String>,
    pub sla_due: Option<String>,
    pub ai_score: i32,
    pub assigned_agent: String,
    pub contractor: String,
    pub commission_pct: Option<f64>,
    pub owner_name: Option<String>,
    pub phone: Option<String>,
    pub damage_description: Option<String>,
    pub family_note: String,
    pub description: Option<String>,
    pub stage: String,
}
