//! Row normalizer: listing metadata + correlated detail → [`NormalizedRow`].
//!
//! Pure and total. Every field falls back to `None`/empty instead of failing,
//! and identical inputs always produce identical rows.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::incident::{IncidentDetail, IncidentSummary};
use crate::domain::normalized_row::{
    ai_score, NormalizedRow, FAMILY_NOTE_NOT_PAGED, FAMILY_NOTE_PAGED, STAGE_NEW_ALERT,
};

/// State literal; the target application only serves one state.
pub const DEFAULT_STATE: &str = "AZ";

pub const DAMAGE_DESCRIPTION_LEN: usize = 300;
pub const DESCRIPTION_LEN: usize = 500;

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{3}[-.\s]?\d{3}[-.\s]?\d{4}").expect("phone pattern compiles"));

static CONTACT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[CONTACT\][^/]+/([^/]+)").expect("contact marker compiles"));

/// Build the output row for one incident.
pub fn normalize(summary: &IncidentSummary, detail: &IncidentDetail) -> NormalizedRow {
    let content = non_empty(summary.searchable_content.as_deref());
    let (city, zipcode) = split_address(
        summary.address_raw.as_deref().unwrap_or_default(),
        summary.city_name.as_deref(),
    );

    NormalizedRow {
        incident_id: summary.incident_id.to_string(),
        preset_label: non_empty(summary.preset_label.as_deref()),
        incident_type: non_empty(summary.incident_type_name.as_deref()),
        structure_type: non_empty(summary.structure_type_name.as_deref()),
        address: non_empty(summary.address_raw.as_deref()),
        street_address: non_empty(summary.street_address.as_deref()),
        city,
        state: DEFAULT_STATE.to_string(),
        zipcode,
        county: non_empty(summary.county_short_name.as_deref()),
        latitude: render_coordinate(summary.latitude),
        longitude: render_coordinate(summary.longitude),
        reported_at: non_empty(summary.created_at.as_deref()),
        sla_due: None,
        ai_score: severity_score(summary.comment_count.unwrap_or(0)),
        assigned_agent: String::new(),
        contractor: String::new(),
        commission_pct: None,
        owner_name: extract_owner_name(content.as_deref(), detail),
        phone: extract_phone(content.as_deref(), detail),
        damage_description: content.as_deref().map(|c| truncate_chars(c, DAMAGE_DESCRIPTION_LEN)),
        family_note: if summary.paged.unwrap_or(false) {
            FAMILY_NOTE_PAGED
        } else {
            FAMILY_NOTE_NOT_PAGED
        }
        .to_string(),
        description: content.as_deref().map(|c| truncate_chars(c, DESCRIPTION_LEN)),
        stage: STAGE_NEW_ALERT.to_string(),
    }
}

/// Split `"street, city, ST zip"` into `(city, zip)`.
///
/// An explicit city wins over the second segment. The zip is the second
/// space-separated token of the third segment.
pub fn split_address(address_raw: &str, explicit_city: Option<&str>) -> (String, String) {
    let parts: Vec<&str> = address_raw.split(", ").collect();

    let city = explicit_city
        .filter(|c| !c.is_empty())
        .or_else(|| parts.get(1).copied())
        .unwrap_or_default()
        .to_string();

    let zipcode = parts
        .get(2)
        .and_then(|segment| segment.split(' ').nth(1))
        .unwrap_or_default()
        .to_string();

    (city, zipcode)
}

/// 95 above three comments, 80 above one, 60 otherwise.
pub fn severity_score(comment_count: u32) -> i32 {
    if comment_count > 3 {
        ai_score::TOP
    } else if comment_count > 1 {
        ai_score::MID
    } else {
        ai_score::BASE
    }
}

/// Phone from the free text first, then from the first contact note.
pub fn extract_phone(content: Option<&str>, detail: &IncidentDetail) -> Option<String> {
    content
        .and_then(|c| PHONE_PATTERN.find(c))
        .or_else(|| {
            detail
                .contacts
                .first()
                .and_then(|entry| entry.contact.as_deref())
                .and_then(|contact| PHONE_PATTERN.find(contact))
        })
        .map(|m| m.as_str().to_string())
}

/// `"owner / buyer"` from the first assessment, else the `[CONTACT] .../name` marker.
pub fn extract_owner_name(content: Option<&str>, detail: &IncidentDetail) -> Option<String> {
    let from_assessment = detail.assessments.first().and_then(|entry| {
        let owner = entry.owner_name();
        let buyer = entry.buyer();
        if owner.is_none() && buyer.is_none() {
            return None;
        }
        Some(format!(
            "{} / {}",
            owner.unwrap_or_default(),
            buyer.unwrap_or_default()
        ))
    });

    from_assessment.or_else(|| {
        let captures = CONTACT_MARKER.captures(content?)?;
        non_empty(captures.get(1).map(|m| m.as_str().trim()))
    })
}

fn render_coordinate(value: Option<f64>) -> Option<String> {
    // A zero coordinate is how the application encodes "not geocoded".
    value.filter(|v| *v != 0.0).map(|v| v.to_string())
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}
