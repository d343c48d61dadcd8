//! Incident entities captured from the target application's internal API.
//!
//! The structs in this module mirror the JSON shapes the application returns
//! (camelCase keys, mostly optional fields). They are decoded straight from the
//! intercepted response bodies and never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Stable incident identifier.
///
/// The listing endpoint has emitted the id both as a JSON string and as a
/// number; both decode to the same textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct IncidentId(String);

impl IncidentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IncidentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for IncidentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "incident id must be a string or number, got {other}"
            ))),
        }
    }
}

/// One entry of the master incident listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentSummary {
    #[serde(rename = "IncidentId")]
    pub incident_id: IncidentId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub preset_label: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub incident_type_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub structure_type_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address_raw: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub street_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub city_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub county_short_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub comment_count: Option<u32>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub paged: Option<bool>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub searchable_content: Option<String>,
}

impl IncidentSummary {
    /// Minimal summary, used by tests and fixtures.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            incident_id: IncidentId::new(id),
            preset_label: None,
            incident_type_name: None,
            structure_type_name: None,
            address_raw: None,
            street_address: None,
            city_name: None,
            county_short_name: None,
            latitude: None,
            longitude: None,
            created_at: None,
            comment_count: None,
            paged: None,
            searchable_content: None,
        }
    }
}

// Coordinates have shown up both as numbers and as numeric strings.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

// Text fields occasionally arrive as numbers (epoch `createdAt`, numeric labels).
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerInfo {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSale {
    #[serde(default)]
    pub buyer: Option<String>,
}

/// Property assessment attached to an incident.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentEntry {
    #[serde(default)]
    pub owner_info: Option<OwnerInfo>,
    #[serde(default)]
    pub last_sale: Option<LastSale>,
}

impl AssessmentEntry {
    pub fn owner_name(&self) -> Option<&str> {
        self.owner_info.as_ref()?.name.as_deref()
    }

    pub fn buyer(&self) -> Option<&str> {
        self.last_sale.as_ref()?.buyer.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentEntry {
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEntry {
    #[serde(default)]
    pub contact: Option<String>,
}

/// Detail collections correlated for one incident.
///
/// Each collection arrives from an independent response and may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentDetail {
    pub assessments: Vec<AssessmentEntry>,
    pub comments: Vec<CommentEntry>,
    pub contacts: Vec<ContactEntry>,
}

impl IncidentDetail {
    /// Comments rendered the way operators read them in logs: `[ text ]` per line.
    pub fn comments_digest(&self) -> String {
        self.comments
            .iter()
            .filter_map(|c| c.description.as_deref())
            .map(|d| format!("[ {d} ]\n"))
            .collect()
    }
}

// Response envelopes. Missing arrays decode as empty.

/// Listing envelope. Entries stay raw so one malformed incident is dropped
/// on its own instead of failing the whole page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingPayload {
    #[serde(default)]
    pub incidents: Vec<Value>,
}

/// A listing entry that could not be read as an [`IncidentSummary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEntry {
    /// Position within the page.
    pub index: usize,
    pub reason: String,
}

impl ListingPayload {
    /// Decode every entry independently, in listing order.
    pub fn into_summaries(self) -> (Vec<IncidentSummary>, Vec<RejectedEntry>) {
        let mut summaries = Vec::with_capacity(self.incidents.len());
        let mut rejected = Vec::new();
        for (index, entry) in self.incidents.into_iter().enumerate() {
            match serde_json::from_value::<IncidentSummary>(entry) {
                Ok(summary) => summaries.push(summary),
                Err(e) => rejected.push(RejectedEntry {
                    index,
                    reason: e.to_string(),
                }),
            }
        }
        (summaries, rejected)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssessmentPayload {
    #[serde(default)]
    pub assessments: Vec<AssessmentEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentsPayload {
    #[serde(default)]
    pub comments: Vec<CommentEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPayload {
    #[serde(default)]
    pub contact_notes: Vec<ContactEntry>,
}
