//! Sync writers: idempotent batch upsert of normalized rows.

pub mod postgrest;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::NormalizedRow;
use crate::infrastructure::config::{StorageConfig, StorageKind};
use crate::infrastructure::errors::{ScrapeError, ScrapeResult};

pub use postgrest::PostgrestWriter;
pub use sqlite::SqliteWriter;

/// Storage column order shared by every sink.
pub const COLUMNS: &[&str] = &[
    "incident_id",
    "preset_label",
    "incident_type",
    "structure_type",
    "address",
    "street_address",
    "city",
    "state",
    "zipcode",
    "county",
    "latitude",
    "longitude",
    "reported_at",
    "sla_due",
    "ai_score",
    "assigned_agent",
    "contractor",
    "commission_pct",
    "owner_name",
    "phone",
    "damage_description",
    "family_note",
    "description",
    "stage",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertReport {
    pub rows: usize,
}

/// Insert-or-replace keyed by `conflict_key`.
///
/// Upserting the same batch twice leaves storage unchanged.
#[async_trait]
pub trait SyncWriter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn batch_upsert(
        &self,
        rows: &[NormalizedRow],
        conflict_key: &str,
    ) -> ScrapeResult<UpsertReport>;
}

/// Build the writer selected by `storage.kind`.
pub async fn writer_from_config(config: &StorageConfig) -> ScrapeResult<Arc<dyn SyncWriter>> {
    match config.kind {
        StorageKind::Postgrest => Ok(Arc::new(PostgrestWriter::from_config(config)?)),
        StorageKind::Sqlite => {
            let path = config
                .sqlite_path_or_default()
                .map_err(|e| ScrapeError::Configuration {
                    message: e.to_string(),
                })?;
            Ok(Arc::new(SqliteWriter::open(&path, &config.table).await?))
        }
    }
}
