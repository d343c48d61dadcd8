//! Local SQLite sink.

use std::path::Path;

use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use super::{COLUMNS, SyncWriter, UpsertReport};
use crate::domain::{CONFLICT_KEY, NormalizedRow};
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::errors::{ScrapeError, ScrapeResult};

pub struct SqliteWriter {
    pool: SqlitePool,
    table: String,
    upsert_sql: String,
}

impl SqliteWriter {
    /// Open the database file at `path` and make sure `table` exists.
    pub async fn open(path: &Path, table: &str) -> ScrapeResult<Self> {
        let db = DatabaseConnection::open_file(path)
            .await
            .map_err(|e| ScrapeError::storage(format!("failed to open {}: {e}", path.display()), None))?;
        Self::with_connection(db, table).await
    }

    pub async fn with_connection(db: DatabaseConnection, table: &str) -> ScrapeResult<Self> {
        db.migrate(table)
            .await
            .map_err(|e| ScrapeError::storage(format!("failed to create table {table}: {e}"), None))?;
        Ok(Self {
            pool: db.pool().clone(),
            table: table.to_string(),
            upsert_sql: upsert_statement(table),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn upsert_row(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        row: &NormalizedRow,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(&self.upsert_sql)
            .bind(&row.incident_id)
            .bind(&row.preset_label)
            .bind(&row.incident_type)
            .bind(&row.structure_type)
            .bind(&row.address)
            .bind(&row.street_address)
            .bind(&row.city)
            .bind(&row.state)
            .bind(&row.zipcode)
            .bind(&row.county)
            .bind(&row.latitude)
            .bind(&row.longitude)
            .bind(&row.reported_at)
            .bind(&row.sla_due)
            .bind(row.ai_score)
            .bind(&row.assigned_agent)
            .bind(&row.contractor)
            .bind(row.commission_pct)
            .bind(&row.owner_name)
            .bind(&row.phone)
            .bind(&row.damage_description)
            .bind(&row.family_note)
            .bind(&row.description)
            .bind(&row.stage)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

/// `INSERT ... ON CONFLICT(incident_id) DO UPDATE` over every column.
pub fn upsert_statement(table: &str) -> String {
    let placeholders = vec!["?"; COLUMNS.len()].join(", ");
    let updates = COLUMNS
        .iter()
        .filter(|c| **c != CONFLICT_KEY)
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"INSERT INTO "{table}" ({columns}) VALUES ({placeholders})
           ON CONFLICT({CONFLICT_KEY}) DO UPDATE SET {updates}, synced_at = CURRENT_TIMESTAMP"#,
        columns = COLUMNS.join(", "),
    )
}

#[async_trait]
impl SyncWriter for SqliteWriter {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn batch_upsert(
        &self,
        rows: &[NormalizedRow],
        conflict_key: &str,
    ) -> ScrapeResult<UpsertReport> {
        // The table's primary key is the only conflict target.
        if conflict_key != CONFLICT_KEY {
            return Err(ScrapeError::storage(
                format!("unsupported conflict key '{conflict_key}'"),
                None,
            ));
        }
        if rows.is_empty() {
            return Ok(UpsertReport::default());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ScrapeError::storage(format!("Failed to begin transaction: {e}"), None))?;

        for row in rows {
            self.upsert_row(&mut tx, row).await.map_err(|e| {
                ScrapeError::storage(format!("Failed to upsert incident {}: {e}", row.incident_id), None)
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| ScrapeError::storage(format!("Failed to commit batch transaction: {e}"), None))?;

        info!("💾 Upserted {} rows into sqlite table {}", rows.len(), self.table);
        Ok(UpsertReport { rows: rows.len() })
    }
}
