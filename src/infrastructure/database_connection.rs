// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        // Every in-memory connection is its own database, so keep a single one.
        let in_memory = db_path.starts_with(":memory:");
        if !in_memory && !Path::new(db_path).exists() {
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::File::create(db_path).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Open (creating if needed) the database file at `path`.
    pub async fn open_file(path: &Path) -> Result<Self> {
        Self::new(&format!("sqlite:{}", path.display())).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the incidents table for `table` when missing.
    pub async fn migrate(&self, table: &str) -> Result<()> {
        let create_incidents_sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                incident_id TEXT PRIMARY KEY,
                preset_label TEXT,
                incident_type TEXT,
                structure_type TEXT,
                address TEXT,
                street_address TEXT,
                city TEXT NOT NULL DEFAULT '',
                state TEXT NOT NULL DEFAULT '{state}',
                zipcode TEXT NOT NULL DEFAULT '',
                county TEXT,
                latitude TEXT,
                longitude TEXT,
                reported_at TEXT,
                sla_due TEXT,
                ai_score INTEGER NOT NULL,
                assigned_agent TEXT NOT NULL DEFAULT '',
                contractor TEXT NOT NULL DEFAULT '',
                commission_pct REAL,
                owner_name TEXT,
                phone TEXT,
                damage_description TEXT,
                family_note TEXT NOT NULL,
                description TEXT,
                stage TEXT NOT NULL,
                synced_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#,
            state = crate::domain::normalizer::DEFAULT_STATE,
        );

        let create_indexes_sql = format!(
            r#"CREATE INDEX IF NOT EXISTS "idx_{table}_reported_at" ON "{table}" (reported_at)"#
        );

        sqlx::query(&create_incidents_sql).execute(&self.pool).await?;
        sqlx::query(&create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::defaults;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection_creates_file() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("incidents.db");

        let db = DatabaseConnection::open_file(&db_path).await?;

        assert!(!db.pool().is_closed());
        assert!(db_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_migration() -> Result<()> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;
        db.migrate(defaults::TABLE).await?;
        // Idempotent
        db.migrate(defaults::TABLE).await?;

        let result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='incidents'")
            .fetch_optional(db.pool())
            .await?;

        assert!(result.is_some());
        Ok(())
    }
}
