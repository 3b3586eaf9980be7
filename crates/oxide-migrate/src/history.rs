//! Migration history tracking.
//!
//! This module manages the `oxide_migrations` table. The table is
//! append-only: rows are created and read, never updated or deleted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::any::Any;
use sqlx::AnyPool;
use sqlx::Row;

use crate::error::Result;

/// SQL to create the migrations history table.
pub const CREATE_MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS oxide_migrations (
    id BIGINT PRIMARY KEY,
    name TEXT NOT NULL,
    checksum TEXT NOT NULL,
    applied_at TEXT NOT NULL,
    status TEXT NOT NULL,
    statements_applied BIGINT NOT NULL
)
"#;

/// Outcome recorded for a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    /// Every statement took effect.
    Applied,
    /// A statement failed; see `statements_applied`.
    Failed,
}

impl MigrationStatus {
    /// Value stored in the `status` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "applied" => Ok(Self::Applied),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown migration status '{other}'")),
        }
    }
}

/// One row of the history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Migration version.
    pub id: i64,
    /// Migration name.
    pub name: String,
    /// SHA-256 of the forward SQL that was run.
    pub checksum: String,
    /// When the run finished.
    pub applied_at: DateTime<Utc>,
    /// Outcome.
    pub status: MigrationStatus,
    /// Statements that took effect.
    pub statements_applied: i64,
}

impl MigrationRecord {
    /// Returns `true` for an `applied` row.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.status == MigrationStatus::Applied
    }
}

/// Manages the migration history in the database.
///
/// The ledger is read into a plain `Vec<MigrationRecord>` that callers pass
/// into verification explicitly.
#[derive(Debug, Clone)]
pub struct MigrationHistory {
    pool: AnyPool,
}

impl MigrationHistory {
    /// Creates a new migration history manager.
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Ensures the migrations table exists.
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(CREATE_MIGRATIONS_TABLE_SQL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Every row, ordered by id.
    pub async fn records(&self) -> Result<Vec<MigrationRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, checksum, applied_at, status, statements_applied \
             FROM oxide_migrations ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let applied_at: String = row.try_get("applied_at")?;
            let status: String = row.try_get("status")?;
            records.push(MigrationRecord {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                checksum: row.try_get("checksum")?,
                applied_at: DateTime::parse_from_rfc3339(&applied_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                status: status.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))?,
                statements_applied: row.try_get("statements_applied")?,
            });
        }
        Ok(records)
    }

    /// Appends a row using the pool.
    pub async fn append(&self, record: &MigrationRecord) -> Result<()> {
        append(&self.pool, record).await
    }
}

/// Appends a row through any executor, so it can join a transaction.
pub(crate) async fn append<'e, E>(executor: E, record: &MigrationRecord) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Any>,
{
    sqlx::query(
        "INSERT INTO oxide_migrations \
         (id, name, checksum, applied_at, status, statements_applied) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(record.id)
    .bind(record.name.as_str())
    .bind(record.checksum.as_str())
    .bind(record.applied_at.to_rfc3339())
    .bind(record.status.as_str())
    .bind(record.statements_applied)
    .execute(executor)
    .await?;
    Ok(())
}
