//! Error types for the migration system.

use std::path::PathBuf;

use oxide_schema::{RenameConfigError, SnapshotDecodeError, SnapshotError, UnsupportedOperationError};

use crate::runner::MigrationState;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The schema definition could not be turned into a snapshot.
    #[error("Invalid schema: {0}")]
    Snapshot(#[from] SnapshotError),

    /// The target dialect has no mapping for an operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(#[from] UnsupportedOperationError),

    /// A recorded migration no longer matches its artifact.
    #[error(
        "Drift detected for migration {version} ('{name}'): {detail}; \
         reconcile the history manually before applying"
    )]
    Drift {
        /// Migration version.
        version: i64,
        /// Name recorded in the history.
        name: String,
        /// What differs.
        detail: String,
    },

    /// An older migration is still pending while newer ones are applied.
    #[error(
        "Migration {pending} ('{pending_name}') is pending but newer migration {applied} \
         ('{applied_name}') is already applied"
    )]
    OutOfOrder {
        /// Version of the unapplied migration.
        pending: i64,
        /// Name of the unapplied migration.
        pending_name: String,
        /// Newest applied version.
        applied: i64,
        /// Name of the newest applied migration.
        applied_name: String,
    },

    /// Destructive changes refused under production policy.
    #[error(
        "Refusing destructive changes under production policy (use --allow-destructive to override):\n{}",
        .changes.iter().map(|c| format!("  - {c}")).collect::<Vec<_>>().join("\n")
    )]
    BlockingChange {
        /// Human-readable description of each destructive operation.
        changes: Vec<String>,
    },

    /// The dialect cannot carry out part of the change; applying the rest
    /// would leave the database behind the recorded schema.
    #[error(
        "Manual intervention required before this change can be applied:\n{}",
        .diagnostics.iter().map(|d| format!("  - {d}")).collect::<Vec<_>>().join("\n")
    )]
    ManualIntervention {
        /// Reason of each manual-intervention entry.
        diagnostics: Vec<String>,
    },

    /// The supplied schema has changes no applied migration carries.
    #[error(
        "Schema has {operations} change(s) not covered by any applied migration; \
         generate a migration for them first"
    )]
    SchemaNotApplied {
        /// Number of diff operations between the stored and supplied schema.
        operations: usize,
    },

    /// A statement failed while applying a migration.
    #[error(
        "Migration {version} ('{name}') failed at statement {index} after {applied} \
         statement(s) succeeded: {reason}\n{statement}"
    )]
    StatementExecution {
        /// Migration version.
        version: i64,
        /// Migration name.
        name: String,
        /// 1-based position of the failing statement.
        index: usize,
        /// Number of statements that took effect.
        applied: usize,
        /// The failing SQL text.
        statement: String,
        /// Driver error or timeout, verbatim.
        reason: String,
    },

    /// A previous run left a failed history entry.
    #[error(
        "Migration {version} ('{name}') previously failed after {statements_applied} \
         statement(s); manual recovery is required"
    )]
    PreviouslyFailed {
        /// Migration version.
        version: i64,
        /// Migration name.
        name: String,
        /// Statements that took effect in the failed run.
        statements_applied: i64,
    },

    /// Migrations written earlier have not been applied yet.
    #[error("Pending migrations must be applied first: {}", .0.join(", "))]
    PendingMigrations(Vec<String>),

    /// Illegal migration state change.
    #[error("Invalid migration state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state.
        from: MigrationState,
        /// Requested state.
        to: MigrationState,
    },

    /// Failed to parse a migration file.
    #[error("Invalid migration file '{path}': {message}")]
    InvalidArtifact {
        /// Path to the migration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// Database error outside of migration statements.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading/writing migration or snapshot files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<SnapshotDecodeError> for MigrateError {
    fn from(err: SnapshotDecodeError) -> Self {
        match err {
            SnapshotDecodeError::Json(e) => Self::Serialization(e),
            SnapshotDecodeError::Snapshot(e) => Self::Snapshot(e),
        }
    }
}

impl From<RenameConfigError> for MigrateError {
    fn from(err: RenameConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
