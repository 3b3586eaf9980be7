//! Snapshot-driven database migrations.
//!
//! `oxide-migrate` turns schema changes into checksummed SQL migration files
//! and applies them with an append-only history:
//!
//! - the last applied [`SchemaSnapshot`](oxide_schema::SchemaSnapshot) is kept
//!   on disk by the [`SnapshotStore`](storage::SnapshotStore)
//! - a new schema is diffed against it and planned by the
//!   [`MigrationRunner`](runner::MigrationRunner), which refuses destructive
//!   changes under a production [`Policy`](policy::Policy)
//! - the forward SQL is written as a [`MigrationArtifact`](artifact::MigrationArtifact)
//!   and applied after the history has been verified for drift and
//!   out-of-order files
//!
//! # Example
//!
//! ```rust,no_run
//! use oxide_migrate::prelude::*;
//! use oxide_schema::{ColumnDefinition, SchemaDefinition, SqliteDialect, TableDefinition};
//! use sqlx::any::AnyPoolOptions;
//!
//! # async fn run() -> oxide_migrate::error::Result<()> {
//! sqlx::any::install_default_drivers();
//! let pool = AnyPoolOptions::new().connect("sqlite:app.db").await?;
//!
//! let workflow = Workflow::new(
//!     MigrationRunner::new(SqliteDialect::new(), Policy::Development),
//!     MigrationHistory::new(pool),
//!     SnapshotStore::new("schema.snapshot.json"),
//!     "migrations",
//! );
//!
//! let schema = SchemaDefinition::new().table(
//!     TableDefinition::new("accounts")
//!         .column(ColumnDefinition::new("id", "uuid").primary_key())
//!         .column(ColumnDefinition::new("label", "text").unique()),
//! );
//! workflow.generate_and_apply(&schema, "create accounts").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Write and apply a migration for the current schema
//! oxide-migrate generate --schema schema.json --name add_accounts
//!
//! # Apply pending migration files
//! oxide-migrate migrate
//!
//! # Apply the schema directly (development)
//! oxide-migrate push --schema schema.json
//!
//! # Show migration status
//! oxide-migrate status
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod history;
pub mod policy;
pub mod runner;
pub mod storage;
pub mod workflow;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::artifact::{discover, MigrationArtifact};
    pub use crate::config::MigrateConfig;
    pub use crate::error::{MigrateError, Result};
    pub use crate::history::{MigrationHistory, MigrationRecord, MigrationStatus};
    pub use crate::policy::{classify, destructive_changes, Classification, Policy};
    pub use crate::runner::{
        DryRun, MigrationPlan, MigrationRunner, MigrationState, RunnerOptions, StatusEntry,
    };
    pub use crate::storage::SnapshotStore;
    pub use crate::workflow::{GeneratedMigration, Workflow};
}
