//! End-to-end workflows.
//!
//! Each workflow ties the snapshot store, the differ, the runner and the
//! history together. The stored snapshot is only replaced after every
//! statement has been applied.

use std::path::{Path, PathBuf};

use chrono::Utc;
use oxide_schema::{Differ, MigrationDialect, SchemaDefinition, SchemaDiff, SchemaSnapshot};
use tracing::{info, warn};

use crate::artifact::{discover, next_version, MigrationArtifact};
use crate::error::{MigrateError, Result};
use crate::history::{MigrationHistory, MigrationRecord};
use crate::runner::{pending, verify, DryRun, MigrationRunner, StatusEntry};
use crate::storage::SnapshotStore;

/// A migrated database and the files that describe it.
pub struct Workflow<D: MigrationDialect> {
    runner: MigrationRunner<D>,
    history: MigrationHistory,
    store: SnapshotStore,
    migrations_dir: PathBuf,
    differ: Differ,
}

/// Result of `generate_and_apply`.
#[derive(Debug, Clone)]
pub struct GeneratedMigration {
    /// The written migration file.
    pub path: PathBuf,
    /// Its history record.
    pub record: MigrationRecord,
}

impl<D: MigrationDialect> Workflow<D> {
    /// Creates a workflow with default rename detection.
    pub fn new(
        runner: MigrationRunner<D>,
        history: MigrationHistory,
        store: SnapshotStore,
        migrations_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            history,
            store,
            migrations_dir: migrations_dir.into(),
            differ: Differ::default(),
        }
    }

    /// Uses `differ` for change detection.
    #[must_use]
    pub fn with_differ(mut self, differ: Differ) -> Self {
        self.differ = differ;
        self
    }

    /// Returns the runner.
    #[must_use]
    pub fn runner(&self) -> &MigrationRunner<D> {
        &self.runner
    }

    /// Returns the history.
    #[must_use]
    pub fn history(&self) -> &MigrationHistory {
        &self.history
    }

    /// Returns the snapshot store.
    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Returns the migrations directory.
    #[must_use]
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Creates the history table and the migrations directory.
    pub async fn init(&self) -> Result<()> {
        self.history.ensure_table().await?;
        std::fs::create_dir_all(&self.migrations_dir)?;
        Ok(())
    }

    /// Builds the snapshot of `schema` and diffs it against the stored one.
    pub fn diff(&self, schema: &SchemaDefinition) -> Result<(SchemaSnapshot, SchemaDiff)> {
        let current = SchemaSnapshot::build(schema)?;
        let previous = self.store.load_or_empty()?;
        let diff = self.differ.compute(&previous, &current);
        Ok((current, diff))
    }

    /// Previews the migration `schema` would produce.
    pub fn preview(&self, schema: &SchemaDefinition) -> Result<DryRun> {
        let (_, diff) = self.diff(schema)?;
        self.runner.dry_run(&diff)
    }

    /// Writes a migration for the changes in `schema` and applies it.
    ///
    /// Returns `None` when nothing changed: no file, no history row and no
    /// snapshot rewrite.
    pub async fn generate_and_apply(
        &self,
        schema: &SchemaDefinition,
        name: &str,
    ) -> Result<Option<GeneratedMigration>> {
        let (current, diff) = self.diff(schema)?;
        if !diff.has_changes {
            info!("No schema changes detected");
            return Ok(None);
        }

        let mut plan = self.runner.plan(&diff)?;
        let (version, known) = self.ready_version().await?;
        let mut artifact = plan.artifact(version, name)?;
        let path = artifact.write(&self.migrations_dir)?;
        info!(
            path = %path.display(),
            operations = diff.operations.len(),
            "Created migration"
        );

        let record = self.runner.apply(&self.history, &known, &artifact).await?;
        self.store.save(&current)?;
        Ok(Some(GeneratedMigration { path, record }))
    }

    /// Applies the changes in `schema` without writing a migration file.
    ///
    /// The history row is named `push_<version>`.
    pub async fn push(&self, schema: &SchemaDefinition) -> Result<Option<MigrationRecord>> {
        let (current, diff) = self.diff(schema)?;
        if !diff.has_changes {
            info!("No schema changes detected");
            return Ok(None);
        }

        let mut plan = self.runner.plan(&diff)?;
        let (version, known) = self.ready_version().await?;
        let artifact = plan.artifact(version, &format!("push_{version}"))?;
        info!(version, operations = diff.operations.len(), "Pushing schema");

        let record = self.runner.apply(&self.history, &known, &artifact).await?;
        self.store.save(&current)?;
        Ok(Some(record))
    }

    /// Applies every pending migration file in order.
    ///
    /// When `schema` is given and at least one migration ran, its snapshot
    /// becomes the stored one. With nothing applied, a `schema` that differs
    /// from the stored snapshot is refused: no migration carries its changes.
    pub async fn apply_pending(
        &self,
        schema: Option<&SchemaDefinition>,
    ) -> Result<Vec<MigrationRecord>> {
        let current = schema.map(SchemaSnapshot::build).transpose()?;
        let artifacts = discover(&self.migrations_dir)?;
        let applied = self.runner.migrate(&self.history, &artifacts).await?;
        info!(count = applied.len(), "Applied pending migrations");

        let Some(current) = current else {
            return Ok(applied);
        };
        let stored = self.store.load_or_empty()?;
        if stored == current {
            return Ok(applied);
        }
        if applied.is_empty() {
            let diff = self.differ.compute(&stored, &current);
            if diff.has_changes {
                warn!(
                    operations = diff.operations.len(),
                    "Schema differs from the stored snapshot but no migration ran"
                );
                return Err(MigrateError::SchemaNotApplied {
                    operations: diff.operations.len(),
                });
            }
        }
        self.store.save(&current)?;
        Ok(applied)
    }

    /// Pending, applied and failed migrations.
    pub async fn status(&self) -> Result<Vec<StatusEntry>> {
        let artifacts = discover(&self.migrations_dir)?;
        self.runner.status(&self.history, &artifacts).await
    }

    /// Verifies the history and returns a version for a new migration along
    /// with the migration files on disk.
    ///
    /// Refuses while older migration files are unapplied: the stored
    /// snapshot doesn't include them yet.
    async fn ready_version(&self) -> Result<(i64, Vec<MigrationArtifact>)> {
        let artifacts = discover(&self.migrations_dir)?;
        self.history.ensure_table().await?;
        let ledger = self.history.records().await?;
        verify(&ledger, &artifacts)?;

        let waiting = pending(&ledger, &artifacts);
        if !waiting.is_empty() {
            return Err(MigrateError::PendingMigrations(
                waiting.iter().map(|a| a.id()).collect(),
            ));
        }

        let version = next_version(
            Utc::now(),
            artifacts
                .iter()
                .map(|a| a.version)
                .chain(ledger.iter().map(|r| r.id)),
        );
        Ok((version, artifacts))
    }
}

impl<D: MigrationDialect> std::fmt::Debug for Workflow<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("dialect", &self.runner.dialect().name())
            .field("store", &self.store)
            .field("migrations_dir", &self.migrations_dir)
            .finish_non_exhaustive()
    }
}

