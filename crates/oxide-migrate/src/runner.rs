//! Migration runner.
//!
//! Plans migrations from diffs, verifies the history ledger against the
//! migration files, and applies forward SQL one statement at a time.

use std::time::Duration;

use chrono::{DateTime, Utc};
use oxide_schema::{generate, GeneratedSql, MigrationDialect, SchemaDiff, Statement};
use serde::{Deserialize, Serialize};
use sqlx::any::Any;
use tracing::{debug, error, info, warn};

use crate::artifact::MigrationArtifact;
use crate::error::{MigrateError, Result};
use crate::history::{self, MigrationHistory, MigrationRecord, MigrationStatus};
use crate::policy::{classify, destructive_changes, Classification, DestructiveChange, Policy};

// ---- state machine ----

/// Lifecycle of one migration.
///
/// `Proposed → Pending → Applying → Applied | Failed`. `Applied` and
/// `Failed` are terminal; a failed migration is recovered manually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    /// Diff computed and SQL generated.
    Proposed,
    /// Written out, not yet applied.
    Pending,
    /// Statements are running.
    Applying,
    /// Recorded as applied.
    Applied,
    /// Recorded as failed.
    Failed,
}

impl MigrationState {
    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Proposed, Self::Pending)
                | (Self::Pending, Self::Applying)
                | (Self::Applying, Self::Applied | Self::Failed)
        )
    }

    /// Moves to `next` or fails with `InvalidTransition`.
    pub fn transition(self, next: Self) -> Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(MigrateError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// `Applied` or `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::Failed)
    }
}

// ---- options and plans ----

/// Execution settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Force transactional (`true`) or sequential (`false`) execution.
    /// Defaults to what the dialect supports.
    pub transactional: Option<bool>,
    /// Per-statement time limit. Exceeding it is a statement failure.
    pub statement_timeout: Option<Duration>,
}

impl RunnerOptions {
    /// Overrides transactional execution.
    #[must_use]
    pub fn transactional(mut self, enabled: bool) -> Self {
        self.transactional = Some(enabled);
        self
    }

    /// Sets the per-statement timeout.
    #[must_use]
    pub fn statement_timeout(mut self, limit: Duration) -> Self {
        self.statement_timeout = Some(limit);
        self
    }
}

/// A diff that passed the policy gate, with its SQL.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// The diff.
    pub diff: SchemaDiff,
    /// Forward and reverse SQL.
    pub sql: GeneratedSql,
    /// Classification under the runner's policy.
    pub classification: Classification,
    /// Destructive operations (warned about under development policy).
    pub destructive: Vec<DestructiveChange>,
    dialect: &'static str,
    state: MigrationState,
}

impl MigrationPlan {
    /// Current state.
    #[must_use]
    pub const fn state(&self) -> MigrationState {
        self.state
    }

    /// Turns the plan into a migration artifact; the plan becomes `Pending`.
    pub fn artifact(&mut self, version: i64, name: &str) -> Result<MigrationArtifact> {
        self.state = self.state.transition(MigrationState::Pending)?;
        Ok(MigrationArtifact::from_generated(
            version,
            name,
            self.dialect,
            &self.sql,
        ))
    }
}

/// Preview of a diff; nothing is executed or refused.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DryRun {
    /// Forward statements.
    pub statements: Vec<Statement>,
    /// Reversal statements.
    pub reverse: Vec<Statement>,
    /// Manual-intervention reasons.
    pub diagnostics: Vec<String>,
    /// Classification under the runner's policy.
    pub classification: Classification,
    /// Destructive operations.
    pub destructive: Vec<DestructiveChange>,
}

/// One line of `status` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    /// Migration version.
    pub version: i64,
    /// Migration name.
    pub name: String,
    /// `Pending`, `Applied` or `Failed`.
    pub state: MigrationState,
    /// When it was recorded, if it was.
    pub applied_at: Option<DateTime<Utc>>,
    /// Statements that took effect, if recorded.
    pub statements_applied: Option<i64>,
    /// Whether a migration file exists for it.
    pub has_artifact: bool,
}

// ---- verification ----

/// Checks the ledger against the migration files.
///
/// In order: any failed entry blocks; an applied entry whose file has a
/// different name or checksum is drift; a pending file older than the newest
/// applied entry is out of order. Entries without a file in `artifacts`
/// (pushed schemas, or files not supplied) cannot be checked and are
/// skipped.
pub fn verify(ledger: &[MigrationRecord], artifacts: &[MigrationArtifact]) -> Result<()> {
    if let Some(failed) = ledger.iter().find(|r| r.status == MigrationStatus::Failed) {
        return Err(MigrateError::PreviouslyFailed {
            version: failed.id,
            name: failed.name.clone(),
            statements_applied: failed.statements_applied,
        });
    }

    for record in ledger {
        let Some(artifact) = artifacts.iter().find(|a| a.version == record.id) else {
            debug!(version = record.id, name = %record.name, "No migration file to verify against");
            continue;
        };
        if artifact.name != record.name {
            return Err(MigrateError::Drift {
                version: record.id,
                name: record.name.clone(),
                detail: format!("migration file is named '{}'", artifact.name),
            });
        }
        let checksum = artifact.checksum();
        if checksum != record.checksum {
            return Err(MigrateError::Drift {
                version: record.id,
                name: record.name.clone(),
                detail: format!(
                    "checksum {} recorded, migration file hashes to {checksum}",
                    record.checksum
                ),
            });
        }
    }

    if let Some(newest) = ledger.iter().max_by_key(|r| r.id) {
        if let Some(stale) = pending(ledger, artifacts)
            .into_iter()
            .find(|a| a.version < newest.id)
        {
            return Err(MigrateError::OutOfOrder {
                pending: stale.version,
                pending_name: stale.name.clone(),
                applied: newest.id,
                applied_name: newest.name.clone(),
            });
        }
    }
    Ok(())
}

/// Artifacts with no ledger entry, in version order.
#[must_use]
pub fn pending<'a>(
    ledger: &[MigrationRecord],
    artifacts: &'a [MigrationArtifact],
) -> Vec<&'a MigrationArtifact> {
    let mut pending: Vec<&MigrationArtifact> = artifacts
        .iter()
        .filter(|a| ledger.iter().all(|r| r.id != a.version))
        .collect();
    pending.sort_by_key(|a| a.version);
    pending
}

// ---- runner ----

/// Applies migrations for one dialect under one policy.
///
/// The history is passed into every call; a runner holds no connection.
/// Callers must hold an external advisory lock around `apply`/`migrate` when
/// several processes can target the same database.
pub struct MigrationRunner<D: MigrationDialect> {
    dialect: D,
    policy: Policy,
    options: RunnerOptions,
}

impl<D: MigrationDialect> MigrationRunner<D> {
    /// Creates a runner with default options.
    pub fn new(dialect: D, policy: Policy) -> Self {
        Self {
            dialect,
            policy,
            options: RunnerOptions::default(),
        }
    }

    /// Replaces the execution options.
    #[must_use]
    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Returns the policy.
    #[must_use]
    pub const fn policy(&self) -> Policy {
        self.policy
    }

    /// Whether statements run inside one transaction.
    #[must_use]
    pub fn is_transactional(&self) -> bool {
        self.options
            .transactional
            .unwrap_or_else(|| self.dialect.supports_transactional_ddl())
    }

    /// Classifies `diff` under the runner's policy.
    #[must_use]
    pub fn classify(&self, diff: &SchemaDiff) -> Classification {
        classify(diff, self.policy)
    }

    /// Gates `diff` on the policy, then generates its SQL.
    ///
    /// Blocking diffs are refused before any SQL is generated. A plan whose
    /// SQL needs manual intervention is refused too; `dry_run` still shows it.
    pub fn plan(&self, diff: &SchemaDiff) -> Result<MigrationPlan> {
        let classification = self.classify(diff);
        let destructive = destructive_changes(diff);
        match classification {
            Classification::Blocking => {
                return Err(MigrateError::BlockingChange {
                    changes: destructive.iter().map(ToString::to_string).collect(),
                });
            }
            Classification::Destructive => {
                for change in &destructive {
                    warn!(change = %change, "Destructive change");
                }
            }
            Classification::Safe => {}
        }

        let sql = generate(diff, &self.dialect)?;
        if !sql.diagnostics.is_empty() {
            return Err(MigrateError::ManualIntervention {
                diagnostics: sql.diagnostics,
            });
        }
        Ok(MigrationPlan {
            diff: diff.clone(),
            sql,
            classification,
            destructive,
            dialect: self.dialect.name(),
            state: MigrationState::Proposed,
        })
    }

    /// Computes statements and classification without executing anything.
    pub fn dry_run(&self, diff: &SchemaDiff) -> Result<DryRun> {
        let sql = generate(diff, &self.dialect)?;
        Ok(DryRun {
            statements: sql.forward,
            reverse: sql.reverse,
            diagnostics: sql.diagnostics,
            classification: self.classify(diff),
            destructive: destructive_changes(diff),
        })
    }

    /// Verifies the ledger, then applies one migration.
    ///
    /// `known` is every migration file on disk; each applied entry is checked
    /// against it, not only `artifact`. An already applied migration is a
    /// no-op returning its record.
    pub async fn apply(
        &self,
        history: &MigrationHistory,
        known: &[MigrationArtifact],
        artifact: &MigrationArtifact,
    ) -> Result<MigrationRecord> {
        history.ensure_table().await?;
        let ledger = history.records().await?;
        verify(&ledger, known)?;
        verify(&ledger, std::slice::from_ref(artifact))?;

        if let Some(existing) = ledger.iter().find(|r| r.id == artifact.version) {
            info!(
                version = artifact.version,
                name = %artifact.name,
                "Migration already applied, skipping"
            );
            return Ok(existing.clone());
        }
        self.execute(history, artifact).await
    }

    /// Verifies the ledger, then applies every pending migration in order.
    pub async fn migrate(
        &self,
        history: &MigrationHistory,
        artifacts: &[MigrationArtifact],
    ) -> Result<Vec<MigrationRecord>> {
        history.ensure_table().await?;
        let ledger = history.records().await?;
        verify(&ledger, artifacts)?;

        let pending = pending(&ledger, artifacts);
        if pending.is_empty() {
            info!("No pending migrations");
        }
        let mut applied = Vec::with_capacity(pending.len());
        for artifact in pending {
            applied.push(self.execute(history, artifact).await?);
        }
        Ok(applied)
    }

    /// Known migrations with their state, in version order.
    pub async fn status(
        &self,
        history: &MigrationHistory,
        artifacts: &[MigrationArtifact],
    ) -> Result<Vec<StatusEntry>> {
        history.ensure_table().await?;
        let ledger = history.records().await?;

        let mut entries: Vec<StatusEntry> = artifacts
            .iter()
            .map(|artifact| {
                let record = ledger.iter().find(|r| r.id == artifact.version);
                StatusEntry {
                    version: artifact.version,
                    name: artifact.name.clone(),
                    state: record.map_or(MigrationState::Pending, record_state),
                    applied_at: record.map(|r| r.applied_at),
                    statements_applied: record.map(|r| r.statements_applied),
                    has_artifact: true,
                }
            })
            .collect();
        entries.extend(
            ledger
                .iter()
                .filter(|r| artifacts.iter().all(|a| a.version != r.id))
                .map(|r| StatusEntry {
                    version: r.id,
                    name: r.name.clone(),
                    state: record_state(r),
                    applied_at: Some(r.applied_at),
                    statements_applied: Some(r.statements_applied),
                    has_artifact: false,
                }),
        );
        entries.sort_by_key(|e| e.version);
        Ok(entries)
    }

    async fn execute(
        &self,
        history: &MigrationHistory,
        artifact: &MigrationArtifact,
    ) -> Result<MigrationRecord> {
        let applying = MigrationState::Pending.transition(MigrationState::Applying)?;
        let transactional = self.is_transactional();
        info!(
            version = artifact.version,
            name = %artifact.name,
            statements = artifact.executable().count(),
            transactional,
            "Applying migration"
        );

        let outcome = if transactional {
            self.run_transactional(history, artifact).await
        } else {
            self.run_sequential(history, artifact).await
        };

        let state = applying.transition(if outcome.is_ok() {
            MigrationState::Applied
        } else {
            MigrationState::Failed
        })?;
        match &outcome {
            Ok(record) => info!(
                version = artifact.version,
                name = %artifact.name,
                statements = record.statements_applied,
                "Migration applied successfully"
            ),
            Err(e) => error!(
                version = artifact.version,
                name = %artifact.name,
                state = ?state,
                error = %e,
                "Migration failed"
            ),
        }
        outcome
    }

    async fn run_transactional(
        &self,
        history: &MigrationHistory,
        artifact: &MigrationArtifact,
    ) -> Result<MigrationRecord> {
        let checksum = artifact.checksum();
        let mut tx = history.pool().begin().await?;
        let mut executed = 0usize;

        for (index, statement) in artifact.statements.iter().enumerate() {
            let Some(sql) = executable(artifact, statement) else {
                continue;
            };
            debug!(sql = %sql, "Executing SQL");
            if let Err(reason) = self.run_statement(&mut *tx, sql).await {
                if let Err(e) = tx.rollback().await {
                    warn!(error = %e, "Rollback failed");
                }
                // nothing survived the rollback
                record_failure(history, artifact, &checksum, 0).await;
                return Err(MigrateError::StatementExecution {
                    version: artifact.version,
                    name: artifact.name.clone(),
                    index: index + 1,
                    applied: 0,
                    statement: sql.to_string(),
                    reason,
                });
            }
            executed += 1;
        }

        let record = new_record(artifact, checksum, MigrationStatus::Applied, executed);
        history::append(&mut *tx, &record).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn run_sequential(
        &self,
        history: &MigrationHistory,
        artifact: &MigrationArtifact,
    ) -> Result<MigrationRecord> {
        let checksum = artifact.checksum();
        let mut executed = 0usize;

        for (index, statement) in artifact.statements.iter().enumerate() {
            let Some(sql) = executable(artifact, statement) else {
                continue;
            };
            debug!(sql = %sql, "Executing SQL");
            if let Err(reason) = self.run_statement(history.pool(), sql).await {
                record_failure(history, artifact, &checksum, executed).await;
                return Err(MigrateError::StatementExecution {
                    version: artifact.version,
                    name: artifact.name.clone(),
                    index: index + 1,
                    applied: executed,
                    statement: sql.to_string(),
                    reason,
                });
            }
            executed += 1;
        }

        let record = new_record(artifact, checksum, MigrationStatus::Applied, executed);
        history.append(&record).await?;
        Ok(record)
    }

    async fn run_statement<'e, E>(&self, executor: E, sql: &str) -> std::result::Result<(), String>
    where
        E: sqlx::Executor<'e, Database = Any>,
    {
        let query = sqlx::query(sql).execute(executor);
        match self.options.statement_timeout {
            Some(limit) => match tokio::time::timeout(limit, query).await {
                Ok(result) => result.map(|_| ()).map_err(|e| e.to_string()),
                Err(_) => Err(format!(
                    "statement timed out after {:.3}s",
                    limit.as_secs_f64()
                )),
            },
            None => query.await.map(|_| ()).map_err(|e| e.to_string()),
        }
    }
}

fn executable<'a>(artifact: &MigrationArtifact, statement: &'a Statement) -> Option<&'a str> {
    match statement {
        Statement::Sql(sql) => Some(sql),
        Statement::Manual(reason) => {
            warn!(
                version = artifact.version,
                reason = %reason,
                "Skipping manual-intervention entry"
            );
            None
        }
    }
}

fn new_record(
    artifact: &MigrationArtifact,
    checksum: String,
    status: MigrationStatus,
    statements_applied: usize,
) -> MigrationRecord {
    MigrationRecord {
        id: artifact.version,
        name: artifact.name.clone(),
        checksum,
        applied_at: Utc::now(),
        status,
        statements_applied: i64::try_from(statements_applied).unwrap_or(i64::MAX),
    }
}

async fn record_failure(
    history: &MigrationHistory,
    artifact: &MigrationArtifact,
    checksum: &str,
    statements_applied: usize,
) {
    let record = new_record(
        artifact,
        checksum.to_string(),
        MigrationStatus::Failed,
        statements_applied,
    );
    if let Err(e) = history.append(&record).await {
        error!(
            version = artifact.version,
            error = %e,
            "Could not record failed migration"
        );
    }
}

fn record_state(record: &MigrationRecord) -> MigrationState {
    match record.status {
        MigrationStatus::Applied => MigrationState::Applied,
        MigrationStatus::Failed => MigrationState::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_schema::{
        compute, ColumnDefinition, SchemaDefinition, SchemaSnapshot, SqliteDialect,
        TableDefinition,
    };

    fn artifact(version: i64, name: &str, sql: &str) -> MigrationArtifact {
        MigrationArtifact::new(version, name, "sqlite", vec![Statement::Sql(sql.to_string())])
    }

    fn applied(artifact: &MigrationArtifact) -> MigrationRecord {
        new_record(
            artifact,
            artifact.checksum(),
            MigrationStatus::Applied,
            artifact.statements.len(),
        )
    }

    #[test]
    fn state_transitions() {
        use MigrationState::*;
        assert_eq!(Proposed.transition(Pending).unwrap(), Pending);
        assert_eq!(Pending.transition(Applying).unwrap(), Applying);
        assert_eq!(Applying.transition(Failed).unwrap(), Failed);
        assert!(Applied.is_terminal());

        assert!(matches!(
            Applied.transition(Applying),
            Err(MigrateError::InvalidTransition {
                from: Applied,
                to: Applying
            })
        ));
        assert!(Failed.transition(Applying).is_err());
        assert!(Proposed.transition(Applying).is_err());
    }

    #[test]
    fn verify_accepts_clean_history() {
        let a = artifact(1, "one", "CREATE TABLE a (id INTEGER)");
        let b = artifact(2, "two", "CREATE TABLE b (id INTEGER)");
        let ledger = vec![applied(&a)];
        verify(&ledger, &[a.clone(), b.clone()]).unwrap();

        let pending = pending(&ledger, std::slice::from_ref(&b));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].version, 2);
    }

    #[test]
    fn verify_detects_checksum_drift() {
        let original = artifact(1, "one", "CREATE TABLE a (id INTEGER)");
        let edited = artifact(1, "one", "CREATE TABLE a (id TEXT)");
        let err = verify(&[applied(&original)], &[edited]).unwrap_err();
        assert!(matches!(err, MigrateError::Drift { version: 1, .. }));
    }

    #[test]
    fn verify_detects_renamed_file() {
        let original = artifact(1, "one", "CREATE TABLE a (id INTEGER)");
        let renamed = artifact(1, "uno", "CREATE TABLE a (id INTEGER)");
        let err = verify(&[applied(&original)], &[renamed]).unwrap_err();
        assert!(matches!(err, MigrateError::Drift { ref detail, .. } if detail.contains("uno")));
    }

    #[test]
    fn verify_detects_out_of_order() {
        let two = artifact(2, "two", "CREATE TABLE b (id INTEGER)");
        let three = artifact(3, "three", "CREATE TABLE c (id INTEGER)");
        let err = verify(&[applied(&three)], &[two, three.clone()]).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::OutOfOrder {
                pending: 2,
                applied: 3,
                ..
            }
        ));
    }

    #[test]
    fn verify_blocks_after_failure() {
        let one = artifact(1, "one", "CREATE TABLE a (id INTEGER)");
        let mut failed = applied(&one);
        failed.status = MigrationStatus::Failed;
        failed.statements_applied = 0;
        let err = verify(&[failed], &[one]).unwrap_err();
        assert!(matches!(err, MigrateError::PreviouslyFailed { version: 1, .. }));
    }

    #[test]
    fn verify_skips_entries_without_files() {
        let pushed = artifact(5, "push_5", "CREATE TABLE p (id INTEGER)");
        let later = artifact(6, "six", "CREATE TABLE q (id INTEGER)");
        verify(&[applied(&pushed)], &[later]).unwrap();
    }

    fn users(with_age: bool) -> SchemaSnapshot {
        let mut table = TableDefinition::new("users")
            .column(ColumnDefinition::new("id", "bigint").primary_key());
        if with_age {
            table = table.column(ColumnDefinition::new("age", "integer"));
        }
        SchemaSnapshot::build(&SchemaDefinition::new().table(table)).unwrap()
    }

    #[test]
    fn plan_refuses_blocking_diff() {
        let runner = MigrationRunner::new(SqliteDialect::new(), Policy::production());
        let diff = compute(&users(true), &users(false));
        let err = runner.plan(&diff).unwrap_err();
        assert!(matches!(err, MigrateError::BlockingChange { ref changes } if changes.len() == 1));

        // previews are never refused
        let preview = runner.dry_run(&diff).unwrap();
        assert_eq!(preview.classification, Classification::Blocking);
        assert_eq!(
            preview.statements,
            vec![Statement::Sql("ALTER TABLE \"users\" DROP COLUMN \"age\"".into())]
        );
    }

    #[test]
    fn plan_refuses_manual_intervention() {
        let runner = MigrationRunner::new(SqliteDialect::new(), Policy::Development);
        let before = users(true);
        let after = SchemaSnapshot::build(
            &SchemaDefinition::new().table(
                TableDefinition::new("users")
                    .column(ColumnDefinition::new("id", "bigint").primary_key())
                    .column(ColumnDefinition::new("age", "integer").not_null()),
            ),
        )
        .unwrap();
        let diff = compute(&before, &after);

        let err = runner.plan(&diff).unwrap_err();
        assert!(
            matches!(err, MigrateError::ManualIntervention { ref diagnostics } if diagnostics.len() == 1)
        );

        let preview = runner.dry_run(&diff).unwrap();
        assert_eq!(preview.diagnostics.len(), 1);
        assert!(preview.diagnostics[0].contains("users.age"));
    }

    #[test]
    fn plan_becomes_pending_once() {
        let runner = MigrationRunner::new(SqliteDialect::new(), Policy::Development);
        let mut plan = runner.plan(&compute(&users(false), &users(true))).unwrap();
        assert_eq!(plan.state(), MigrationState::Proposed);
        assert_eq!(plan.classification, Classification::Safe);

        let artifact = plan.artifact(7, "add age").unwrap();
        assert_eq!(plan.state(), MigrationState::Pending);
        assert_eq!(artifact.name, "add_age");
        assert_eq!(artifact.dialect, "sqlite");
        assert_eq!(
            artifact.reverse,
            "ALTER TABLE \"users\" DROP COLUMN \"age\";"
        );
        assert!(plan.artifact(8, "again").is_err());
    }

    #[test]
    fn transactional_follows_dialect_unless_overridden() {
        let runner = MigrationRunner::new(SqliteDialect::new(), Policy::Development);
        assert!(runner.is_transactional());
        let runner = runner.with_options(RunnerOptions::default().transactional(false));
        assert!(!runner.is_transactional());
    }
}
