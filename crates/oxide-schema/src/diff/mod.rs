//! Schema diffing.
//!
//! [`Differ::compute`] compares two snapshots and returns the operations
//! needed to go from the first to the second. The result is a pure function
//! of both snapshots and comes out in dependency-safe order:
//!
//! 1. enum additions and alterations
//! 2. table renames, then table creations
//! 3. column renames, additions and alterations (all tables)
//! 4. index changes, then foreign key changes (all tables)
//! 5. foreign key removals, then index removals
//! 6. column removals, then table removals, then enum removals
//!
//! A SQL generator can therefore emit statements in list order.

mod operation;
pub mod rename;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use operation::DiffOperation;
pub use rename::{Candidate, RenameOptions};

use crate::error::RenameConfigError;
use crate::snapshot::{ForeignKeySnapshot, IndexSnapshot, SchemaSnapshot, TableSnapshot};
use operation::table_shell;
use rename::stable_match;

/// Result of comparing two schema snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDiff {
    /// Operations in dependency-safe order.
    pub operations: Vec<DiffOperation>,
    /// `false` iff `operations` is empty.
    pub has_changes: bool,
}

impl SchemaDiff {
    /// Wraps an operation list.
    #[must_use]
    pub fn from_operations(operations: Vec<DiffOperation>) -> Self {
        let has_changes = !operations.is_empty();
        Self {
            operations,
            has_changes,
        }
    }

    /// Returns `true` if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// The semantic inverse: each operation inverted, in reverse order.
    ///
    /// Because removed tables are represented as index and foreign key
    /// removals followed by a table removal, the inverse recreates the
    /// table first and then its indexes and foreign keys.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self::from_operations(
            self.operations
                .iter()
                .rev()
                .map(DiffOperation::inverse)
                .collect(),
        )
    }

    /// Names of tables created by this diff.
    #[must_use]
    pub fn created_tables(&self) -> BTreeSet<&str> {
        self.operations
            .iter()
            .filter_map(|op| match op {
                DiffOperation::TableAdded { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Names of tables dropped by this diff.
    #[must_use]
    pub fn removed_tables(&self) -> BTreeSet<&str> {
        self.operations
            .iter()
            .filter_map(|op| match op {
                DiffOperation::TableRemoved { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Computes the diff between two snapshots with default rename options.
#[must_use]
pub fn compute(previous: &SchemaSnapshot, current: &SchemaSnapshot) -> SchemaDiff {
    Differ::default().compute(previous, current)
}

/// Schema differ, parameterized by the rename policy.
#[derive(Debug, Clone, Default)]
pub struct Differ {
    options: RenameOptions,
}

/// Operations grouped by the phase they are emitted in.
#[derive(Default)]
struct Phases {
    enums: Vec<DiffOperation>,
    renames: Vec<DiffOperation>,
    creates: Vec<DiffOperation>,
    columns: Vec<DiffOperation>,
    indexes: Vec<DiffOperation>,
    foreign_keys: Vec<DiffOperation>,
    foreign_key_removals: Vec<DiffOperation>,
    index_removals: Vec<DiffOperation>,
    column_removals: Vec<DiffOperation>,
    table_removals: Vec<DiffOperation>,
    enum_removals: Vec<DiffOperation>,
}

impl Phases {
    fn into_operations(self) -> Vec<DiffOperation> {
        [
            self.enums,
            self.renames,
            self.creates,
            self.columns,
            self.indexes,
            self.foreign_keys,
            self.foreign_key_removals,
            self.index_removals,
            self.column_removals,
            self.table_removals,
            self.enum_removals,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Old column name to new column name, per (new) table name.
type ColumnRenames = BTreeMap<String, BTreeMap<String, String>>;

impl Differ {
    /// Creates a differ after validating the rename options.
    pub fn new(options: RenameOptions) -> Result<Self, RenameConfigError> {
        options.validate()?;
        Ok(Self { options })
    }

    /// The rename policy in use.
    #[must_use]
    pub const fn options(&self) -> &RenameOptions {
        &self.options
    }

    /// Compares `previous` to `current`.
    #[must_use]
    pub fn compute(&self, previous: &SchemaSnapshot, current: &SchemaSnapshot) -> SchemaDiff {
        let mut phases = Phases::default();

        diff_enums(previous, current, &mut phases);

        // ---- tables: renames and creations ------------------------
        let table_renames = self.detect_table_renames(previous, current);
        for (old, new, confidence) in &table_renames {
            phases.renames.push(DiffOperation::TableRenamed {
                from: (*old).to_string(),
                to: (*new).to_string(),
                confidence: *confidence,
                unique_columns: previous.table(old).map(unique_columns).unwrap_or_default(),
            });
        }
        let renamed_from: BTreeMap<&str, &str> =
            table_renames.iter().map(|(o, n, _)| (*n, *o)).collect();
        let renamed_to: BTreeMap<&str, &str> =
            table_renames.iter().map(|(o, n, _)| (*o, *n)).collect();

        let mut paired: Vec<(&str, &TableSnapshot, &TableSnapshot)> = Vec::new();
        let mut created: Vec<(&str, &TableSnapshot)> = Vec::new();
        for (name, table) in current.tables() {
            let old = previous
                .table(name)
                .or_else(|| renamed_from.get(name.as_str()).and_then(|o| previous.table(o)));
            match old {
                Some(old) => paired.push((name.as_str(), old, table)),
                None => {
                    phases.creates.push(DiffOperation::TableAdded {
                        name: name.clone(),
                        table: table_shell(table),
                    });
                    created.push((name.as_str(), table));
                }
            }
        }

        // ---- columns ------------------------------------------------
        let mut column_renames = ColumnRenames::new();
        for (name, old, new) in &paired {
            let renames = self.diff_columns(name, old, new, &mut phases);
            if !renames.is_empty() {
                column_renames.insert((*name).to_string(), renames);
            }
        }

        // ---- indexes and foreign keys -------------------------------
        for (name, table) in &created {
            for index in table.indexes() {
                phases.indexes.push(DiffOperation::IndexAdded {
                    table: (*name).to_string(),
                    index: index.clone(),
                });
            }
            for fk in table.foreign_keys() {
                phases.foreign_keys.push(DiffOperation::ForeignKeyAdded {
                    table: (*name).to_string(),
                    foreign_key: fk.clone(),
                });
            }
        }

        let no_renames = BTreeMap::new();
        for (name, old, new) in &paired {
            let own = column_renames.get(*name).unwrap_or(&no_renames);
            let old_indexes: Vec<IndexSnapshot> = old
                .indexes()
                .iter()
                .map(|i| IndexSnapshot {
                    columns: map_columns(&i.columns, own),
                    ..i.clone()
                })
                .collect();
            diff_indexes(name, &old_indexes, new.indexes(), &mut phases);

            let old_fks: Vec<ForeignKeySnapshot> = old
                .foreign_keys()
                .iter()
                .map(|fk| map_foreign_key(fk, own, &renamed_to, &column_renames))
                .collect();
            diff_foreign_keys(name, &old_fks, new.foreign_keys(), &mut phases);
        }

        // ---- removed tables -----------------------------------------
        let removed: BTreeMap<&str, &TableSnapshot> = previous
            .tables()
            .iter()
            .filter(|(name, _)| {
                current.table(name).is_none() && !renamed_to.contains_key(name.as_str())
            })
            .map(|(name, table)| (name.as_str(), table))
            .collect();
        for (name, table) in &removed {
            for fk in table.foreign_keys() {
                phases.foreign_key_removals.push(DiffOperation::ForeignKeyRemoved {
                    table: (*name).to_string(),
                    foreign_key: fk.clone(),
                });
            }
            for index in table.indexes() {
                phases.index_removals.push(DiffOperation::IndexRemoved {
                    table: (*name).to_string(),
                    index: index.clone(),
                });
            }
        }
        for name in removal_order(&removed) {
            phases.table_removals.push(DiffOperation::TableRemoved {
                name: name.to_string(),
                table: table_shell(removed[name]),
            });
        }

        let diff = SchemaDiff::from_operations(phases.into_operations());
        debug!(operations = diff.operations.len(), "Schema diff computed");
        diff
    }

    /// Returns matched `(old, new, score)` table renames, sorted by old name.
    fn detect_table_renames<'a>(
        &self,
        previous: &'a SchemaSnapshot,
        current: &'a SchemaSnapshot,
    ) -> Vec<(&'a str, &'a str, f64)> {
        if !self.options.enabled {
            return Vec::new();
        }
        let removed: Vec<(&str, &TableSnapshot)> = previous
            .tables()
            .iter()
            .filter(|(n, _)| current.table(n).is_none())
            .map(|(n, t)| (n.as_str(), t))
            .collect();
        let added: Vec<(&str, &TableSnapshot)> = current
            .tables()
            .iter()
            .filter(|(n, _)| previous.table(n).is_none())
            .map(|(n, t)| (n.as_str(), t))
            .collect();

        let mut candidates = Vec::with_capacity(removed.len() * added.len());
        for (old_name, old) in &removed {
            for (new_name, new) in &added {
                candidates.push(Candidate {
                    from: old_name,
                    to: new_name,
                    score: self.options.table_score(old_name, old, new_name, new),
                });
            }
        }

        stable_match(&candidates, self.options.threshold)
            .into_iter()
            .map(|m| {
                debug!(from = %m.from, to = %m.to, score = m.score, "Detected table rename");
                (m.from, m.to, m.score)
            })
            .collect()
    }

    /// Diffs the columns of a paired table, returning old -> new renames.
    fn diff_columns(
        &self,
        table: &str,
        old: &TableSnapshot,
        new: &TableSnapshot,
        phases: &mut Phases,
    ) -> BTreeMap<String, String> {
        let removed: Vec<&str> = old
            .columns()
            .keys()
            .filter(|c| new.column(c).is_none())
            .map(String::as_str)
            .collect();
        let added: Vec<&str> = new
            .columns()
            .keys()
            .filter(|c| old.column(c).is_none())
            .map(String::as_str)
            .collect();

        let mut matches = Vec::new();
        if self.options.enabled {
            let mut candidates = Vec::with_capacity(removed.len() * added.len());
            for from in &removed {
                for to in &added {
                    let (Some(a), Some(b)) = (old.column(from), new.column(to)) else {
                        continue;
                    };
                    candidates.push(Candidate {
                        from,
                        to,
                        score: self.options.column_score(from, a, to, b),
                    });
                }
            }
            matches = stable_match(&candidates, self.options.threshold);
        }

        let mut renames = BTreeMap::new();
        for m in &matches {
            debug!(table = %table, from = %m.from, to = %m.to, score = m.score, "Detected column rename");
            phases.columns.push(DiffOperation::ColumnRenamed {
                table: table.to_string(),
                from: m.from.to_string(),
                to: m.to.to_string(),
                confidence: m.score,
                unique: old
                    .column(m.from)
                    .is_some_and(|c| c.unique && !c.primary_key),
            });
            renames.insert(m.from.to_string(), m.to.to_string());
        }
        let renamed_old: BTreeSet<&str> = matches.iter().map(|m| m.from).collect();
        let renamed_new: BTreeSet<&str> = matches.iter().map(|m| m.to).collect();

        for name in added.iter().filter(|n| !renamed_new.contains(*n)) {
            if let Some(column) = new.column(name) {
                phases.columns.push(DiffOperation::ColumnAdded {
                    table: table.to_string(),
                    column: (*name).to_string(),
                    definition: column.clone(),
                });
            }
        }

        // Columns that kept their name, plus renamed columns under the new
        // name, are compared structurally.
        let kept = old
            .columns()
            .keys()
            .filter(|c| new.column(c).is_some())
            .map(|c| (c.as_str(), c.as_str()));
        let moved = matches.iter().map(|m| (m.from, m.to));
        let mut compared: Vec<(&str, &str)> = kept.chain(moved).collect();
        compared.sort_by(|a, b| a.1.cmp(b.1));
        for (from, to) in compared {
            let (Some(a), Some(b)) = (old.column(from), new.column(to)) else {
                continue;
            };
            if a.structurally_differs(b) {
                phases.columns.push(DiffOperation::ColumnAltered {
                    table: table.to_string(),
                    column: to.to_string(),
                    from: a.clone(),
                    to: b.clone(),
                });
            }
        }

        for name in removed.iter().filter(|n| !renamed_old.contains(*n)) {
            if let Some(column) = old.column(name) {
                phases.column_removals.push(DiffOperation::ColumnRemoved {
                    table: table.to_string(),
                    column: (*name).to_string(),
                    definition: column.clone(),
                });
            }
        }

        renames
    }
}

fn diff_enums(previous: &SchemaSnapshot, current: &SchemaSnapshot, phases: &mut Phases) {
    for (name, values) in current.enums() {
        match previous.enums().get(name) {
            None => phases.enums.push(DiffOperation::EnumAdded {
                name: name.clone(),
                values: values.clone(),
            }),
            Some(old) if old == values => {}
            Some(old) if old.len() < values.len() && values.starts_with(old) => {
                for i in old.len()..values.len() {
                    phases.enums.push(DiffOperation::EnumValueAdded {
                        name: name.clone(),
                        value: values[i].clone(),
                        before: values[..i].to_vec(),
                    });
                }
            }
            Some(old) => phases.enums.push(DiffOperation::EnumAltered {
                name: name.clone(),
                from: old.clone(),
                to: values.clone(),
            }),
        }
    }
    for (name, values) in previous.enums() {
        if !current.enums().contains_key(name) {
            phases.enum_removals.push(DiffOperation::EnumRemoved {
                name: name.clone(),
                values: values.clone(),
            });
        }
    }
}

fn diff_indexes(table: &str, old: &[IndexSnapshot], new: &[IndexSnapshot], phases: &mut Phases) {
    let old_by_name: BTreeMap<&str, &IndexSnapshot> =
        old.iter().map(|i| (i.name.as_str(), i)).collect();
    let new_names: BTreeSet<&str> = new.iter().map(|i| i.name.as_str()).collect();

    for index in new {
        match old_by_name.get(index.name.as_str()) {
            Some(existing) if existing.equivalent(index) => {}
            Some(existing) => {
                // same name, new shape: drop first so the name is free
                phases.indexes.push(DiffOperation::IndexRemoved {
                    table: table.to_string(),
                    index: (*existing).clone(),
                });
                phases.indexes.push(DiffOperation::IndexAdded {
                    table: table.to_string(),
                    index: index.clone(),
                });
            }
            None => phases.indexes.push(DiffOperation::IndexAdded {
                table: table.to_string(),
                index: index.clone(),
            }),
        }
    }
    for index in old.iter().filter(|i| !new_names.contains(i.name.as_str())) {
        phases.index_removals.push(DiffOperation::IndexRemoved {
            table: table.to_string(),
            index: index.clone(),
        });
    }
}

fn diff_foreign_keys(
    table: &str,
    old: &[ForeignKeySnapshot],
    new: &[ForeignKeySnapshot],
    phases: &mut Phases,
) {
    let old_by_name: BTreeMap<&str, &ForeignKeySnapshot> =
        old.iter().map(|fk| (fk.name.as_str(), fk)).collect();
    let new_names: BTreeSet<&str> = new.iter().map(|fk| fk.name.as_str()).collect();

    for fk in new {
        match old_by_name.get(fk.name.as_str()) {
            Some(existing) if existing.equivalent(fk) => {}
            Some(existing) => {
                phases.foreign_keys.push(DiffOperation::ForeignKeyRemoved {
                    table: table.to_string(),
                    foreign_key: (*existing).clone(),
                });
                phases.foreign_keys.push(DiffOperation::ForeignKeyAdded {
                    table: table.to_string(),
                    foreign_key: fk.clone(),
                });
            }
            None => phases.foreign_keys.push(DiffOperation::ForeignKeyAdded {
                table: table.to_string(),
                foreign_key: fk.clone(),
            }),
        }
    }
    for fk in old.iter().filter(|fk| !new_names.contains(fk.name.as_str())) {
        phases.foreign_key_removals.push(DiffOperation::ForeignKeyRemoved {
            table: table.to_string(),
            foreign_key: fk.clone(),
        });
    }
}

/// Columns whose uniqueness is an inline constraint rather than the key.
fn unique_columns(table: &TableSnapshot) -> Vec<String> {
    table
        .columns()
        .iter()
        .filter(|(_, c)| c.unique && !c.primary_key)
        .map(|(name, _)| name.clone())
        .collect()
}

fn map_columns(columns: &[String], renames: &BTreeMap<String, String>) -> Vec<String> {
    columns
        .iter()
        .map(|c| renames.get(c).unwrap_or(c).clone())
        .collect()
}

/// Rewrites an old foreign key in terms of the new schema's names.
fn map_foreign_key(
    fk: &ForeignKeySnapshot,
    own: &BTreeMap<String, String>,
    table_renames: &BTreeMap<&str, &str>,
    column_renames: &ColumnRenames,
) -> ForeignKeySnapshot {
    let target = table_renames
        .get(fk.references_table.as_str())
        .map_or_else(|| fk.references_table.clone(), |t| (*t).to_string());
    let references_columns = match column_renames.get(&target) {
        Some(renames) => map_columns(&fk.references_columns, renames),
        None => fk.references_columns.clone(),
    };
    ForeignKeySnapshot {
        columns: map_columns(&fk.columns, own),
        references_table: target,
        references_columns,
        ..fk.clone()
    }
}

/// Orders dropped tables so that a table is dropped before any table it
/// references. Ties (and cycles) fall back to alphabetical order.
fn removal_order<'a>(removed: &BTreeMap<&'a str, &'a TableSnapshot>) -> Vec<&'a str> {
    let mut remaining: BTreeSet<&'a str> = removed.keys().copied().collect();
    let mut order = Vec::with_capacity(remaining.len());

    while let Some(first) = remaining.iter().next().copied() {
        let referenced_by_other = |candidate: &str| {
            remaining.iter().any(|other| {
                *other != candidate
                    && removed
                        .get(other)
                        .is_some_and(|t| t.referenced_tables().any(|r| r == candidate))
            })
        };
        let next = remaining
            .iter()
            .copied()
            .find(|c| !referenced_by_other(*c))
            .unwrap_or(first);
        remaining.remove(next);
        order.push(next);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{
        ColumnDefinition, EnumDefinition, ForeignKeyDefinition, IndexDefinition,
        SchemaDefinition, TableDefinition,
    };
    use crate::types::ForeignKeyAction;

    fn snap(def: SchemaDefinition) -> SchemaSnapshot {
        SchemaSnapshot::build(&def).unwrap()
    }

    fn kinds(diff: &SchemaDiff) -> Vec<&'static str> {
        diff.operations.iter().map(DiffOperation::kind).collect()
    }

    fn users() -> TableDefinition {
        TableDefinition::new("users")
            .column(ColumnDefinition::new("id", "bigint").primary_key())
            .column(ColumnDefinition::new("email", "varchar").params(&[255]).not_null())
    }

    #[test]
    fn identical_is_empty() {
        let s = snap(SchemaDefinition::new().table(users()));
        let diff = compute(&s, &s);
        assert!(!diff.has_changes);
        assert!(diff.operations.is_empty());
    }

    #[test]
    fn new_table_with_index_and_fk() {
        let prev = snap(SchemaDefinition::new().table(users()));
        let cur = snap(
            SchemaDefinition::new().table(users()).table(
                TableDefinition::new("posts")
                    .column(ColumnDefinition::new("id", "bigint").primary_key())
                    .column(ColumnDefinition::new("user_id", "bigint").references(
                        "users",
                        "id",
                        ForeignKeyAction::Cascade,
                    ))
                    .index(IndexDefinition::on(["user_id"])),
            ),
        );
        let diff = compute(&prev, &cur);
        assert_eq!(kinds(&diff), vec!["TableAdded", "IndexAdded", "ForeignKeyAdded"]);
        match &diff.operations[0] {
            DiffOperation::TableAdded { table, .. } => {
                assert!(table.indexes().is_empty());
                assert!(table.foreign_keys().is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dropped_table_removes_constraints_first() {
        let prev = snap(
            SchemaDefinition::new().table(users()).table(
                TableDefinition::new("posts")
                    .column(ColumnDefinition::new("id", "bigint").primary_key())
                    .column(ColumnDefinition::new("user_id", "bigint").references(
                        "users",
                        "id",
                        ForeignKeyAction::NoAction,
                    )),
            ),
        );
        let cur = snap(SchemaDefinition::new());
        let diff = Differ::new(RenameOptions::disabled()).unwrap().compute(&prev, &cur);
        assert_eq!(
            kinds(&diff),
            vec!["ForeignKeyRemoved", "TableRemoved", "TableRemoved"]
        );
        let dropped: Vec<&str> = diff
            .operations
            .iter()
            .filter_map(|op| match op {
                DiffOperation::TableRemoved { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(dropped, vec!["posts", "users"]);
    }

    #[test]
    fn column_rename_detected() {
        let prev = snap(SchemaDefinition::new().table(users()));
        let cur = snap(
            SchemaDefinition::new().table(
                TableDefinition::new("users")
                    .column(ColumnDefinition::new("id", "bigint").primary_key())
                    .column(
                        ColumnDefinition::new("email_address", "varchar")
                            .params(&[255])
                            .not_null(),
                    ),
            ),
        );
        let diff = compute(&prev, &cur);
        assert_eq!(diff.operations.len(), 1);
        match &diff.operations[0] {
            DiffOperation::ColumnRenamed { from, to, confidence, .. } => {
                assert_eq!(from, "email");
                assert_eq!(to, "email_address");
                assert!(*confidence >= 0.7);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rename_disabled_falls_back() {
        let prev = snap(SchemaDefinition::new().table(users()));
        let cur = snap(
            SchemaDefinition::new().table(
                TableDefinition::new("users")
                    .column(ColumnDefinition::new("id", "bigint").primary_key())
                    .column(ColumnDefinition::new("mail", "varchar").params(&[255]).not_null()),
            ),
        );
        let diff = Differ::new(RenameOptions::disabled()).unwrap().compute(&prev, &cur);
        assert_eq!(kinds(&diff), vec!["ColumnAdded", "ColumnRemoved"]);
    }

    #[test]
    fn type_change_is_alter() {
        let prev = snap(SchemaDefinition::new().table(users()));
        let cur = snap(
            SchemaDefinition::new().table(
                TableDefinition::new("users")
                    .column(ColumnDefinition::new("id", "bigint").primary_key())
                    .column(ColumnDefinition::new("email", "text").not_null()),
            ),
        );
        let diff = compute(&prev, &cur);
        assert_eq!(kinds(&diff), vec!["ColumnAltered"]);
    }

    #[test]
    fn table_rename_keeps_constraints() {
        let def = |name: &str| {
            SchemaDefinition::new().table(users()).table(
                TableDefinition::new(name)
                    .column(ColumnDefinition::new("id", "bigint").primary_key())
                    .column(ColumnDefinition::new("user_id", "bigint"))
                    .foreign_key(
                        ForeignKeyDefinition::new(["user_id"], "users", ["id"]).named("fk_owner"),
                    )
                    .index(IndexDefinition::on(["user_id"]).named("ix_owner")),
            )
        };
        let diff = compute(&snap(def("post")), &snap(def("posts")));
        assert_eq!(kinds(&diff), vec!["TableRenamed"]);
    }

    #[test]
    fn fk_target_follows_table_rename() {
        let def = |target: &str| {
            SchemaDefinition::new()
                .table(
                    TableDefinition::new(target)
                        .column(ColumnDefinition::new("id", "bigint").primary_key())
                        .column(ColumnDefinition::new("email", "text")),
                )
                .table(
                    TableDefinition::new("posts")
                        .column(ColumnDefinition::new("id", "bigint").primary_key())
                        .column(ColumnDefinition::new("author", "bigint"))
                        .foreign_key(
                            ForeignKeyDefinition::new(["author"], target, ["id"]).named("fk_author"),
                        ),
                )
        };
        let diff = compute(&snap(def("user")), &snap(def("users")));
        assert_eq!(kinds(&diff), vec!["TableRenamed"]);
    }

    #[test]
    fn index_replacement_is_adjacent() {
        let def = |cols: &[&str]| {
            SchemaDefinition::new().table(
                users()
                    .column(ColumnDefinition::new("name", "text"))
                    .index(IndexDefinition::on(cols.iter().copied()).named("ix_lookup")),
            )
        };
        let diff = compute(&snap(def(&["email"])), &snap(def(&["email", "name"])));
        assert_eq!(kinds(&diff), vec!["IndexRemoved", "IndexAdded"]);
    }

    #[test]
    fn enum_append_vs_alter() {
        let def = |values: &[&str]| {
            SchemaDefinition::new().enumeration(EnumDefinition::new("mood", values.iter().copied()))
        };
        let diff = compute(&snap(def(&["a", "b"])), &snap(def(&["a", "b", "c", "d"])));
        assert_eq!(kinds(&diff), vec!["EnumValueAdded", "EnumValueAdded"]);

        let diff = compute(&snap(def(&["a", "b"])), &snap(def(&["b", "a"])));
        assert_eq!(kinds(&diff), vec!["EnumAltered"]);

        let diff = compute(&snap(def(&["a", "b"])), &snap(SchemaDefinition::new()));
        assert_eq!(kinds(&diff), vec!["EnumRemoved"]);
    }

    #[test]
    fn inverse_restores_dropped_table() {
        let prev = snap(
            SchemaDefinition::new().table(users().index(IndexDefinition::on(["email"]).unique())),
        );
        let cur = snap(SchemaDefinition::new());
        let diff = compute(&prev, &cur);
        assert_eq!(kinds(&diff), vec!["IndexRemoved", "TableRemoved"]);
        assert_eq!(kinds(&diff.inverse()), vec!["TableAdded", "IndexAdded"]);
    }

    #[test]
    fn removal_order_breaks_cycles() {
        let def = SchemaDefinition::new()
            .table(
                TableDefinition::new("a")
                    .column(ColumnDefinition::new("id", "bigint").primary_key())
                    .column(ColumnDefinition::new("b_id", "bigint").references(
                        "b",
                        "id",
                        ForeignKeyAction::NoAction,
                    )),
            )
            .table(
                TableDefinition::new("b")
                    .column(ColumnDefinition::new("id", "bigint").primary_key())
                    .column(ColumnDefinition::new("a_id", "bigint").references(
                        "a",
                        "id",
                        ForeignKeyAction::NoAction,
                    )),
            );
        let prev = snap(def);
        let diff = Differ::new(RenameOptions::disabled())
            .unwrap()
            .compute(&prev, &SchemaSnapshot::empty());
        assert_eq!(diff.removed_tables().len(), 2);
        assert_eq!(
            kinds(&diff),
            vec![
                "ForeignKeyRemoved",
                "ForeignKeyRemoved",
                "TableRemoved",
                "TableRemoved"
            ]
        );
    }
}
