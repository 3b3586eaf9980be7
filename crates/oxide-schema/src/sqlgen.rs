//! SQL generation for a whole diff.
//!
//! Forward statements keep the diff's order. Reverse statements come from
//! [`SchemaDiff::inverse`] and are reference material only.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::diff::{DiffOperation, SchemaDiff};
use crate::dialect::{MigrationDialect, Statement, StatementResult};
use crate::error::UnsupportedOperationError;
use crate::snapshot::ForeignKeySnapshot;

/// Forward and reverse SQL for one diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSql {
    /// Statements to apply, in order.
    pub forward: Vec<Statement>,
    /// Reversal statements, for human reference.
    pub reverse: Vec<Statement>,
    /// Reasons of the manual-intervention entries in `forward`.
    pub diagnostics: Vec<String>,
}

impl GeneratedSql {
    /// Executable forward statements, without manual entries.
    pub fn executable(&self) -> impl Iterator<Item = &str> {
        self.forward.iter().filter_map(Statement::sql)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Unmapped operations abort generation.
    Strict,
    /// Unmapped operations become manual entries.
    Lenient,
}

/// Generates forward and reverse SQL for `diff`.
///
/// Fails for the whole batch if any forward operation has no mapping in
/// `dialect`; no partial statement list is returned.
pub fn generate<D: MigrationDialect + ?Sized>(
    diff: &SchemaDiff,
    dialect: &D,
) -> Result<GeneratedSql, UnsupportedOperationError> {
    let forward = statements(diff, dialect, Mode::Strict)?;
    let reverse = statements(&diff.inverse(), dialect, Mode::Lenient)?;

    let diagnostics: Vec<String> = forward
        .iter()
        .filter_map(|s| match s {
            Statement::Manual(reason) => Some(reason.clone()),
            Statement::Sql(_) => None,
        })
        .collect();
    for reason in &diagnostics {
        warn!(dialect = dialect.name(), reason = %reason, "Manual intervention required");
    }

    Ok(GeneratedSql {
        forward,
        reverse,
        diagnostics,
    })
}

fn statements<D: MigrationDialect + ?Sized>(
    diff: &SchemaDiff,
    dialect: &D,
    mode: Mode,
) -> Result<Vec<Statement>, UnsupportedOperationError> {
    let created = diff.created_tables();
    let removed = diff.removed_tables();
    let inline = dialect.inlines_foreign_keys();

    let mut inline_fks: BTreeMap<&str, Vec<&ForeignKeySnapshot>> = BTreeMap::new();
    if inline {
        for op in &diff.operations {
            if let DiffOperation::ForeignKeyAdded { table, foreign_key } = op {
                if created.contains(table.as_str()) {
                    inline_fks.entry(table).or_default().push(foreign_key);
                }
            }
        }
    }

    let mut out = Vec::new();
    for op in &diff.operations {
        match operation(op, dialect, &created, &removed, &inline_fks) {
            Ok(mut stmts) => out.append(&mut stmts),
            Err(err) if mode == Mode::Lenient => out.push(Statement::Manual(err.to_string())),
            Err(err) => return Err(err),
        }
    }
    Ok(out)
}

fn operation<D: MigrationDialect + ?Sized>(
    op: &DiffOperation,
    dialect: &D,
    created: &BTreeSet<&str>,
    removed: &BTreeSet<&str>,
    inline_fks: &BTreeMap<&str, Vec<&ForeignKeySnapshot>>,
) -> StatementResult {
    let inline = dialect.inlines_foreign_keys();
    match op {
        DiffOperation::EnumAdded { name, values } => dialect.create_enum(name, values),
        DiffOperation::EnumRemoved { name, .. } => dialect.drop_enum(name),
        DiffOperation::EnumValueAdded { name, value, .. } => dialect.add_enum_value(name, value),
        DiffOperation::EnumAltered { name, from, to } => dialect.alter_enum(name, from, to),
        DiffOperation::TableAdded { name, table } => {
            let fks = inline_fks.get(name.as_str()).map_or(&[][..], Vec::as_slice);
            dialect.create_table(name, table, fks)
        }
        DiffOperation::TableRemoved { name, .. } => dialect.drop_table(name),
        DiffOperation::TableRenamed {
            from,
            to,
            unique_columns,
            ..
        } => dialect.rename_table(from, to, unique_columns),
        DiffOperation::ColumnAdded {
            table,
            column,
            definition,
        } => dialect.add_column(table, column, definition),
        DiffOperation::ColumnRemoved {
            table,
            column,
            definition,
        } => dialect.drop_column(table, column, definition),
        DiffOperation::ColumnAltered {
            table,
            column,
            from,
            to,
        } => dialect.alter_column(table, column, from, to),
        DiffOperation::ColumnRenamed {
            table,
            from,
            to,
            unique,
            ..
        } => dialect.rename_column(table, from, to, *unique),
        DiffOperation::IndexAdded { table, index } => dialect.create_index(table, index),
        DiffOperation::IndexRemoved { table, .. } if removed.contains(table.as_str()) => {
            Ok(Vec::new())
        }
        DiffOperation::IndexRemoved { table, index } => dialect.drop_index(table, index),
        DiffOperation::ForeignKeyAdded { table, .. }
            if inline && created.contains(table.as_str()) =>
        {
            Ok(Vec::new())
        }
        DiffOperation::ForeignKeyAdded { table, foreign_key } => {
            dialect.add_foreign_key(table, foreign_key)
        }
        DiffOperation::ForeignKeyRemoved { table, .. }
            if inline && removed.contains(table.as_str()) =>
        {
            Ok(Vec::new())
        }
        DiffOperation::ForeignKeyRemoved { table, foreign_key } => {
            dialect.drop_foreign_key(table, foreign_key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ColumnDefinition, SchemaDefinition, TableDefinition};
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::diff::compute;
    use crate::snapshot::SchemaSnapshot;
    use crate::types::ForeignKeyAction;

    fn blog(with_posts: bool) -> SchemaSnapshot {
        let mut def = SchemaDefinition::new().table(
            TableDefinition::new("users").column(ColumnDefinition::new("id", "bigint").primary_key()),
        );
        if with_posts {
            def = def.table(
                TableDefinition::new("posts")
                    .column(ColumnDefinition::new("id", "bigint").primary_key())
                    .column(ColumnDefinition::new("user_id", "bigint").not_null().references(
                        "users",
                        "id",
                        ForeignKeyAction::Cascade,
                    )),
            );
        }
        SchemaSnapshot::build(&def).unwrap()
    }

    #[test]
    fn sqlite_inlines_foreign_keys_of_new_tables() {
        let diff = compute(&blog(false), &blog(true));
        let sql = generate(&diff, &SqliteDialect::new()).unwrap();
        assert_eq!(sql.forward.len(), 1);
        let create = sql.forward[0].sql().unwrap();
        assert!(create.starts_with("CREATE TABLE \"posts\""));
        assert!(create.contains(
            "CONSTRAINT \"fk_posts_user_id\" FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE"
        ));
        assert_eq!(
            sql.reverse,
            vec![Statement::Sql("DROP TABLE \"posts\"".into())]
        );
    }

    #[test]
    fn postgres_adds_foreign_keys_after_create() {
        let diff = compute(&blog(false), &blog(true));
        let sql = generate(&diff, &PostgresDialect::new()).unwrap();
        assert_eq!(sql.forward.len(), 2);
        assert!(sql.forward[0].sql().unwrap().starts_with("CREATE TABLE \"posts\""));
        assert!(sql.forward[1]
            .sql()
            .unwrap()
            .starts_with("ALTER TABLE \"posts\" ADD CONSTRAINT \"fk_posts_user_id\""));
        assert_eq!(
            sql.reverse,
            vec![
                Statement::Sql(
                    "ALTER TABLE \"posts\" DROP CONSTRAINT \"fk_posts_user_id\"".into()
                ),
                Statement::Sql("DROP TABLE \"posts\"".into()),
            ]
        );
    }

    #[test]
    fn strict_fails_whole_batch() {
        // a new FK on an existing sqlite table has no mapping
        let before = SchemaSnapshot::build(
            &SchemaDefinition::new()
                .table(TableDefinition::new("users").column(ColumnDefinition::new("id", "bigint").primary_key()))
                .table(
                    TableDefinition::new("posts")
                        .column(ColumnDefinition::new("id", "bigint").primary_key())
                        .column(ColumnDefinition::new("user_id", "bigint")),
                ),
        )
        .unwrap();
        let after = blog(true);
        let diff = compute(&before, &after);
        let err = generate(&diff, &SqliteDialect::new()).unwrap_err();
        assert_eq!(err.operation, "ForeignKeyAdded");

        let lenient = statements(&diff, &SqliteDialect::new(), Mode::Lenient).unwrap();
        assert!(lenient.iter().all(Statement::is_manual));
        assert!(lenient
            .iter()
            .any(|s| s.to_string().contains("cannot add foreign key 'fk_posts_user_id'")));
    }

    #[test]
    fn diagnostics_collected() {
        let before = blog(false);
        let after = SchemaSnapshot::build(&SchemaDefinition::new().table(
            TableDefinition::new("users").column(ColumnDefinition::new("id", "integer").primary_key()),
        ))
        .unwrap();
        let diff = compute(&before, &after);
        let sql = generate(&diff, &SqliteDialect::new()).unwrap();
        assert_eq!(sql.diagnostics.len(), 1);
        assert_eq!(sql.executable().count(), 0);
        assert!(sql.reverse[0].is_manual());
    }
}
