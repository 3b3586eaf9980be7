//! PostgreSQL dialect.

use super::{MigrationDialect, Statement, StatementResult};
use crate::dialect::DialectKind;
use crate::snapshot::ColumnSnapshot;
use crate::types::SqlType;

/// PostgreSQL dialect for migration SQL generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Name PostgreSQL gives an inline `UNIQUE` column constraint.
    fn unique_constraint_name(table: &str, column: &str) -> String {
        format!("{table}_{column}_key")
    }
}

impl MigrationDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn map_type(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Decimal { precision, scale } => format!("DECIMAL({precision}, {scale})"),
            SqlType::Numeric { precision, scale } => format!("NUMERIC({precision}, {scale})"),
            SqlType::Char { length } => format!("CHAR({length})"),
            SqlType::Varchar { length } => format!("VARCHAR({length})"),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::TimestampTz => "TIMESTAMPTZ".to_string(),
            SqlType::Uuid => "UUID".to_string(),
            SqlType::Json => "JSONB".to_string(),
            SqlType::Blob => "BYTEA".to_string(),
            SqlType::Enum { name } => self.quote_identifier(name),
        }
    }

    fn rename_table(&self, from: &str, to: &str, unique_columns: &[String]) -> StatementResult {
        let t = self.quote_identifier(to);
        let mut statements = vec![Statement::Sql(format!(
            "ALTER TABLE {} RENAME TO {t}",
            self.quote_identifier(from)
        ))];
        // constraint names don't follow the table
        for column in unique_columns {
            statements.push(Statement::Sql(format!(
                "ALTER TABLE {t} RENAME CONSTRAINT {} TO {}",
                self.quote_identifier(&Self::unique_constraint_name(from, column)),
                self.quote_identifier(&Self::unique_constraint_name(to, column))
            )));
        }
        Ok(statements)
    }

    fn rename_column(&self, table: &str, from: &str, to: &str, unique: bool) -> StatementResult {
        let t = self.quote_identifier(table);
        let mut statements = vec![Statement::Sql(format!(
            "ALTER TABLE {t} RENAME COLUMN {} TO {}",
            self.quote_identifier(from),
            self.quote_identifier(to)
        ))];
        if unique {
            statements.push(Statement::Sql(format!(
                "ALTER TABLE {t} RENAME CONSTRAINT {} TO {}",
                self.quote_identifier(&Self::unique_constraint_name(table, from)),
                self.quote_identifier(&Self::unique_constraint_name(table, to))
            )));
        }
        Ok(statements)
    }

    fn alter_column(
        &self,
        table: &str,
        name: &str,
        from: &ColumnSnapshot,
        to: &ColumnSnapshot,
    ) -> StatementResult {
        let t = self.quote_identifier(table);
        let c = self.quote_identifier(name);
        let mut statements = Vec::new();

        if from.primary_key != to.primary_key {
            statements.push(Statement::Manual(format!(
                "changing the primary key of '{table}' (column '{name}') requires a manual migration"
            )));
        }
        if from.sql_type != to.sql_type {
            let ty = self.map_type(&to.sql_type);
            statements.push(Statement::Sql(format!(
                "ALTER TABLE {t} ALTER COLUMN {c} TYPE {ty} USING {c}::{ty}"
            )));
        }
        if from.nullable != to.nullable && !to.primary_key {
            let action = if to.nullable { "DROP" } else { "SET" };
            statements.push(Statement::Sql(format!(
                "ALTER TABLE {t} ALTER COLUMN {c} {action} NOT NULL"
            )));
        }
        if from.default != to.default {
            statements.push(Statement::Sql(match &to.default {
                Some(default) => format!(
                    "ALTER TABLE {t} ALTER COLUMN {c} SET DEFAULT {}",
                    self.render_default(default)
                ),
                None => format!("ALTER TABLE {t} ALTER COLUMN {c} DROP DEFAULT"),
            }));
        }
        if from.unique != to.unique {
            let constraint = self.quote_identifier(&Self::unique_constraint_name(table, name));
            statements.push(Statement::Sql(if to.unique {
                format!("ALTER TABLE {t} ADD CONSTRAINT {constraint} UNIQUE ({c})")
            } else {
                format!("ALTER TABLE {t} DROP CONSTRAINT {constraint}")
            }));
        }
        Ok(statements)
    }

    fn create_enum(&self, name: &str, values: &[String]) -> StatementResult {
        let values: Vec<String> = values.iter().map(|v| self.quote_literal(v)).collect();
        Ok(vec![Statement::Sql(format!(
            "CREATE TYPE {} AS ENUM ({})",
            self.quote_identifier(name),
            values.join(", ")
        ))])
    }

    fn drop_enum(&self, name: &str) -> StatementResult {
        Ok(vec![Statement::Sql(format!(
            "DROP TYPE {}",
            self.quote_identifier(name)
        ))])
    }

    fn add_enum_value(&self, name: &str, value: &str) -> StatementResult {
        Ok(vec![Statement::Sql(format!(
            "ALTER TYPE {} ADD VALUE {}",
            self.quote_identifier(name),
            self.quote_literal(value)
        ))])
    }

    fn alter_enum(&self, name: &str, from: &[String], to: &[String]) -> StatementResult {
        Ok(vec![Statement::Manual(format!(
            "enum '{name}' changes from [{}] to [{}]; PostgreSQL cannot remove or reorder enum values in place",
            from.join(", "),
            to.join(", ")
        ))])
    }
}
