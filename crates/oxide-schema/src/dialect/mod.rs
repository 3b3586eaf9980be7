//! Dialect-specific SQL generation.
//!
//! [`MigrationDialect`] maps each diff operation onto DDL statements. The
//! provided methods emit standard SQL; dialects override what their engine
//! does differently.

mod postgres;
mod sqlite;

use std::fmt;
use std::str::FromStr;

pub use postgres::PostgresDialect;
use serde::{Deserialize, Serialize};
pub use sqlite::SqliteDialect;

use crate::error::UnsupportedOperationError;
use crate::snapshot::{ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, TableSnapshot};
use crate::types::{DefaultValue, SqlType};

/// Prefix of a rendered manual-intervention diagnostic.
pub const MANUAL_PREFIX: &str = "-- UNSUPPORTED (manual intervention required): ";

/// A single generated statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Statement {
    /// Executable SQL, without a trailing semicolon.
    Sql(String),
    /// Something the dialect cannot express safely. Never executed.
    Manual(String),
}

impl Statement {
    /// Returns `true` for manual-intervention diagnostics.
    #[must_use]
    pub const fn is_manual(&self) -> bool {
        matches!(self, Self::Manual(_))
    }

    /// The SQL text, if this is executable.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Sql(sql) => Some(sql),
            Self::Manual(_) => None,
        }
    }

    /// Parses a rendered statement back (the inverse of `Display`).
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text.strip_prefix(MANUAL_PREFIX) {
            Some(reason) => Self::Manual(reason.to_string()),
            None => Self::Sql(text.trim_end_matches(';').trim_end().to_string()),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(sql) => write!(f, "{sql};"),
            Self::Manual(reason) => write!(f, "{MANUAL_PREFIX}{reason}"),
        }
    }
}

/// Supported target dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// SQLite.
    Sqlite,
    /// PostgreSQL.
    #[serde(alias = "postgresql")]
    Postgres,
}

impl DialectKind {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("unknown dialect '{other}' (expected sqlite or postgres)")),
        }
    }
}

/// Operation result: zero or more statements, or no mapping at all.
pub type StatementResult = Result<Vec<Statement>, UnsupportedOperationError>;

/// Trait for dialect-specific migration SQL.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the dialect kind.
    fn kind(&self) -> DialectKind;

    /// Whether DDL can run inside a transaction.
    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    /// Whether foreign keys of a table created in the same batch are
    /// written into its `CREATE TABLE` instead of separate statements.
    fn inlines_foreign_keys(&self) -> bool {
        false
    }

    /// Maps a canonical type to the dialect's type name.
    fn map_type(&self, sql_type: &SqlType) -> String;

    /// Quotes an identifier.
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quotes a string literal.
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Renders a default value.
    fn render_default(&self, default: &DefaultValue) -> String {
        match default {
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::Bool(true) => "TRUE".to_string(),
            DefaultValue::Bool(false) => "FALSE".to_string(),
            DefaultValue::Integer(i) => i.to_string(),
            DefaultValue::Float(v) => v.to_string(),
            DefaultValue::String(s) => self.quote_literal(s),
            DefaultValue::Expression(expr) => expr.clone(),
        }
    }

    /// Renders a column definition. `inline_primary_key` is `false` when the
    /// table has a composite key declared as a table constraint.
    fn column_definition(
        &self,
        name: &str,
        column: &ColumnSnapshot,
        inline_primary_key: bool,
    ) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(name),
            self.map_type(&column.sql_type)
        );
        if column.primary_key && inline_primary_key {
            sql.push_str(" PRIMARY KEY");
        } else {
            if !column.nullable {
                sql.push_str(" NOT NULL");
            }
            if column.unique && !column.primary_key {
                sql.push_str(" UNIQUE");
            }
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.render_default(default));
        }
        sql
    }

    /// Renders a `CONSTRAINT ... FOREIGN KEY ...` clause.
    fn foreign_key_clause(&self, fk: &ForeignKeySnapshot) -> String {
        let cols: Vec<String> = fk.columns.iter().map(|c| self.quote_identifier(c)).collect();
        let ref_cols: Vec<String> = fk
            .references_columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.quote_identifier(&fk.name),
            cols.join(", "),
            self.quote_identifier(&fk.references_table),
            ref_cols.join(", "),
            fk.on_delete.as_sql(),
            fk.on_update.as_sql()
        )
    }

    /// Generates CREATE TABLE. Primary key columns come first.
    fn create_table(
        &self,
        name: &str,
        table: &TableSnapshot,
        foreign_keys: &[&ForeignKeySnapshot],
    ) -> StatementResult {
        let primary = table.primary_key();
        let inline_pk = primary.len() == 1;

        let ordered = primary
            .iter()
            .filter_map(|c| table.columns().get_key_value(*c))
            .chain(table.columns().iter().filter(|(_, c)| !c.primary_key));
        let mut parts: Vec<String> = ordered
            .map(|(n, c)| format!("    {}", self.column_definition(n, c, inline_pk)))
            .collect();

        if primary.len() > 1 {
            let cols: Vec<String> = primary.iter().map(|c| self.quote_identifier(c)).collect();
            parts.push(format!("    PRIMARY KEY ({})", cols.join(", ")));
        }
        for fk in foreign_keys {
            parts.push(format!("    {}", self.foreign_key_clause(fk)));
        }

        Ok(vec![Statement::Sql(format!(
            "CREATE TABLE {} (\n{}\n)",
            self.quote_identifier(name),
            parts.join(",\n")
        ))])
    }

    /// Generates DROP TABLE.
    fn drop_table(&self, name: &str) -> StatementResult {
        Ok(vec![Statement::Sql(format!(
            "DROP TABLE {}",
            self.quote_identifier(name)
        ))])
    }

    /// Generates RENAME TABLE. `unique_columns` carry inline unique
    /// constraints named after the old table.
    fn rename_table(&self, from: &str, to: &str, _unique_columns: &[String]) -> StatementResult {
        Ok(vec![Statement::Sql(format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(from),
            self.quote_identifier(to)
        ))])
    }

    /// Generates ADD COLUMN.
    fn add_column(&self, table: &str, name: &str, column: &ColumnSnapshot) -> StatementResult {
        Ok(vec![Statement::Sql(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(name, column, true)
        ))])
    }

    /// Generates DROP COLUMN.
    fn drop_column(&self, table: &str, name: &str, _column: &ColumnSnapshot) -> StatementResult {
        Ok(vec![Statement::Sql(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(name)
        ))])
    }

    /// Generates RENAME COLUMN. `unique` is set when the column carries an
    /// inline unique constraint.
    fn rename_column(&self, table: &str, from: &str, to: &str, _unique: bool) -> StatementResult {
        Ok(vec![Statement::Sql(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_identifier(table),
            self.quote_identifier(from),
            self.quote_identifier(to)
        ))])
    }

    /// Generates the statements turning column `from` into column `to`.
    fn alter_column(
        &self,
        table: &str,
        name: &str,
        from: &ColumnSnapshot,
        to: &ColumnSnapshot,
    ) -> StatementResult;

    /// Generates CREATE INDEX.
    fn create_index(&self, table: &str, index: &IndexSnapshot) -> StatementResult {
        let cols: Vec<String> = index.columns.iter().map(|c| self.quote_identifier(c)).collect();
        Ok(vec![Statement::Sql(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index.name),
            self.quote_identifier(table),
            cols.join(", ")
        ))])
    }

    /// Generates DROP INDEX.
    fn drop_index(&self, _table: &str, index: &IndexSnapshot) -> StatementResult {
        Ok(vec![Statement::Sql(format!(
            "DROP INDEX {}",
            self.quote_identifier(&index.name)
        ))])
    }

    /// Generates ADD FOREIGN KEY on an existing table.
    fn add_foreign_key(&self, table: &str, fk: &ForeignKeySnapshot) -> StatementResult {
        Ok(vec![Statement::Sql(format!(
            "ALTER TABLE {} ADD {}",
            self.quote_identifier(table),
            self.foreign_key_clause(fk)
        ))])
    }

    /// Generates DROP FOREIGN KEY.
    fn drop_foreign_key(&self, table: &str, fk: &ForeignKeySnapshot) -> StatementResult {
        Ok(vec![Statement::Sql(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_identifier(table),
            self.quote_identifier(&fk.name)
        ))])
    }

    /// Generates CREATE TYPE for an enum.
    fn create_enum(&self, name: &str, values: &[String]) -> StatementResult;

    /// Generates DROP TYPE for an enum.
    fn drop_enum(&self, name: &str) -> StatementResult;

    /// Appends a value to an enum.
    fn add_enum_value(&self, name: &str, value: &str) -> StatementResult;

    /// Any other enum change.
    fn alter_enum(&self, name: &str, from: &[String], to: &[String]) -> StatementResult;
}

/// Builds an [`UnsupportedOperationError`] for `dialect`.
pub(crate) fn unsupported<D: MigrationDialect + ?Sized>(
    dialect: &D,
    operation: &str,
    table: &str,
    detail: impl Into<String>,
) -> UnsupportedOperationError {
    UnsupportedOperationError {
        dialect: dialect.name().to_string(),
        operation: operation.to_string(),
        table: table.to_string(),
        detail: detail.into(),
    }
}
