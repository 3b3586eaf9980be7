//! SQLite dialect.
//!
//! SQLite has very limited ALTER TABLE support: no ALTER COLUMN and no
//! constraint changes on existing tables. Those changes need a table
//! rebuild, which is never generated automatically.

use super::{unsupported, MigrationDialect, Statement, StatementResult};
use crate::dialect::DialectKind;
use crate::snapshot::{ColumnSnapshot, ForeignKeySnapshot};
use crate::types::SqlType;

/// SQLite dialect for migration SQL generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn inlines_foreign_keys(&self) -> bool {
        true
    }

    fn map_type(&self, sql_type: &SqlType) -> String {
        // declared names keep their affinity and their parameters
        match sql_type {
            SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => "INTEGER".to_string(),
            SqlType::Real | SqlType::Double => "REAL".to_string(),
            SqlType::Decimal { precision, scale } => format!("DECIMAL({precision}, {scale})"),
            SqlType::Numeric { precision, scale } => format!("NUMERIC({precision}, {scale})"),
            SqlType::Char { length } => format!("CHAR({length})"),
            SqlType::Varchar { length } => format!("VARCHAR({length})"),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Text
            | SqlType::Date
            | SqlType::Time
            | SqlType::Timestamp
            | SqlType::TimestampTz
            | SqlType::Uuid
            | SqlType::Json
            | SqlType::Enum { .. } => "TEXT".to_string(),
        }
    }

    fn add_column(&self, table: &str, name: &str, column: &ColumnSnapshot) -> StatementResult {
        if column.primary_key {
            return Ok(vec![Statement::Manual(format!(
                "SQLite cannot add primary key column '{table}.{name}' to an existing table; rebuild the table"
            ))]);
        }
        if !column.nullable && column.default.is_none() {
            return Ok(vec![Statement::Manual(format!(
                "SQLite cannot add NOT NULL column '{table}.{name}' without a default; add a default or rebuild the table"
            ))]);
        }

        // ADD COLUMN rejects UNIQUE; back it with an index instead
        let plain = ColumnSnapshot {
            unique: false,
            ..column.clone()
        };
        let mut statements = vec![Statement::Sql(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(name, &plain, true)
        ))];
        if column.unique {
            statements.push(Statement::Sql(format!(
                "CREATE UNIQUE INDEX {} ON {} ({})",
                self.quote_identifier(&format!("{table}_{name}_key")),
                self.quote_identifier(table),
                self.quote_identifier(name)
            )));
        }
        Ok(statements)
    }

    fn drop_column(&self, table: &str, name: &str, column: &ColumnSnapshot) -> StatementResult {
        if column.primary_key || column.unique {
            return Ok(vec![Statement::Manual(format!(
                "SQLite cannot drop {} column '{table}.{name}'; rebuild the table",
                if column.primary_key { "primary key" } else { "UNIQUE" }
            ))]);
        }
        Ok(vec![Statement::Sql(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(name)
        ))])
    }

    fn alter_column(
        &self,
        table: &str,
        name: &str,
        from: &ColumnSnapshot,
        to: &ColumnSnapshot,
    ) -> StatementResult {
        let mut changes = Vec::new();
        if from.sql_type != to.sql_type {
            changes.push(format!("type {} -> {}", from.sql_type, to.sql_type));
        }
        if from.nullable != to.nullable {
            changes.push(if to.nullable { "drop NOT NULL" } else { "set NOT NULL" }.to_string());
        }
        if from.default != to.default {
            changes.push("default".to_string());
        }
        if from.unique != to.unique {
            changes.push(if to.unique { "add UNIQUE" } else { "drop UNIQUE" }.to_string());
        }
        if from.primary_key != to.primary_key {
            changes.push("primary key".to_string());
        }
        Ok(vec![Statement::Manual(format!(
            "SQLite cannot alter column '{table}.{name}' ({}); rebuild the table",
            changes.join(", ")
        ))])
    }

    fn add_foreign_key(&self, table: &str, fk: &ForeignKeySnapshot) -> StatementResult {
        Err(unsupported(
            self,
            "ForeignKeyAdded",
            table,
            format!(
                "cannot add foreign key '{}' to an existing table without rebuilding it",
                fk.name
            ),
        ))
    }

    fn drop_foreign_key(&self, table: &str, fk: &ForeignKeySnapshot) -> StatementResult {
        Err(unsupported(
            self,
            "ForeignKeyRemoved",
            table,
            format!(
                "cannot drop foreign key '{}' from an existing table without rebuilding it",
                fk.name
            ),
        ))
    }

    // Enums are plain TEXT columns here.

    fn create_enum(&self, _name: &str, _values: &[String]) -> StatementResult {
        Ok(Vec::new())
    }

    fn drop_enum(&self, _name: &str) -> StatementResult {
        Ok(Vec::new())
    }

    fn add_enum_value(&self, _name: &str, _value: &str) -> StatementResult {
        Ok(Vec::new())
    }

    fn alter_enum(&self, _name: &str, _from: &[String], _to: &[String]) -> StatementResult {
        Ok(Vec::new())
    }
}
