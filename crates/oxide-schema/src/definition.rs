//! Normalized schema description consumed by the snapshot builder.
//!
//! This is the contract with whatever authoring surface produces the schema
//! (derive macros, a DSL, a JSON file). Types are still plain tags here; they
//! are resolved and validated when a [`SchemaSnapshot`](crate::SchemaSnapshot)
//! is built.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{DefaultValue, ForeignKeyAction};

const fn default_true() -> bool {
    true
}

/// A single-column foreign key declared on the column itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnReference {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
    /// Action on delete.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// Action on update.
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

/// Definition of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Type tag (`uuid`, `varchar`, `decimal`, `enum:mood`, ...).
    #[serde(rename = "type")]
    pub type_name: String,
    /// Type parameters (length, precision/scale).
    #[serde(default)]
    pub params: Vec<u32>,
    /// Whether the column allows NULL values.
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Whether this column is part of the primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Whether this column has a UNIQUE constraint.
    #[serde(default)]
    pub unique: bool,
    /// Default value.
    #[serde(default)]
    pub default: Option<DefaultValue>,
    /// Semantic annotations (e.g. `pii`, `secret`). Carried, never acted on.
    #[serde(default)]
    pub annotations: Vec<String>,
    /// Inline foreign key.
    #[serde(default)]
    pub references: Option<ColumnReference>,
}

impl ColumnDefinition {
    /// Creates a nullable column with the given type tag.
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            params: Vec::new(),
            nullable: true,
            primary_key: false,
            unique: false,
            default: None,
            annotations: Vec::new(),
            references: None,
        }
    }

    /// Sets type parameters.
    #[must_use]
    pub fn params(mut self, params: &[u32]) -> Self {
        self.params = params.to_vec();
        self
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Sets the column as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Adds a semantic annotation.
    #[must_use]
    pub fn annotate(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    /// Declares an inline foreign key.
    #[must_use]
    pub fn references(
        mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        on_delete: ForeignKeyAction,
    ) -> Self {
        self.references = Some(ColumnReference {
            table: table.into(),
            column: column.into(),
            on_delete,
            on_update: ForeignKeyAction::NoAction,
        });
        self
    }
}

/// Definition of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Index name. Derived from the table and columns when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    #[serde(default)]
    pub unique: bool,
}

impl IndexDefinition {
    /// Creates an unnamed, non-unique index.
    #[must_use]
    pub fn on<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Sets an explicit name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Makes the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Definition of a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDefinition {
    /// Constraint name. Derived from the table and columns when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Column(s) in the referencing table.
    pub columns: Vec<String>,
    /// Referenced table name.
    pub references_table: String,
    /// Referenced column(s).
    pub references_columns: Vec<String>,
    /// Action on delete.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// Action on update.
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

impl ForeignKeyDefinition {
    /// Creates an unnamed foreign key with `NO ACTION` semantics.
    #[must_use]
    pub fn new<I, S>(columns: I, references_table: impl Into<String>, references_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            references_table: references_table.into(),
            references_columns: references_columns.into_iter().map(Into::into).collect(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    /// Sets an explicit name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }
}

/// Definition of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDefinition>,
    /// Indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
    /// Foreign keys (besides inline column references).
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDefinition>,
    /// Open extension bag, carried into the snapshot untouched.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TableDefinition {
    /// Creates an empty table definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKeyDefinition) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Sets a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Definition of an enum type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDefinition {
    /// Enum name.
    pub name: String,
    /// Values in declaration order (order is significant).
    pub values: Vec<String>,
}

impl EnumDefinition {
    /// Creates an enum definition.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// The complete schema as described by the authoring layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Tables.
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
    /// Enum types.
    #[serde(default)]
    pub enums: Vec<EnumDefinition>,
}

impl SchemaDefinition {
    /// Creates an empty schema definition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table.
    #[must_use]
    pub fn table(mut self, table: TableDefinition) -> Self {
        self.tables.push(table);
        self
    }

    /// Adds an enum.
    #[must_use]
    pub fn enumeration(mut self, definition: EnumDefinition) -> Self {
        self.enums.push(definition);
        self
    }

    /// Parses a JSON schema description.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_builder() {
        let col = ColumnDefinition::new("id", "uuid").primary_key();
        assert!(col.primary_key);
        assert!(!col.nullable);

        let col = ColumnDefinition::new("email", "varchar")
            .params(&[255])
            .not_null()
            .unique()
            .annotate("pii");
        assert_eq!(col.params, vec![255]);
        assert!(col.unique);
        assert_eq!(col.annotations, vec!["pii".to_string()]);
    }

    #[test]
    fn json_defaults() {
        let schema = SchemaDefinition::from_json(
            r#"{
                "tables": [
                    {
                        "name": "accounts",
                        "columns": [
                            { "name": "id", "type": "uuid", "primary_key": true, "nullable": false },
                            { "name": "label", "type": "text", "unique": true }
                        ]
                    }
                ]
            }"#,
        )
        .unwrap();

        let accounts = &schema.tables[0];
        assert_eq!(accounts.columns.len(), 2);
        assert!(accounts.columns[1].nullable);
        assert!(accounts.columns[1].unique);
        assert!(accounts.indexes.is_empty());
        assert!(schema.enums.is_empty());
    }
}
