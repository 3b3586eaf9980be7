//! Immutable, canonically ordered schema snapshots.
//!
//! A [`SchemaSnapshot`] is built once from a [`SchemaDefinition`] and never
//! mutated afterwards. Tables, columns and enums live in `BTreeMap`s and
//! indexes/foreign keys are sorted by name, so two structurally equal schemas
//! serialize to identical bytes no matter how they were declared.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::definition::{ColumnDefinition, ForeignKeyDefinition, SchemaDefinition, TableDefinition};
use crate::error::SnapshotError;
use crate::types::{DefaultValue, ForeignKeyAction, SqlType, TypeParseError};

/// Current version of the serialized snapshot format.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A snapshot of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    /// Resolved SQL type.
    pub sql_type: SqlType,
    /// Whether the column is nullable.
    pub nullable: bool,
    /// Whether this column is (part of) the primary key.
    pub primary_key: bool,
    /// Whether this column has a UNIQUE constraint.
    pub unique: bool,
    /// Default value, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Semantic annotations, carried through but never interpreted.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub annotations: BTreeSet<String>,
}

impl ColumnSnapshot {
    /// Creates a nullable column snapshot of the given type.
    #[must_use]
    pub fn new(sql_type: SqlType) -> Self {
        Self {
            sql_type,
            nullable: true,
            primary_key: false,
            unique: false,
            default: None,
            annotations: BTreeSet::new(),
        }
    }

    /// Returns `true` if the two columns differ in anything the database
    /// cares about. Annotations are ignored.
    #[must_use]
    pub fn structurally_differs(&self, other: &Self) -> bool {
        self.sql_type != other.sql_type
            || self.nullable != other.nullable
            || self.primary_key != other.primary_key
            || self.unique != other.unique
            || self.default != other.default
    }
}

/// A snapshot of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Index name.
    pub name: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Whether this is a UNIQUE index.
    pub unique: bool,
}

impl IndexSnapshot {
    /// Two indexes are equivalent if they cover the same columns with the
    /// same uniqueness. Names are ignored.
    #[must_use]
    pub fn equivalent(&self, other: &Self) -> bool {
        self.columns == other.columns && self.unique == other.unique
    }
}

/// A snapshot of a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeySnapshot {
    /// Constraint name.
    pub name: String,
    /// Columns in this table.
    pub columns: Vec<String>,
    /// Referenced table.
    pub references_table: String,
    /// Referenced columns.
    pub references_columns: Vec<String>,
    /// ON DELETE action.
    pub on_delete: ForeignKeyAction,
    /// ON UPDATE action.
    pub on_update: ForeignKeyAction,
}

impl ForeignKeySnapshot {
    /// Two foreign keys are equivalent if they link the same columns to the
    /// same target with the same actions. Names are ignored.
    #[must_use]
    pub fn equivalent(&self, other: &Self) -> bool {
        self.columns == other.columns
            && self.references_table == other.references_table
            && self.references_columns == other.references_columns
            && self.on_delete == other.on_delete
            && self.on_update == other.on_update
    }
}

/// A snapshot of a single table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    columns: BTreeMap<String, ColumnSnapshot>,
    /// Primary key columns in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    primary_key: Vec<String>,
    #[serde(default)]
    indexes: Vec<IndexSnapshot>,
    #[serde(default)]
    foreign_keys: Vec<ForeignKeySnapshot>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl TableSnapshot {
    pub(crate) fn from_parts(
        columns: BTreeMap<String, ColumnSnapshot>,
        primary_key: Vec<String>,
        mut indexes: Vec<IndexSnapshot>,
        mut foreign_keys: Vec<ForeignKeySnapshot>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        foreign_keys.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            columns,
            primary_key,
            indexes,
            foreign_keys,
            metadata,
        }
    }

    /// Columns keyed by name.
    #[must_use]
    pub const fn columns(&self) -> &BTreeMap<String, ColumnSnapshot> {
        &self.columns
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSnapshot> {
        self.columns.get(name)
    }

    /// Indexes, sorted by name.
    #[must_use]
    pub fn indexes(&self) -> &[IndexSnapshot] {
        &self.indexes
    }

    /// Foreign keys, sorted by name.
    #[must_use]
    pub fn foreign_keys(&self) -> &[ForeignKeySnapshot] {
        &self.foreign_keys
    }

    /// Extension metadata. Never interpreted by the differ.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Names of the primary key columns, in declaration order.
    #[must_use]
    pub fn primary_key(&self) -> Vec<&str> {
        if self.primary_key.is_empty() {
            // decoded without a recorded order
            return self
                .columns
                .iter()
                .filter(|(_, c)| c.primary_key)
                .map(|(n, _)| n.as_str())
                .collect();
        }
        self.primary_key.iter().map(String::as_str).collect()
    }

    /// Tables this table points at through its foreign keys.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.foreign_keys
            .iter()
            .map(|fk| fk.references_table.as_str())
    }
}

/// A snapshot of an entire database schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    version: u32,
    tables: BTreeMap<String, TableSnapshot>,
    #[serde(default)]
    enums: BTreeMap<String, Vec<String>>,
}

impl Default for SchemaSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl SchemaSnapshot {
    /// The snapshot of an empty database (first run).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            tables: BTreeMap::new(),
            enums: BTreeMap::new(),
        }
    }

    /// Builds a snapshot from a schema definition.
    ///
    /// Fails on duplicate names, unknown type tags, dangling enum, column or
    /// table references. Nothing is silently merged or dropped.
    pub fn build(definition: &SchemaDefinition) -> Result<Self, SnapshotError> {
        let mut enums = BTreeMap::new();
        for e in &definition.enums {
            let mut seen = BTreeSet::new();
            for value in &e.values {
                if !seen.insert(value.as_str()) {
                    return Err(SnapshotError::DuplicateEnumValue {
                        name: e.name.clone(),
                        value: value.clone(),
                    });
                }
            }
            if enums.insert(e.name.clone(), e.values.clone()).is_some() {
                return Err(SnapshotError::DuplicateEnum {
                    name: e.name.clone(),
                });
            }
        }

        let mut tables = BTreeMap::new();
        for table in &definition.tables {
            if tables.contains_key(&table.name) {
                return Err(SnapshotError::DuplicateTable {
                    table: table.name.clone(),
                });
            }
            let snapshot = build_table(table, &enums)?;
            tables.insert(table.name.clone(), snapshot);
        }

        // Foreign key targets can only be checked once every table exists.
        for (name, table) in &tables {
            for fk in &table.foreign_keys {
                let target = tables.get(&fk.references_table).ok_or_else(|| {
                    SnapshotError::UnknownTable {
                        table: name.clone(),
                        name: fk.name.clone(),
                        target: fk.references_table.clone(),
                    }
                })?;
                if let Some(missing) = fk
                    .references_columns
                    .iter()
                    .find(|c| !target.columns.contains_key(*c))
                {
                    return Err(SnapshotError::UnknownColumn {
                        table: fk.references_table.clone(),
                        column: missing.clone(),
                        context: format!("Foreign key '{}'", fk.name),
                    });
                }
            }
        }

        Ok(Self {
            version: SNAPSHOT_FORMAT_VERSION,
            tables,
            enums,
        })
    }

    /// Format version this snapshot was written with.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Tables keyed by name.
    #[must_use]
    pub const fn tables(&self) -> &BTreeMap<String, TableSnapshot> {
        &self.tables
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.get(name)
    }

    /// Enum types keyed by name, values in declaration order.
    #[must_use]
    pub const fn enums(&self) -> &BTreeMap<String, Vec<String>> {
        &self.enums
    }

    /// Returns `true` if the snapshot has no tables and no enums.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.enums.is_empty()
    }

    /// Serializes to the canonical pretty-printed JSON document.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parses a JSON document, rejecting formats newer than this build.
    pub fn from_json(json: &str) -> Result<Self, SnapshotDecodeError> {
        #[derive(Deserialize)]
        struct VersionHeader {
            version: u32,
        }

        let header: VersionHeader = serde_json::from_str(json)?;
        if header.version > SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: header.version,
                supported: SNAPSHOT_FORMAT_VERSION,
            }
            .into());
        }
        Ok(serde_json::from_str(json)?)
    }
}

/// Failure to decode a persisted snapshot document.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotDecodeError {
    /// Not a valid snapshot document.
    #[error("Malformed snapshot document: {0}")]
    Json(#[from] serde_json::Error),
    /// Valid document, unusable content.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

fn build_table(
    table: &TableDefinition,
    enums: &BTreeMap<String, Vec<String>>,
) -> Result<TableSnapshot, SnapshotError> {
    let mut columns = BTreeMap::new();
    let mut foreign_keys: Vec<ForeignKeyDefinition> = table.foreign_keys.clone();

    for column in &table.columns {
        if columns.contains_key(&column.name) {
            return Err(SnapshotError::DuplicateColumn {
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }
        let snapshot = build_column(&table.name, column, enums)?;
        if let Some(reference) = &column.references {
            foreign_keys.push(ForeignKeyDefinition {
                name: None,
                columns: vec![column.name.clone()],
                references_table: reference.table.clone(),
                references_columns: vec![reference.column.clone()],
                on_delete: reference.on_delete,
                on_update: reference.on_update,
            });
        }
        columns.insert(column.name.clone(), snapshot);
    }

    let mut indexes = Vec::with_capacity(table.indexes.len());
    let mut index_names = BTreeSet::new();
    for index in &table.indexes {
        let name = index.name.clone().unwrap_or_else(|| {
            let prefix = if index.unique { "uq" } else { "idx" };
            derived_name(prefix, &table.name, &index.columns)
        });
        if index.columns.is_empty() {
            return Err(SnapshotError::EmptyIndex {
                table: table.name.clone(),
                index: name,
            });
        }
        check_columns(table, &columns, &index.columns, || format!("Index '{name}'"))?;
        if !index_names.insert(name.clone()) {
            return Err(SnapshotError::DuplicateIndex {
                table: table.name.clone(),
                index: name,
            });
        }
        indexes.push(IndexSnapshot {
            name,
            columns: index.columns.clone(),
            unique: index.unique,
        });
    }

    let mut fks = Vec::with_capacity(foreign_keys.len());
    let mut fk_names = BTreeSet::new();
    for fk in foreign_keys {
        let name = fk
            .name
            .clone()
            .unwrap_or_else(|| derived_name("fk", &table.name, &fk.columns));
        if fk.columns.is_empty() || fk.columns.len() != fk.references_columns.len() {
            return Err(SnapshotError::ForeignKeyArity {
                table: table.name.clone(),
                name,
            });
        }
        check_columns(table, &columns, &fk.columns, || {
            format!("Foreign key '{name}'")
        })?;
        if !fk_names.insert(name.clone()) {
            return Err(SnapshotError::DuplicateForeignKey {
                table: table.name.clone(),
                name,
            });
        }
        fks.push(ForeignKeySnapshot {
            name,
            columns: fk.columns,
            references_table: fk.references_table,
            references_columns: fk.references_columns,
            on_delete: fk.on_delete,
            on_update: fk.on_update,
        });
    }

    let primary_key = table
        .columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.clone())
        .collect();

    Ok(TableSnapshot::from_parts(
        columns,
        primary_key,
        indexes,
        fks,
        table.metadata.clone(),
    ))
}

fn build_column(
    table: &str,
    column: &ColumnDefinition,
    enums: &BTreeMap<String, Vec<String>>,
) -> Result<ColumnSnapshot, SnapshotError> {
    let sql_type = SqlType::parse(&column.type_name, &column.params).map_err(|e| match e {
        TypeParseError::Unknown => SnapshotError::UnknownType {
            table: table.to_string(),
            column: column.name.clone(),
            type_name: column.type_name.clone(),
        },
        TypeParseError::Parameters => SnapshotError::InvalidTypeParameters {
            table: table.to_string(),
            column: column.name.clone(),
            type_name: column.type_name.clone(),
            params: column.params.clone(),
        },
    })?;

    if let Some(name) = sql_type.enum_name() {
        if !enums.contains_key(name) {
            return Err(SnapshotError::UnknownEnum {
                table: table.to_string(),
                column: column.name.clone(),
                name: name.to_string(),
            });
        }
    }

    Ok(ColumnSnapshot {
        sql_type,
        // primary keys are never nullable
        nullable: column.nullable && !column.primary_key,
        primary_key: column.primary_key,
        unique: column.unique,
        default: column.default.clone(),
        annotations: column.annotations.iter().cloned().collect(),
    })
}

fn check_columns(
    table: &TableDefinition,
    columns: &BTreeMap<String, ColumnSnapshot>,
    referenced: &[String],
    context: impl Fn() -> String,
) -> Result<(), SnapshotError> {
    match referenced.iter().find(|c| !columns.contains_key(*c)) {
        Some(missing) => Err(SnapshotError::UnknownColumn {
            table: table.name.clone(),
            column: missing.clone(),
            context: context(),
        }),
        None => Ok(()),
    }
}

fn derived_name(prefix: &str, table: &str, columns: &[String]) -> String {
    format!("{prefix}_{table}_{}", columns.join("_"))
}
