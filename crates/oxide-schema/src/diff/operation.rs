//! Diff operations.
//!
//! Each variant carries everything needed to generate its forward SQL and
//! its inverse, so SQL generation never has to look back at a snapshot.

use serde::{Deserialize, Serialize};

use crate::snapshot::{ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, TableSnapshot};

/// One atomic structural change between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DiffOperation {
    /// A new enum type.
    EnumAdded {
        /// Enum name.
        name: String,
        /// Values in order.
        values: Vec<String>,
    },
    /// An enum type that no longer exists.
    EnumRemoved {
        /// Enum name.
        name: String,
        /// Values it had.
        values: Vec<String>,
    },
    /// A value appended to the end of an existing enum.
    EnumValueAdded {
        /// Enum name.
        name: String,
        /// Appended value.
        value: String,
        /// Values before this one was appended.
        before: Vec<String>,
    },
    /// Any enum change other than appending (removal, reorder, insert).
    EnumAltered {
        /// Enum name.
        name: String,
        /// Previous values.
        from: Vec<String>,
        /// New values.
        to: Vec<String>,
    },
    /// A new table. Indexes and foreign keys follow as separate operations.
    TableAdded {
        /// Table name.
        name: String,
        /// Columns and metadata only.
        table: TableSnapshot,
    },
    /// A dropped table. Its indexes and foreign keys are removed by
    /// preceding operations.
    TableRemoved {
        /// Table name.
        name: String,
        /// Columns and metadata only.
        table: TableSnapshot,
    },
    /// A table detected as renamed.
    TableRenamed {
        /// Old name.
        from: String,
        /// New name.
        to: String,
        /// Rename score.
        confidence: f64,
        /// Columns carrying an inline unique constraint, named as they are
        /// when the table is renamed.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        unique_columns: Vec<String>,
    },
    /// A new column on an existing table.
    ColumnAdded {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Column definition.
        definition: ColumnSnapshot,
    },
    /// A dropped column.
    ColumnRemoved {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Definition it had.
        definition: ColumnSnapshot,
    },
    /// A column whose type, nullability, keys or default changed.
    ColumnAltered {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Previous definition.
        from: ColumnSnapshot,
        /// New definition.
        to: ColumnSnapshot,
    },
    /// A column detected as renamed.
    ColumnRenamed {
        /// Table name.
        table: String,
        /// Old name.
        from: String,
        /// New name.
        to: String,
        /// Rename score.
        confidence: f64,
        /// Whether the column carries an inline unique constraint.
        #[serde(default)]
        unique: bool,
    },
    /// A new index.
    IndexAdded {
        /// Table name.
        table: String,
        /// Index definition.
        index: IndexSnapshot,
    },
    /// A dropped index.
    IndexRemoved {
        /// Table name.
        table: String,
        /// Definition it had.
        index: IndexSnapshot,
    },
    /// A new foreign key.
    ForeignKeyAdded {
        /// Table name.
        table: String,
        /// Constraint definition.
        foreign_key: ForeignKeySnapshot,
    },
    /// A dropped foreign key.
    ForeignKeyRemoved {
        /// Table name.
        table: String,
        /// Definition it had.
        foreign_key: ForeignKeySnapshot,
    },
}

impl DiffOperation {
    /// Variant name, used in diagnostics and errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::EnumAdded { .. } => "EnumAdded",
            Self::EnumRemoved { .. } => "EnumRemoved",
            Self::EnumValueAdded { .. } => "EnumValueAdded",
            Self::EnumAltered { .. } => "EnumAltered",
            Self::TableAdded { .. } => "TableAdded",
            Self::TableRemoved { .. } => "TableRemoved",
            Self::TableRenamed { .. } => "TableRenamed",
            Self::ColumnAdded { .. } => "ColumnAdded",
            Self::ColumnRemoved { .. } => "ColumnRemoved",
            Self::ColumnAltered { .. } => "ColumnAltered",
            Self::ColumnRenamed { .. } => "ColumnRenamed",
            Self::IndexAdded { .. } => "IndexAdded",
            Self::IndexRemoved { .. } => "IndexRemoved",
            Self::ForeignKeyAdded { .. } => "ForeignKeyAdded",
            Self::ForeignKeyRemoved { .. } => "ForeignKeyRemoved",
        }
    }

    /// The table (or enum, for enum operations) this operation touches.
    /// Renames report the new name.
    #[must_use]
    pub fn subject(&self) -> &str {
        match self {
            Self::EnumAdded { name, .. }
            | Self::EnumRemoved { name, .. }
            | Self::EnumValueAdded { name, .. }
            | Self::EnumAltered { name, .. }
            | Self::TableAdded { name, .. }
            | Self::TableRemoved { name, .. } => name,
            Self::TableRenamed { to, .. } => to,
            Self::ColumnAdded { table, .. }
            | Self::ColumnRemoved { table, .. }
            | Self::ColumnAltered { table, .. }
            | Self::ColumnRenamed { table, .. }
            | Self::IndexAdded { table, .. }
            | Self::IndexRemoved { table, .. }
            | Self::ForeignKeyAdded { table, .. }
            | Self::ForeignKeyRemoved { table, .. } => table,
        }
    }

    /// Returns the semantic inverse of this operation.
    #[must_use]
    pub fn inverse(&self) -> Self {
        match self.clone() {
            Self::EnumAdded { name, values } => Self::EnumRemoved { name, values },
            Self::EnumRemoved { name, values } => Self::EnumAdded { name, values },
            Self::EnumValueAdded {
                name,
                value,
                before,
            } => {
                let mut from = before.clone();
                from.push(value);
                Self::EnumAltered {
                    name,
                    from,
                    to: before,
                }
            }
            Self::EnumAltered { name, from, to } => Self::EnumAltered {
                name,
                from: to,
                to: from,
            },
            Self::TableAdded { name, table } => Self::TableRemoved { name, table },
            Self::TableRemoved { name, table } => Self::TableAdded { name, table },
            Self::TableRenamed {
                from,
                to,
                confidence,
                unique_columns,
            } => Self::TableRenamed {
                from: to,
                to: from,
                confidence,
                unique_columns,
            },
            Self::ColumnAdded {
                table,
                column,
                definition,
            } => Self::ColumnRemoved {
                table,
                column,
                definition,
            },
            Self::ColumnRemoved {
                table,
                column,
                definition,
            } => Self::ColumnAdded {
                table,
                column,
                definition,
            },
            Self::ColumnAltered {
                table,
                column,
                from,
                to,
            } => Self::ColumnAltered {
                table,
                column,
                from: to,
                to: from,
            },
            Self::ColumnRenamed {
                table,
                from,
                to,
                confidence,
                unique,
            } => Self::ColumnRenamed {
                table,
                from: to,
                to: from,
                confidence,
                unique,
            },
            Self::IndexAdded { table, index } => Self::IndexRemoved { table, index },
            Self::IndexRemoved { table, index } => Self::IndexAdded { table, index },
            Self::ForeignKeyAdded { table, foreign_key } => {
                Self::ForeignKeyRemoved { table, foreign_key }
            }
            Self::ForeignKeyRemoved { table, foreign_key } => {
                Self::ForeignKeyAdded { table, foreign_key }
            }
        }
    }
}

/// Copies a table keeping only its columns and metadata.
pub(crate) fn table_shell(table: &TableSnapshot) -> TableSnapshot {
    TableSnapshot::from_parts(
        table.columns().clone(),
        table.primary_key().into_iter().map(str::to_string).collect(),
        Vec::new(),
        Vec::new(),
        table.metadata().clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlType;

    #[test]
    fn inverse_is_involution() {
        let ops = vec![
            DiffOperation::EnumAdded {
                name: "mood".into(),
                values: vec!["a".into()],
            },
            DiffOperation::ColumnRenamed {
                table: "t".into(),
                from: "a".into(),
                to: "b".into(),
                confidence: 0.9,
                unique: true,
            },
            DiffOperation::ColumnAltered {
                table: "t".into(),
                column: "c".into(),
                from: ColumnSnapshot::new(SqlType::Integer),
                to: ColumnSnapshot::new(SqlType::BigInt),
            },
        ];
        for op in ops {
            assert_eq!(op.inverse().inverse(), op);
        }
    }

    #[test]
    fn enum_value_added_inverts_to_alter() {
        let op = DiffOperation::EnumValueAdded {
            name: "mood".into(),
            value: "meh".into(),
            before: vec!["happy".into(), "sad".into()],
        };
        assert_eq!(
            op.inverse(),
            DiffOperation::EnumAltered {
                name: "mood".into(),
                from: vec!["happy".into(), "sad".into(), "meh".into()],
                to: vec!["happy".into(), "sad".into()],
            }
        );
    }
}
