//! Error types for snapshot building and SQL generation.

/// Errors raised while turning a schema definition into a snapshot.
///
/// These always fail before any diffing happens; conflicting definitions are
/// never merged or silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// Two tables share a name.
    #[error("Duplicate table '{table}'")]
    DuplicateTable {
        /// Table name.
        table: String,
    },

    /// Two columns of the same table share a name.
    #[error("Duplicate column '{column}' in table '{table}'")]
    DuplicateColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Two enums share a name.
    #[error("Duplicate enum '{name}'")]
    DuplicateEnum {
        /// Enum name.
        name: String,
    },

    /// An enum lists the same value twice.
    #[error("Duplicate value '{value}' in enum '{name}'")]
    DuplicateEnumValue {
        /// Enum name.
        name: String,
        /// Repeated value.
        value: String,
    },

    /// Two indexes of the same table share a name.
    #[error("Duplicate index '{index}' on table '{table}'")]
    DuplicateIndex {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },

    /// Two foreign keys of the same table share a name.
    #[error("Duplicate foreign key '{name}' on table '{table}'")]
    DuplicateForeignKey {
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },

    /// A column uses a type tag the catalogue doesn't know.
    #[error("Unknown type '{type_name}' for column '{table}.{column}'")]
    UnknownType {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// The unrecognized tag.
        type_name: String,
    },

    /// A known type tag received the wrong number of parameters.
    #[error("Invalid parameters {params:?} for type '{type_name}' on column '{table}.{column}'")]
    InvalidTypeParameters {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Type tag.
        type_name: String,
        /// Parameters supplied.
        params: Vec<u32>,
    },

    /// A column references an enum that isn't declared.
    #[error("Column '{table}.{column}' references unknown enum '{name}'")]
    UnknownEnum {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Enum name.
        name: String,
    },

    /// An index or foreign key names a column the table doesn't have.
    #[error("{context} on table '{table}' references unknown column '{column}'")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// What referenced it (index or foreign key name).
        context: String,
    },

    /// A foreign key targets a table that isn't in the schema.
    #[error("Foreign key '{name}' on table '{table}' references unknown table '{target}'")]
    UnknownTable {
        /// Table owning the foreign key.
        table: String,
        /// Constraint name.
        name: String,
        /// Referenced table.
        target: String,
    },

    /// A foreign key lists a different number of source and target columns,
    /// or none at all.
    #[error("Foreign key '{name}' on table '{table}' has mismatched column lists")]
    ForeignKeyArity {
        /// Table owning the foreign key.
        table: String,
        /// Constraint name.
        name: String,
    },

    /// An index covers no columns.
    #[error("Index '{index}' on table '{table}' has no columns")]
    EmptyIndex {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },

    /// A persisted snapshot uses a newer format than this build reads.
    #[error("Snapshot format version {found} is not supported (newest supported: {supported})")]
    UnsupportedVersion {
        /// Version found in the document.
        found: u32,
        /// Newest version this build understands.
        supported: u32,
    },
}

/// An operation that the target dialect has no SQL mapping for.
///
/// Generation aborts for the whole batch; no partial statement list is
/// returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{dialect} cannot generate SQL for {operation} on '{table}': {detail}")]
pub struct UnsupportedOperationError {
    /// Dialect name.
    pub dialect: String,
    /// Operation kind (e.g. `ForeignKeyAdded`).
    pub operation: String,
    /// Table (or enum) the operation touches.
    pub table: String,
    /// Why the dialect can't express it.
    pub detail: String,
}

/// Invalid rename-detection settings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenameConfigError {
    /// Threshold outside `(0.0, 1.0]`.
    #[error("rename threshold must be in (0.0, 1.0], got {0}")]
    Threshold(f64),

    /// A weight outside `[0.0, 1.0]`.
    #[error("rename weight '{name}' must be in [0.0, 1.0], got {value}")]
    Weight {
        /// Which weight.
        name: &'static str,
        /// Supplied value.
        value: f64,
    },

    /// Weights don't add up to 1.0.
    #[error("rename weights must sum to 1.0, got {0}")]
    WeightSum(f64),
}
