//! Schema snapshots, structural diffing and dialect DDL generation.
//!
//! The pipeline is pure and synchronous:
//!
//! - a [`SchemaDefinition`] is validated into an immutable [`SchemaSnapshot`]
//! - two snapshots are compared by the [`Differ`], which detects renames
//! - [`generate`] maps the resulting [`SchemaDiff`] onto dialect SQL
//!
//! # Example
//!
//! ```rust
//! use oxide_schema::{
//!     compute, generate, ColumnDefinition, SchemaDefinition, SchemaSnapshot, SqliteDialect,
//!     TableDefinition,
//! };
//!
//! let schema = SchemaDefinition::new().table(
//!     TableDefinition::new("accounts")
//!         .column(ColumnDefinition::new("id", "uuid").primary_key())
//!         .column(ColumnDefinition::new("label", "text").unique()),
//! );
//! let current = SchemaSnapshot::build(&schema).unwrap();
//!
//! let diff = compute(&SchemaSnapshot::empty(), &current);
//! let sql = generate(&diff, &SqliteDialect::new()).unwrap();
//! assert_eq!(sql.forward.len(), 1);
//! ```

pub mod definition;
pub mod dialect;
pub mod diff;
mod error;
pub mod snapshot;
pub mod sqlgen;
pub mod types;

pub use definition::{
    ColumnDefinition, ColumnReference, EnumDefinition, ForeignKeyDefinition, IndexDefinition,
    SchemaDefinition, TableDefinition,
};
pub use dialect::{DialectKind, MigrationDialect, PostgresDialect, SqliteDialect, Statement};
pub use diff::{compute, DiffOperation, Differ, RenameOptions, SchemaDiff};
pub use error::{RenameConfigError, SnapshotError, UnsupportedOperationError};
pub use snapshot::{
    ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, SchemaSnapshot, SnapshotDecodeError,
    TableSnapshot, SNAPSHOT_FORMAT_VERSION,
};
pub use sqlgen::{generate, GeneratedSql};
pub use types::{DefaultValue, ForeignKeyAction, SqlType};
