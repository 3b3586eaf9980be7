//! Persistence of the last applied snapshot.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use oxide_schema::SchemaSnapshot;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::Result;

/// The snapshot file of the last successful migration.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored snapshot, or `None` on first run.
    pub fn load(&self) -> Result<Option<SchemaSnapshot>> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored snapshot");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(SchemaSnapshot::from_json(&json)?))
    }

    /// Loads the stored snapshot, or the empty one.
    pub fn load_or_empty(&self) -> Result<SchemaSnapshot> {
        Ok(self.load()?.unwrap_or_default())
    }

    /// Replaces the stored snapshot atomically.
    ///
    /// The document goes to a temporary file in the same directory, which is
    /// then renamed over the old one.
    pub fn save(&self, snapshot: &SchemaSnapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(snapshot.to_json()?.as_bytes())?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;

        info!(
            path = %self.path.display(),
            tables = snapshot.tables().len(),
            "Saved schema snapshot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;
    use oxide_schema::{ColumnDefinition, SchemaDefinition, TableDefinition};

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot::build(
            &SchemaDefinition::new().table(
                TableDefinition::new("users")
                    .column(ColumnDefinition::new("id", "bigint").primary_key()),
            ),
        )
        .unwrap()
    }

    #[test]
    fn first_run_has_no_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("schema.snapshot.json"));
        assert!(store.load().unwrap().is_none());
        assert!(store.load_or_empty().unwrap().is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/schema.snapshot.json"));
        store.save(&snapshot()).unwrap();
        assert_eq!(store.load().unwrap(), Some(snapshot()));

        // overwrite keeps a single file
        store.save(&SchemaSnapshot::empty()).unwrap();
        assert_eq!(store.load().unwrap(), Some(SchemaSnapshot::empty()));
        let files = std::fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.snapshot.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SnapshotStore::new(&path).load(),
            Err(MigrateError::Serialization(_))
        ));
    }

    #[test]
    fn newer_format_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.snapshot.json");
        std::fs::write(&path, r#"{"version": 99, "tables": {}, "enums": {}}"#).unwrap();
        assert!(matches!(
            SnapshotStore::new(&path).load(),
            Err(MigrateError::Snapshot(_))
        ));
    }
}
