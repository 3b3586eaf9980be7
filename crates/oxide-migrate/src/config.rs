//! Migration configuration.
//!
//! Loaded from a JSON file and overridden by command-line flags. The
//! libraries only ever see the resolved values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use oxide_schema::{DialectKind, RenameOptions};
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::policy::Policy;
use crate::runner::RunnerOptions;

/// Default snapshot file.
pub const DEFAULT_SNAPSHOT_PATH: &str = "schema.snapshot.json";

/// Default migrations directory.
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Default database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:db.sqlite3?mode=rwc";

/// Resolved migration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrateConfig {
    /// Target dialect.
    pub dialect: DialectKind,
    /// Connection string.
    pub database_url: String,
    /// Where the last applied snapshot is stored.
    pub snapshot_path: PathBuf,
    /// Where migration files live.
    pub migrations_dir: PathBuf,
    /// Production policy: destructive changes are refused.
    pub production: bool,
    /// Allow destructive changes under production policy.
    pub allow_destructive: bool,
    /// Per-statement timeout.
    pub statement_timeout_secs: Option<u64>,
    /// Force transactional (or sequential) execution.
    pub transactional: Option<bool>,
    /// Rename detection settings.
    pub rename: RenameOptions,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Sqlite,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            production: false,
            allow_destructive: false,
            statement_timeout_secs: None,
            transactional: None,
            rename: RenameOptions::default(),
        }
    }
}

impl MigrateConfig {
    /// Parses a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Checks values that serde can't.
    pub fn validate(&self) -> Result<()> {
        self.rename.validate()?;
        if self.statement_timeout_secs == Some(0) {
            return Err(MigrateError::Config(
                "statement_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.database_url.trim().is_empty() {
            return Err(MigrateError::Config("database_url is empty".to_string()));
        }
        Ok(())
    }

    /// The destructive-change policy these settings describe.
    #[must_use]
    pub const fn policy(&self) -> Policy {
        if self.production {
            Policy::Production {
                allow_destructive: self.allow_destructive,
            }
        } else {
            Policy::Development
        }
    }

    /// Runner options these settings describe.
    #[must_use]
    pub fn runner_options(&self) -> RunnerOptions {
        let mut options = RunnerOptions::default();
        if let Some(transactional) = self.transactional {
            options = options.transactional(transactional);
        }
        if let Some(secs) = self.statement_timeout_secs {
            options = options.statement_timeout(Duration::from_secs(secs));
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_document() {
        let config = MigrateConfig::from_json("{}").unwrap();
        assert_eq!(config, MigrateConfig::default());
        assert_eq!(config.policy(), Policy::Development);
        assert_eq!(config.snapshot_path, PathBuf::from("schema.snapshot.json"));
    }

    #[test]
    fn production_policy() {
        let config = MigrateConfig::from_json(
            r#"{"dialect": "postgresql", "production": true, "allow_destructive": true}"#,
        )
        .unwrap();
        assert_eq!(config.dialect, DialectKind::Postgres);
        assert_eq!(
            config.policy(),
            Policy::Production {
                allow_destructive: true
            }
        );
    }

    #[test]
    fn rename_options_partial() {
        let config = MigrateConfig::from_json(r#"{"rename": {"threshold": 0.9}}"#).unwrap();
        assert!((config.rename.threshold - 0.9).abs() < f64::EPSILON);
        assert!(config.rename.enabled);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            MigrateConfig::from_json(r#"{"rename": {"threshold": 1.5}}"#),
            Err(MigrateError::Config(_))
        ));
        assert!(matches!(
            MigrateConfig::from_json(r#"{"statement_timeout_secs": 0}"#),
            Err(MigrateError::Config(_))
        ));
        assert!(matches!(
            MigrateConfig::from_json(r#"{"unknown": 1}"#),
            Err(MigrateError::Serialization(_))
        ));
    }

    #[test]
    fn runner_options_from_config() {
        let config = MigrateConfig {
            transactional: Some(false),
            statement_timeout_secs: Some(5),
            ..MigrateConfig::default()
        };
        let options = config.runner_options();
        assert_eq!(options.transactional, Some(false));
        assert_eq!(options.statement_timeout, Some(Duration::from_secs(5)));
    }
}
