//! Migration files.
//!
//! One `<version>_<name>.sql` file per migration. The forward section is
//! the only part that is ever executed; its SHA-256 is recomputed from the
//! file on every read. The reverse block is commented out and kept for
//! reference.
//!
//! ```text
//! -- Migration: 20260101120000_add_users
//! -- Created: 2026-01-01T12:00:00+00:00
//! -- Dialect: sqlite
//! -- Checksum: 9f86d0...
//!
//! CREATE TABLE "users" (...);
//! --> statement-breakpoint
//! CREATE INDEX "idx_users_email" ON "users" ("email");
//!
//! -- Reverse (reference only, never executed automatically):
//! -- DROP INDEX "idx_users_email";
//! -- DROP TABLE "users";
//! ```

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use oxide_schema::{GeneratedSql, Statement};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{MigrateError, Result};

/// Separates statements in the forward section.
pub const STATEMENT_BREAKPOINT: &str = "--> statement-breakpoint";

/// Opens the commented reverse block.
pub const REVERSE_MARKER: &str = "-- Reverse (reference only, never executed automatically):";

const HEADER_MIGRATION: &str = "-- Migration: ";
const HEADER_CREATED: &str = "-- Created: ";
const HEADER_DIALECT: &str = "-- Dialect: ";
const HEADER_CHECKSUM: &str = "-- Checksum: ";

/// A migration: forward statements plus reference-only reversal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationArtifact {
    /// Time-derived version (`YYYYMMDDHHMMSS`), also the history id.
    pub version: i64,
    /// Sanitized name.
    pub name: String,
    /// Dialect the SQL was generated for.
    pub dialect: String,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Forward statements, in order.
    pub statements: Vec<Statement>,
    /// Reversal SQL, uncommented. Never executed.
    pub reverse: String,
    /// Where the artifact was read from or written to.
    pub path: Option<PathBuf>,
}

impl MigrationArtifact {
    /// Creates an artifact. The name is sanitized.
    #[must_use]
    pub fn new(
        version: i64,
        name: &str,
        dialect: impl Into<String>,
        statements: Vec<Statement>,
    ) -> Self {
        Self {
            version,
            name: sanitize_name(name),
            dialect: dialect.into(),
            created: Utc::now(),
            statements,
            reverse: String::new(),
            path: None,
        }
    }

    /// Creates an artifact from generated SQL.
    #[must_use]
    pub fn from_generated(
        version: i64,
        name: &str,
        dialect: impl Into<String>,
        sql: &GeneratedSql,
    ) -> Self {
        let reverse: Vec<String> = sql.reverse.iter().map(ToString::to_string).collect();
        Self::new(version, name, dialect, sql.forward.clone()).with_reverse(reverse.join("\n"))
    }

    /// Sets the reversal text.
    #[must_use]
    pub fn with_reverse(mut self, reverse: impl Into<String>) -> Self {
        self.reverse = reverse.into();
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub fn created_at(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    /// `<version>_<name>`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}_{}", self.version, self.name)
    }

    /// `<version>_<name>.sql`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.sql", self.id())
    }

    /// The executed part of the file.
    #[must_use]
    pub fn forward_section(&self) -> String {
        forward_section(&self.statements)
    }

    /// SHA-256 of the forward section.
    #[must_use]
    pub fn checksum(&self) -> String {
        checksum(&self.forward_section())
    }

    /// Executable statements, manual entries excluded.
    pub fn executable(&self) -> impl Iterator<Item = &str> {
        self.statements.iter().filter_map(Statement::sql)
    }

    /// Renders the complete file.
    #[must_use]
    pub fn render(&self) -> String {
        let forward = self.forward_section();
        let mut out = format!(
            "{HEADER_MIGRATION}{}\n{HEADER_CREATED}{}\n{HEADER_DIALECT}{}\n{HEADER_CHECKSUM}{}\n\n",
            self.id(),
            self.created.to_rfc3339(),
            self.dialect,
            checksum(&forward)
        );
        if !forward.is_empty() {
            out.push_str(&forward);
            out.push_str("\n\n");
        }
        out.push_str(REVERSE_MARKER);
        out.push('\n');
        for line in self.reverse.lines() {
            out.push_str("-- ");
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Writes the artifact into `dir`. Never overwrites.
    pub fn write(&mut self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(MigrateError::MigrationExists(path));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(self.render().as_bytes())?;
        file.sync_all()?;

        debug!(path = %path.display(), checksum = %self.checksum(), "Wrote migration file");
        self.path = Some(path.clone());
        Ok(path)
    }

    /// Reads a migration file.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(path, &content)
    }

    /// Parses file content. `path` supplies the version and name.
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let invalid = |message: String| MigrateError::InvalidArtifact {
            path: path.to_path_buf(),
            message,
        };

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| invalid("file name is not valid UTF-8".to_string()))?;
        let (version, name) = parse_stem(stem)
            .ok_or_else(|| invalid("expected a file name like <version>_<name>.sql".to_string()))?;

        let mut lines = content.lines().peekable();
        let mut created = None;
        let mut dialect = String::new();
        while let Some(line) = lines.peek() {
            if let Some(value) = line.strip_prefix(HEADER_CREATED) {
                let parsed = DateTime::parse_from_rfc3339(value.trim())
                    .map_err(|e| invalid(format!("invalid creation time: {e}")))?;
                created = Some(parsed.with_timezone(&Utc));
            } else if let Some(value) = line.strip_prefix(HEADER_DIALECT) {
                dialect = value.trim().to_string();
            } else if !(line.starts_with(HEADER_MIGRATION) || line.starts_with(HEADER_CHECKSUM)) {
                break;
            }
            lines.next();
        }

        let mut forward = Vec::new();
        let mut reverse = Vec::new();
        let mut in_reverse = false;
        for line in lines {
            if in_reverse {
                reverse.push(line.strip_prefix("-- ").unwrap_or(line));
            } else if line == REVERSE_MARKER {
                in_reverse = true;
            } else {
                forward.push(line);
            }
        }

        let forward = forward.join("\n");
        let statements: Vec<Statement> = forward
            .trim()
            .split(STATEMENT_BREAKPOINT)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Statement::parse)
            .collect();

        Ok(Self {
            version,
            name: name.to_string(),
            dialect,
            created: created.ok_or_else(|| invalid("missing creation time".to_string()))?,
            statements,
            reverse: reverse.join("\n").trim_end().to_string(),
            path: Some(path.to_path_buf()),
        })
    }
}

/// Joins rendered statements with breakpoint lines.
#[must_use]
pub fn forward_section(statements: &[Statement]) -> String {
    let rendered: Vec<String> = statements.iter().map(ToString::to_string).collect();
    rendered.join(&format!("\n{STATEMENT_BREAKPOINT}\n"))
}

/// Hex SHA-256 of `text`.
#[must_use]
pub fn checksum(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Lowercases and replaces everything outside `[a-z0-9_]` with `_`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "migration".to_string()
    } else {
        sanitized
    }
}

/// `YYYYMMDDHHMMSS` of `time` as an integer.
#[must_use]
pub fn version_at(time: DateTime<Utc>) -> i64 {
    // the formatted value is always 14 ASCII digits
    time.format("%Y%m%d%H%M%S")
        .to_string()
        .parse()
        .unwrap_or_default()
}

/// A version derived from `now` that is greater than every version in
/// `taken`.
#[must_use]
pub fn next_version(now: DateTime<Utc>, taken: impl IntoIterator<Item = i64>) -> i64 {
    let candidate = version_at(now);
    match taken.into_iter().max() {
        Some(max) if max >= candidate => max + 1,
        _ => candidate,
    }
}

/// Reads every `*.sql` file in `dir`, sorted by version.
///
/// A missing directory has no migrations.
pub fn discover(dir: &Path) -> Result<Vec<MigrationArtifact>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut artifacts = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            artifacts.push(MigrationArtifact::read(&path)?);
        }
    }
    artifacts.sort_by_key(|a| a.version);

    for pair in artifacts.windows(2) {
        if pair[0].version == pair[1].version {
            return Err(MigrateError::InvalidArtifact {
                path: pair[1].path.clone().unwrap_or_default(),
                message: format!("duplicate version {} (also '{}')", pair[1].version, pair[0].id()),
            });
        }
    }

    debug!(dir = %dir.display(), count = artifacts.len(), "Discovered migrations");
    Ok(artifacts)
}

fn parse_stem(stem: &str) -> Option<(i64, &str)> {
    let (version, name) = stem.split_once('_')?;
    if name.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((version.parse().ok()?, name))
}
