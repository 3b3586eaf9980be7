//! Destructive-change classification.
//!
//! The policy is an explicit value handed to the classifier and the runner;
//! nothing here looks at the process environment.

use std::fmt;

use oxide_schema::{DiffOperation, SchemaDiff};
use serde::{Deserialize, Serialize};

/// How destructive changes are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Policy {
    /// Destructive changes are allowed with a warning.
    #[default]
    Development,
    /// Destructive changes are refused unless explicitly overridden.
    Production {
        /// Operator override.
        allow_destructive: bool,
    },
}

impl Policy {
    /// Production policy without override.
    #[must_use]
    pub const fn production() -> Self {
        Self::Production {
            allow_destructive: false,
        }
    }

    /// Returns `true` if destructive changes must be refused.
    #[must_use]
    pub const fn blocks_destructive(&self) -> bool {
        matches!(
            self,
            Self::Production {
                allow_destructive: false
            }
        )
    }
}

/// Outcome of classifying a diff under a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Nothing can lose data.
    Safe,
    /// Data may be lost; proceed with a warning.
    Destructive,
    /// Data may be lost and the policy refuses it.
    Blocking,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Safe => "safe",
            Self::Destructive => "destructive",
            Self::Blocking => "blocking",
        })
    }
}

/// One operation that can lose data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestructiveChange {
    /// Operation kind (e.g. `ColumnRemoved`).
    pub operation: String,
    /// Affected table or enum.
    pub table: String,
    /// Affected column, if any.
    pub column: Option<String>,
    /// What would be lost.
    pub detail: String,
}

impl fmt::Display for DestructiveChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(
                f,
                "{} {}.{}: {}",
                self.operation, self.table, column, self.detail
            ),
            None => write!(f, "{} {}: {}", self.operation, self.table, self.detail),
        }
    }
}

/// Lists every destructive operation in `diff`, in diff order.
#[must_use]
pub fn destructive_changes(diff: &SchemaDiff) -> Vec<DestructiveChange> {
    diff.operations.iter().filter_map(destructive).collect()
}

fn destructive(op: &DiffOperation) -> Option<DestructiveChange> {
    let change = |table: &str, column: Option<&str>, detail: String| DestructiveChange {
        operation: op.kind().to_string(),
        table: table.to_string(),
        column: column.map(str::to_string),
        detail,
    };
    match op {
        DiffOperation::TableRemoved { name, table } => Some(change(
            name,
            None,
            format!("drops table with {} column(s)", table.columns().len()),
        )),
        DiffOperation::ColumnRemoved { table, column, .. } => {
            Some(change(table, Some(column), "drops column data".to_string()))
        }
        DiffOperation::ColumnAltered {
            table,
            column,
            from,
            to,
        } if from.sql_type.is_narrowing_to(&to.sql_type) => Some(change(
            table,
            Some(column),
            format!("narrows type {} -> {}", from.sql_type, to.sql_type),
        )),
        DiffOperation::EnumRemoved { name, .. } => {
            Some(change(name, None, "drops enum type".to_string()))
        }
        DiffOperation::EnumAltered { name, from, to } => {
            let lost: Vec<&str> = from
                .iter()
                .filter(|v| !to.contains(v))
                .map(String::as_str)
                .collect();
            (!lost.is_empty()).then(|| {
                change(name, None, format!("removes value(s) {}", lost.join(", ")))
            })
        }
        _ => None,
    }
}

/// Classifies `diff` under `policy`.
#[must_use]
pub fn classify(diff: &SchemaDiff, policy: Policy) -> Classification {
    if !diff.operations.iter().any(|op| destructive(op).is_some()) {
        Classification::Safe
    } else if policy.blocks_destructive() {
        Classification::Blocking
    } else {
        Classification::Destructive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_schema::{
        compute, ColumnDefinition, EnumDefinition, SchemaDefinition, SchemaSnapshot,
        TableDefinition,
    };

    fn users(extra: Option<(&str, &str)>) -> SchemaSnapshot {
        let mut table = TableDefinition::new("users")
            .column(ColumnDefinition::new("id", "bigint").primary_key());
        if let Some((name, ty)) = extra {
            table = table.column(ColumnDefinition::new(name, ty));
        }
        SchemaSnapshot::build(&SchemaDefinition::new().table(table)).unwrap()
    }

    #[test]
    fn additions_are_safe() {
        let diff = compute(&users(None), &users(Some(("age", "integer"))));
        assert!(destructive_changes(&diff).is_empty());
        assert_eq!(classify(&diff, Policy::production()), Classification::Safe);
    }

    #[test]
    fn column_drop_depends_on_policy() {
        let diff = compute(&users(Some(("age", "integer"))), &users(None));
        assert_eq!(classify(&diff, Policy::Development), Classification::Destructive);
        assert_eq!(classify(&diff, Policy::production()), Classification::Blocking);
        assert_eq!(
            classify(
                &diff,
                Policy::Production {
                    allow_destructive: true
                }
            ),
            Classification::Destructive
        );

        let changes = destructive_changes(&diff);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].to_string(), "ColumnRemoved users.age: drops column data");
    }

    #[test]
    fn narrowing_vs_widening() {
        let widen = compute(
            &users(Some(("age", "integer"))),
            &users(Some(("age", "bigint"))),
        );
        assert_eq!(classify(&widen, Policy::production()), Classification::Safe);

        let narrow = compute(
            &users(Some(("age", "bigint"))),
            &users(Some(("age", "integer"))),
        );
        assert_eq!(classify(&narrow, Policy::production()), Classification::Blocking);
        assert!(destructive_changes(&narrow)[0].detail.contains("narrows"));
    }

    #[test]
    fn enum_value_removal_is_destructive() {
        let mood = |values: &[&str]| {
            SchemaSnapshot::build(
                &SchemaDefinition::new().enumeration(EnumDefinition::new("mood", values.iter().copied())),
            )
            .unwrap()
        };
        let append = compute(&mood(&["happy"]), &mood(&["happy", "sad"]));
        assert_eq!(classify(&append, Policy::production()), Classification::Safe);

        let reorder = compute(&mood(&["happy", "sad"]), &mood(&["sad", "happy"]));
        assert_eq!(classify(&reorder, Policy::production()), Classification::Safe);

        let remove = compute(&mood(&["happy", "sad"]), &mood(&["happy"]));
        assert_eq!(classify(&remove, Policy::production()), Classification::Blocking);
    }

    #[test]
    fn empty_diff_is_safe() {
        let diff = compute(&users(None), &users(None));
        assert_eq!(classify(&diff, Policy::production()), Classification::Safe);
    }
}
