//! Rename detection: similarity scoring and stable matching.
//!
//! Both halves are pure. Scoring turns a (removed, added) pair into a number
//! in `[0.0, 1.0]`; matching picks pairs that are each other's unique best
//! candidate, so the outcome never depends on iteration order.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strsim::{jaro_winkler, normalized_levenshtein};

use crate::error::RenameConfigError;
use crate::snapshot::{ColumnSnapshot, TableSnapshot};

/// Scores closer than this are treated as a tie.
const TIE_EPSILON: f64 = 1e-9;

/// Tunable rename-detection policy.
///
/// The score of a candidate pair is
/// `type_weight * type + constraint_weight * constraints + name_weight * name`,
/// and a rename is proposed only when it reaches `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameOptions {
    /// Whether rename detection runs at all.
    pub enabled: bool,
    /// Minimum score for a rename to be proposed.
    pub threshold: f64,
    /// Weight of type equality.
    pub type_weight: f64,
    /// Weight of constraint-set overlap.
    pub constraint_weight: f64,
    /// Weight of name similarity.
    pub name_weight: f64,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.7,
            type_weight: 0.5,
            constraint_weight: 0.3,
            name_weight: 0.2,
        }
    }
}

impl RenameOptions {
    /// Default weights with a custom threshold.
    pub fn with_threshold(threshold: f64) -> Result<Self, RenameConfigError> {
        let options = Self {
            threshold,
            ..Self::default()
        };
        options.validate()?;
        Ok(options)
    }

    /// Custom threshold and weights.
    pub fn with_weights(
        threshold: f64,
        type_weight: f64,
        constraint_weight: f64,
        name_weight: f64,
    ) -> Result<Self, RenameConfigError> {
        let options = Self {
            enabled: true,
            threshold,
            type_weight,
            constraint_weight,
            name_weight,
        };
        options.validate()?;
        Ok(options)
    }

    /// Options that never propose a rename.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Checks ranges. Deserialized options must be validated before use.
    pub fn validate(&self) -> Result<(), RenameConfigError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(RenameConfigError::Threshold(self.threshold));
        }
        for (name, value) in [
            ("type_weight", self.type_weight),
            ("constraint_weight", self.constraint_weight),
            ("name_weight", self.name_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RenameConfigError::Weight { name, value });
            }
        }
        let sum = self.type_weight + self.constraint_weight + self.name_weight;
        if (sum - 1.0).abs() > 0.01 {
            return Err(RenameConfigError::WeightSum(sum));
        }
        Ok(())
    }

    /// Weighted combination of the three signals.
    #[must_use]
    pub fn score(&self, type_score: f64, constraint_score: f64, name_score: f64) -> f64 {
        self.type_weight * type_score
            + self.constraint_weight * constraint_score
            + self.name_weight * name_score
    }

    /// Scores a column pair.
    #[must_use]
    pub fn column_score(
        &self,
        old_name: &str,
        old: &ColumnSnapshot,
        new_name: &str,
        new: &ColumnSnapshot,
    ) -> f64 {
        let type_score = if old.sql_type == new.sql_type { 1.0 } else { 0.0 };
        let constraints = jaccard(&column_flags(old), &column_flags(new));
        self.score(type_score, constraints, name_similarity(old_name, new_name))
    }

    /// Scores a table pair.
    #[must_use]
    pub fn table_score(
        &self,
        old_name: &str,
        old: &TableSnapshot,
        new_name: &str,
        new: &TableSnapshot,
    ) -> f64 {
        let types = jaccard(&typed_columns(old), &typed_columns(new));
        let constraints = jaccard(&constraint_signatures(old), &constraint_signatures(new));
        self.score(types, constraints, name_similarity(old_name, new_name))
    }
}

/// Name similarity in `[0.0, 1.0]`: the mean of normalized Levenshtein
/// and Jaro-Winkler.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    (normalized_levenshtein(a, b) + jaro_winkler(a, b)) / 2.0
}

/// Jaccard overlap of two sets; two empty sets are identical.
#[must_use]
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(b).count();
    let total = a.union(b).count();
    shared as f64 / total as f64
}

fn column_flags(column: &ColumnSnapshot) -> BTreeSet<String> {
    let mut flags = BTreeSet::new();
    if !column.nullable {
        flags.insert("not_null".to_string());
    }
    if column.primary_key {
        flags.insert("primary".to_string());
    }
    if column.unique {
        flags.insert("unique".to_string());
    }
    if let Some(default) = &column.default {
        flags.insert(format!("default={default}"));
    }
    flags
}

fn typed_columns(table: &TableSnapshot) -> BTreeSet<String> {
    table
        .columns()
        .iter()
        .map(|(name, c)| format!("{name}:{}", c.sql_type))
        .collect()
}

fn constraint_signatures(table: &TableSnapshot) -> BTreeSet<String> {
    let indexes = table.indexes().iter().map(|i| {
        format!(
            "{}({})",
            if i.unique { "unique" } else { "index" },
            i.columns.join(",")
        )
    });
    let fks = table.foreign_keys().iter().map(|fk| {
        format!(
            "fk({})->{}({})",
            fk.columns.join(","),
            fk.references_table,
            fk.references_columns.join(",")
        )
    });
    indexes.chain(fks).collect()
}

/// A scored (removed, added) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<'a> {
    /// Name on the removed side.
    pub from: &'a str,
    /// Name on the added side.
    pub to: &'a str,
    /// Similarity score.
    pub score: f64,
}

/// Resolves candidates into one-to-one renames.
///
/// Each round keeps only pairs at or above `threshold` whose sides are
/// unmatched, then accepts every pair where both sides prefer each other
/// strictly over any alternative. Rounds repeat until nothing new is
/// accepted. A side with a tied best score stays unmatched in that round.
/// The result is sorted by `from`.
#[must_use]
pub fn stable_match<'a>(candidates: &[Candidate<'a>], threshold: f64) -> Vec<Candidate<'a>> {
    let mut matched_from: BTreeSet<&str> = BTreeSet::new();
    let mut matched_to: BTreeSet<&str> = BTreeSet::new();
    let mut accepted: Vec<Candidate<'a>> = Vec::new();

    loop {
        let open: Vec<&Candidate<'a>> = candidates
            .iter()
            .filter(|c| c.score >= threshold)
            .filter(|c| !matched_from.contains(c.from) && !matched_to.contains(c.to))
            .collect();

        let mut round = Vec::new();
        for c in &open {
            let from_best = unique_best(open.iter().filter(|o| o.from == c.from).copied());
            let to_best = unique_best(open.iter().filter(|o| o.to == c.to).copied());
            if from_best.is_some_and(|b| b.to == c.to) && to_best.is_some_and(|b| b.from == c.from)
            {
                round.push((*c).clone());
            }
        }

        if round.is_empty() {
            break;
        }
        for c in round {
            matched_from.insert(c.from);
            matched_to.insert(c.to);
            accepted.push(c);
        }
    }

    accepted.sort_by(|a, b| a.from.cmp(b.from));
    accepted
}

fn unique_best<'c, 'a: 'c>(
    options: impl Iterator<Item = &'c Candidate<'a>>,
) -> Option<&'c Candidate<'a>> {
    let mut best: Option<&Candidate<'a>> = None;
    let mut tied = false;
    for c in options {
        match best {
            None => best = Some(c),
            Some(b) if c.score > b.score + TIE_EPSILON => {
                best = Some(c);
                tied = false;
            }
            Some(b) if (c.score - b.score).abs() <= TIE_EPSILON => tied = true,
            Some(_) => {}
        }
    }
    if tied {
        None
    } else {
        best
    }
}
