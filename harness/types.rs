//! Shared value types that flow between the harness stages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Class label attached to every simulated sample.
///
/// `Group1` carries the shifted truth-gene mean. `Group2` is the positive class
/// for every AUC computed by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Class {
    Group1,
    Group2,
}

impl Class {
    /// Both classes in the order they appear in a generated cohort.
    pub const ALL: [Class; 2] = [Class::Group1, Class::Group2];

    pub fn label(self) -> &'static str {
        match self {
            Self::Group1 => "Group1",
            Self::Group2 => "Group2",
        }
    }

    /// Whether this class is the positive class for ROC analysis.
    pub fn is_positive(self) -> bool {
        matches!(self, Self::Group2)
    }

    /// Binary response used by the logistic model (Group2 = 1).
    pub fn response(self) -> f64 {
        if self.is_positive() { 1.0 } else { 0.0 }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Scores for one (pathway, sample size) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub pathway_id: String,
    pub sample_size: usize,
    /// Mean cross-validated ROC-AUC of the selected penalty.
    pub train_auc: f64,
    /// ROC-AUC on the held-out test rows.
    pub test_auc: f64,
    pub n_train: usize,
    pub selected_lambda: f64,
    /// Number of pathway genes that were present in the cohort.
    pub genes_used: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("A result for pathway '{pathway_id}' at sample size {sample_size} was already recorded.")]
pub struct DuplicateResultError {
    pub pathway_id: String,
    pub sample_size: usize,
}

/// Results keyed by `(pathway_id, sample_size)`.
///
/// Insertion order never matters: iteration is always in key order, so two
/// tables built from the same rows compare equal regardless of task completion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    rows: BTreeMap<(String, usize), ResultRow>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a row, refusing a second row for an existing key.
    pub fn insert(&mut self, row: ResultRow) -> Result<(), DuplicateResultError> {
        let key = (row.pathway_id.clone(), row.sample_size);
        if self.rows.contains_key(&key) {
            return Err(DuplicateResultError {
                pathway_id: key.0,
                sample_size: key.1,
            });
        }
        self.rows.insert(key, row);
        Ok(())
    }

    pub fn get(&self, pathway_id: &str, sample_size: usize) -> Option<&ResultRow> {
        self.rows.get(&(pathway_id.to_string(), sample_size))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &ResultRow> {
        self.rows.values()
    }

    pub fn rows_for_sample_size(&self, sample_size: usize) -> impl Iterator<Item = &ResultRow> {
        self.rows
            .values()
            .filter(move |row| row.sample_size == sample_size)
    }
}

/// Gene overlap between one well-performing pathway and the truth pathway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapRow {
    pub pathway_id: String,
    pub sample_size: usize,
    pub train_auc: f64,
    pub overlap_count: usize,
    pub pathway_size: usize,
}

/// Overlap rows grouped by sample size.
///
/// A sample size with no pathway above the threshold is present with an empty row set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlapTable {
    by_sample_size: BTreeMap<usize, Vec<OverlapRow>>,
}

impl OverlapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_sample_size(&mut self, sample_size: usize, rows: Vec<OverlapRow>) {
        self.by_sample_size.insert(sample_size, rows);
    }

    pub fn rows_for(&self, sample_size: usize) -> Option<&[OverlapRow]> {
        self.by_sample_size.get(&sample_size).map(Vec::as_slice)
    }

    pub fn sample_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.by_sample_size.keys().copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = &OverlapRow> {
        self.by_sample_size.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_sample_size.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
