//! Where the truth pathway lands among all scored pathways.
//!
//! For each sample size the truth pathway is ranked by train AUC and by test AUC
//! against every pathway that produced a result row. Rank 1 is the best score;
//! tied scores share the better rank.

use crate::types::{ResultRow, ResultTable};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRow {
    pub sample_size: usize,
    pub truth_pathway_id: String,
    /// `false` when the truth pathway has no result row at this sample size.
    pub scored: bool,
    pub train_auc: Option<f64>,
    pub test_auc: Option<f64>,
    pub train_rank: Option<usize>,
    pub test_rank: Option<usize>,
    pub pathways_scored: usize,
}

/// 1-based competition rank of `value` among `values`, highest first.
fn rank_of(value: f64, values: impl Iterator<Item = f64>) -> usize {
    1 + values.filter(|&v| v > value).count()
}

pub fn detection_row(results: &ResultTable, truth_pathway_id: &str, sample_size: usize) -> DetectionRow {
    let scored: Vec<&ResultRow> = results.rows_for_sample_size(sample_size).collect();
    let truth = results.get(truth_pathway_id, sample_size);
    DetectionRow {
        sample_size,
        truth_pathway_id: truth_pathway_id.to_string(),
        scored: truth.is_some(),
        train_auc: truth.map(|r| r.train_auc),
        test_auc: truth.map(|r| r.test_auc),
        train_rank: truth.map(|r| rank_of(r.train_auc, scored.iter().map(|s| s.train_auc))),
        test_rank: truth.map(|r| rank_of(r.test_auc, scored.iter().map(|s| s.test_auc))),
        pathways_scored: scored.len(),
    }
}

/// One detection row per sample size, in the given order.
pub fn detection_summary(
    results: &ResultTable,
    truth_pathway_id: &str,
    sample_sizes: &[usize],
) -> Vec<DetectionRow> {
    sample_sizes
        .iter()
        .map(|&n| {
            let row = detection_row(results, truth_pathway_id, n);
            match (row.train_rank, row.test_rank) {
                (Some(train_rank), Some(test_rank)) => log::info!(
                    "Sample size {}: truth pathway ranks {}/{} by train AUC and {}/{} by test AUC",
                    n,
                    train_rank,
                    row.pathways_scored,
                    test_rank,
                    row.pathways_scored
                ),
                _ => log::warn!("Sample size {n}: truth pathway '{truth_pathway_id}' was not scored"),
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pathway: &str, n: usize, train_auc: f64, test_auc: f64) -> ResultRow {
        ResultRow {
            pathway_id: pathway.to_string(),
            sample_size: n,
            train_auc,
            test_auc,
            n_train: 16,
            selected_lambda: 0.01,
            genes_used: 2,
        }
    }

    #[test]
    fn ranks_truth_against_scored_pathways() {
        let mut results = ResultTable::new();
        results.insert(row("TRUTH", 10, 0.8, 0.7)).unwrap();
        results.insert(row("A", 10, 0.9, 0.7)).unwrap();
        results.insert(row("B", 10, 0.6, 0.9)).unwrap();
        results.insert(row("C", 20, 0.99, 0.99)).unwrap();

        let summary = detection_summary(&results, "TRUTH", &[10, 20]);
        let first = &summary[0];
        assert!(first.scored);
        assert_eq!(first.pathways_scored, 3);
        assert_eq!(first.train_rank, Some(2));
        // Tied with A on test AUC, both behind B.
        assert_eq!(first.test_rank, Some(2));

        let second = &summary[1];
        assert!(!second.scored);
        assert_eq!(second.train_rank, None);
        assert_eq!(second.pathways_scored, 1);
    }
}
