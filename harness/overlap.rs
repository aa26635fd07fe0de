//! Gene overlap between well-performing pathways and the truth pathway.

use crate::catalog::{Pathway, PathwayCatalog};
use crate::types::{OverlapRow, OverlapTable, ResultTable};
use ahash::AHashSet;
use thiserror::Error;

pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.75;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlapError {
    #[error("Result row refers to pathway '{0}', which is not in the catalog.")]
    UnknownPathway(String),
}

/// Overlap rows for pathways whose train AUC at `sample_size` is strictly above
/// `threshold`, ordered by descending train AUC then pathway id.
pub fn select_overlaps(
    results: &ResultTable,
    catalog: &PathwayCatalog,
    truth: &Pathway,
    threshold: f64,
    sample_size: usize,
) -> Result<Vec<OverlapRow>, OverlapError> {
    let truth_genes: AHashSet<&str> = truth.genes().iter().map(String::as_str).collect();
    let mut rows = Vec::new();
    for result in results.rows_for_sample_size(sample_size) {
        if result.train_auc <= threshold {
            continue;
        }
        let pathway = catalog
            .get(&result.pathway_id)
            .ok_or_else(|| OverlapError::UnknownPathway(result.pathway_id.clone()))?;
        let overlap_count = pathway
            .genes()
            .iter()
            .filter(|g| truth_genes.contains(g.as_str()))
            .count();
        rows.push(OverlapRow {
            pathway_id: result.pathway_id.clone(),
            sample_size,
            train_auc: result.train_auc,
            overlap_count,
            pathway_size: pathway.len(),
        });
    }
    rows.sort_by(|a, b| {
        b.train_auc
            .total_cmp(&a.train_auc)
            .then_with(|| a.pathway_id.cmp(&b.pathway_id))
    });
    Ok(rows)
}

/// Overlap rows for every sample size; sizes where nothing clears the threshold
/// are present with no rows.
pub fn overlap_table(
    results: &ResultTable,
    catalog: &PathwayCatalog,
    truth: &Pathway,
    threshold: f64,
    sample_sizes: &[usize],
) -> Result<OverlapTable, OverlapError> {
    let mut table = OverlapTable::new();
    for &sample_size in sample_sizes {
        let rows = select_overlaps(results, catalog, truth, threshold, sample_size)?;
        log::info!(
            "Sample size {}: {} pathways above train AUC {:.2}",
            sample_size,
            rows.len(),
            threshold
        );
        table.insert_sample_size(sample_size, rows);
    }
    Ok(table)
}
