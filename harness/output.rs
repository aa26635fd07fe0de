//! Tab-separated writers for run results and simulated cohorts.

use crate::cohort::Cohort;
use crate::detection::DetectionRow;
use crate::orchestrator::TaskDiagnostic;
use crate::pipeline::HarnessOutput;
use crate::types::{OverlapTable, ResultRow, ResultTable};
use natord::compare;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const RESULTS_FILE: &str = "results.tsv";
pub const OVERLAPS_FILE: &str = "overlaps.tsv";
pub const DETECTION_FILE: &str = "detection.tsv";
pub const DIAGNOSTICS_FILE: &str = "diagnostics.tsv";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to create output directory '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<fs::File>, OutputError> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|source| OutputError::Write {
            path: path.to_path_buf(),
            source,
        })
}

fn write_records<'a, T, I>(path: &Path, records: I) -> Result<(), OutputError>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let wrap = |source: csv::Error| OutputError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = tsv_writer(path)?;
    for record in records {
        writer.serialize(record).map_err(wrap)?;
    }
    writer.flush().map_err(|e| wrap(e.into()))?;
    Ok(())
}

/// Result rows in natural pathway order, then by sample size.
pub fn sorted_results(results: &ResultTable) -> Vec<&ResultRow> {
    let mut rows: Vec<&ResultRow> = results.rows().collect();
    rows.sort_by(|a, b| {
        compare(&a.pathway_id, &b.pathway_id).then_with(|| a.sample_size.cmp(&b.sample_size))
    });
    rows
}

pub fn write_results(path: &Path, results: &ResultTable) -> Result<(), OutputError> {
    write_records(path, sorted_results(results))
}

pub fn write_overlaps(path: &Path, overlaps: &OverlapTable) -> Result<(), OutputError> {
    write_records(path, overlaps.rows())
}

pub fn write_detection(path: &Path, detection: &[DetectionRow]) -> Result<(), OutputError> {
    write_records(path, detection)
}

pub fn write_diagnostics(path: &Path, diagnostics: &[TaskDiagnostic]) -> Result<(), OutputError> {
    write_records(path, diagnostics)
}

/// Writes one row per sample: row id, class, then one column per gene.
pub fn write_cohort(path: &Path, cohort: &Cohort) -> Result<(), OutputError> {
    let wrap = |source: csv::Error| OutputError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = tsv_writer(path)?;
    let mut header = vec!["sample".to_string(), "class".to_string()];
    header.extend(cohort.schema().genes().iter().cloned());
    writer.write_record(&header).map_err(wrap)?;

    for (i, row) in cohort.expression().rows().into_iter().enumerate() {
        let mut record = Vec::with_capacity(row.len() + 2);
        record.push(cohort.row_ids()[i].to_string());
        record.push(cohort.classes()[i].to_string());
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record).map_err(wrap)?;
    }
    writer.flush().map_err(|e| wrap(e.into()))?;
    Ok(())
}

/// Writes every table of a finished run into `dir` and returns the files written.
pub fn write_run(dir: &Path, output: &HarnessOutput) -> Result<Vec<PathBuf>, OutputError> {
    fs::create_dir_all(dir).map_err(|source| OutputError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let results = dir.join(RESULTS_FILE);
    let overlaps = dir.join(OVERLAPS_FILE);
    let detection = dir.join(DETECTION_FILE);
    let diagnostics = dir.join(DIAGNOSTICS_FILE);

    write_results(&results, &output.results)?;
    write_overlaps(&overlaps, &output.overlaps)?;
    write_detection(&detection, &output.detection)?;
    write_diagnostics(&diagnostics, &output.diagnostics)?;
    Ok(vec![results, overlaps, detection, diagnostics])
}
