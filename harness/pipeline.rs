//! # Harness Pipeline
//!
//! Wires the stages together for one run:
//!
//! 1. Validate the configuration and locate the truth pathway in the catalog.
//! 2. Draw the truth-gene covariance once and generate one cohort per sample size.
//! 3. Split every cohort before any task is dispatched. A cohort too small to
//!    split is recorded as a diagnostic and its scenario is skipped.
//! 4. Train and evaluate every (pathway, sample size) pair in parallel.
//! 5. Score gene overlap for high-performing pathways and summarise detection.

use crate::catalog::{CatalogError, GeneUniverse, Pathway, PathwayCatalog};
use crate::cohort::{Cohort, CohortError, TruthCovariance, generate_cohorts};
use crate::config::{ConfigError, HarnessConfig};
use crate::detection::{DetectionRow, detection_summary};
use crate::orchestrator::{
    DiagnosticKind, OrchestratorError, TaskDiagnostic, build_payloads, run_tasks,
};
use crate::overlap::{OverlapError, overlap_table};
use crate::partition::{PartitionError, Split, stratified_split};
use crate::progress::RunProgressObserver;
use crate::seeding::{SeedSequence, SeedStream};
use crate::types::{OverlapTable, ResultTable};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Cohort(#[from] CohortError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Overlap(#[from] OverlapError),
}

/// Cohorts of one run together with the covariance they share.
#[derive(Debug, Clone)]
pub struct SimulatedCohorts {
    pub truth: Pathway,
    pub universe: GeneUniverse,
    pub covariance: TruthCovariance,
    pub cohorts: Vec<Cohort>,
}

/// Everything a finished run produces.
#[derive(Debug, Clone)]
pub struct HarnessOutput {
    pub results: ResultTable,
    pub overlaps: OverlapTable,
    pub detection: Vec<DetectionRow>,
    pub diagnostics: Vec<TaskDiagnostic>,
    /// Pairs skipped because the pathway had no genes in the cohort.
    pub excluded: Vec<(String, usize)>,
}

/// Validates `config` against `catalog` and generates the run's cohorts.
pub fn simulate_cohorts(
    catalog: &PathwayCatalog,
    config: &HarnessConfig,
) -> Result<SimulatedCohorts, HarnessError> {
    config.validate()?;
    config.check_against(catalog)?;
    let truth = catalog
        .get(&config.truth_pathway_id)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownTruthPathway(config.truth_pathway_id.clone()))?;
    let universe = catalog.gene_universe();
    log::info!(
        "Truth pathway '{}' has {} genes; gene universe has {} genes across {} pathways",
        truth.term(),
        truth.len(),
        universe.len(),
        catalog.len()
    );

    let seeds = SeedSequence::new(config.seed);
    let mut covariance_rng = seeds.rng(SeedStream::Covariance);
    let covariance = TruthCovariance::random(truth.len(), &mut covariance_rng)?;
    let cohorts = generate_cohorts(
        &config.sample_sizes,
        truth.genes(),
        universe.genes(),
        &covariance,
        &seeds,
    )?;
    Ok(SimulatedCohorts {
        truth,
        universe,
        covariance,
        cohorts,
    })
}

/// Splits of the scenarios that could be split, plus one diagnostic per scenario that could not.
#[derive(Debug, Clone, Default)]
pub struct ScenarioSplits {
    pub splits: Vec<Split>,
    pub skipped: Vec<TaskDiagnostic>,
}

/// Splits every cohort with its own derived seed.
///
/// `InsufficientData` only removes the affected scenario; any other partition
/// error aborts.
pub fn split_cohorts(
    cohorts: &[Cohort],
    split_fraction: f64,
    seeds: &SeedSequence,
) -> Result<ScenarioSplits, PartitionError> {
    let mut outcome = ScenarioSplits::default();
    for cohort in cohorts {
        let seed = seeds.derive(SeedStream::Split {
            sample_size: cohort.sample_size(),
        });
        match stratified_split(cohort, split_fraction, seed) {
            Ok(split) => outcome.splits.push(split),
            Err(e @ PartitionError::InsufficientData { .. }) => {
                log::warn!("Skipping sample size {}: {e}", cohort.sample_size());
                outcome.skipped.push(TaskDiagnostic {
                    pathway_id: None,
                    sample_size: cohort.sample_size(),
                    kind: DiagnosticKind::InsufficientData,
                    message: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(outcome)
}

/// Runs the whole harness over `catalog`.
pub fn run_harness(
    catalog: &PathwayCatalog,
    config: &HarnessConfig,
    observer: &dyn RunProgressObserver,
) -> Result<HarnessOutput, HarnessError> {
    let start = Instant::now();
    let simulated = simulate_cohorts(catalog, config)?;
    let seeds = SeedSequence::new(config.seed);
    let ScenarioSplits { splits, skipped } =
        split_cohorts(&simulated.cohorts, config.split_fraction, &seeds)?;

    let settings = config.trainer_settings();
    let payloads = build_payloads(catalog, &splits, &settings, &seeds);
    let report = run_tasks(&payloads, config.worker_count, observer)?;

    let overlaps = overlap_table(
        &report.results,
        catalog,
        &simulated.truth,
        config.overlap_threshold,
        &config.sample_sizes,
    )?;
    let detection = detection_summary(&report.results, simulated.truth.term(), &config.sample_sizes);

    let mut diagnostics = skipped;
    diagnostics.extend(report.diagnostics);

    log::info!("Harness run finished in {:.2?}", start.elapsed());
    Ok(HarnessOutput {
        results: report.results,
        overlaps,
        detection,
        diagnostics,
        excluded: report.excluded,
    })
}
