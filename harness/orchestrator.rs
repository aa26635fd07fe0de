//! # Parallel Orchestrator
//!
//! Fans one train-and-evaluate task per (pathway, sample size) pair out over a
//! fixed-size rayon pool.
//!
//! ### Task payloads
//! Every task receives an explicit, immutable `TaskPayload`: borrowed references to
//! its pathway, its scenario's split and the shared trainer settings, plus its own
//! derived seed. Nothing a task reads is mutable, and no task sees another's state.
//!
//! ### Result merge
//! Tasks return a `TaskOutcome` by value. Outcomes are collected first and merged
//! into the `ResultTable` on the calling thread afterwards, so completion order
//! never influences the table. A panic inside a task is caught and recorded as a
//! diagnostic for that pair only.

use crate::catalog::{Pathway, PathwayCatalog};
use crate::evaluate::evaluate;
use crate::partition::Split;
use crate::progress::{RunProgressObserver, TaskOutcomeKind};
use crate::seeding::{SeedSequence, SeedStream};
use crate::trainer::{TrainerSettings, train_pathway};
use crate::types::{DuplicateResultError, ResultRow, ResultTable};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Failed to build the worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    DuplicateResult(#[from] DuplicateResultError),
}

/// Everything one task needs, handed over read-only.
#[derive(Debug, Clone, Copy)]
pub struct TaskPayload<'a> {
    pub pathway: &'a Pathway,
    pub split: &'a Split,
    pub settings: &'a TrainerSettings,
    pub seed: u64,
}

impl TaskPayload<'_> {
    pub fn pathway_id(&self) -> &str {
        self.pathway.term()
    }

    pub fn sample_size(&self) -> usize {
        self.split.sample_size()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    /// The task returned an error.
    Error,
    /// The task panicked and was stopped.
    Panic,
    /// The scenario's cohort could not be split, so none of its tasks ran.
    InsufficientData,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Panic => "panic",
            Self::InsufficientData => "insufficient data",
        })
    }
}

/// Why a (pathway, sample size) pair is missing from the result table.
///
/// `pathway_id` is `None` when the whole scenario was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDiagnostic {
    pub pathway_id: Option<String>,
    pub sample_size: usize,
    pub kind: DiagnosticKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Scored(ResultRow),
    NotApplicable { pathway_id: String, sample_size: usize },
    Failed(TaskDiagnostic),
}

impl TaskOutcome {
    pub fn kind(&self) -> TaskOutcomeKind {
        match self {
            Self::Scored(_) => TaskOutcomeKind::Scored,
            Self::NotApplicable { .. } => TaskOutcomeKind::NotApplicable,
            Self::Failed(_) => TaskOutcomeKind::Failed,
        }
    }
}

/// Merged output of one orchestrated run.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorReport {
    pub results: ResultTable,
    /// `(pathway_id, sample_size)` pairs whose pathway had no genes in the cohort.
    pub excluded: Vec<(String, usize)>,
    pub diagnostics: Vec<TaskDiagnostic>,
}

/// Worker count to use for a requested value; 0 means every available core.
pub fn resolve_worker_count(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get().max(1)
    } else {
        requested
    }
}

/// One payload per (pathway, split) pair, split-major.
pub fn build_payloads<'a>(
    catalog: &'a PathwayCatalog,
    splits: &'a [Split],
    settings: &'a TrainerSettings,
    seeds: &SeedSequence,
) -> Vec<TaskPayload<'a>> {
    let mut payloads = Vec::with_capacity(catalog.len() * splits.len());
    for split in splits {
        for (pathway_index, pathway) in catalog.iter().enumerate() {
            payloads.push(TaskPayload {
                pathway,
                split,
                settings,
                seed: seeds.derive(SeedStream::Task {
                    pathway: pathway_index,
                    sample_size: split.sample_size(),
                }),
            });
        }
    }
    payloads
}

/// Trains on the payload's training rows and scores its test rows.
pub fn run_task(payload: &TaskPayload<'_>) -> TaskOutcome {
    let mut rng = StdRng::seed_from_u64(payload.seed);
    let failed = |message: String| {
        TaskOutcome::Failed(TaskDiagnostic {
            pathway_id: Some(payload.pathway_id().to_string()),
            sample_size: payload.sample_size(),
            kind: DiagnosticKind::Error,
            message,
        })
    };

    let model = match train_pathway(payload.pathway, &payload.split.train, payload.settings, &mut rng) {
        Ok(model) => model,
        Err(e) if e.is_not_applicable() => {
            return TaskOutcome::NotApplicable {
                pathway_id: payload.pathway_id().to_string(),
                sample_size: payload.sample_size(),
            };
        }
        Err(e) => return failed(e.to_string()),
    };
    match evaluate(&model, &payload.split.test) {
        Ok(row) => TaskOutcome::Scored(row),
        Err(e) => failed(e.to_string()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs `task`, converting a panic into a diagnostic for the given pair.
fn guarded<F>(pathway_id: &str, sample_size: usize, task: F) -> TaskOutcome
where
    F: FnOnce() -> TaskOutcome,
{
    catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|panic| {
        TaskOutcome::Failed(TaskDiagnostic {
            pathway_id: Some(pathway_id.to_string()),
            sample_size,
            kind: DiagnosticKind::Panic,
            message: panic_message(panic.as_ref()),
        })
    })
}

fn execute(payload: &TaskPayload<'_>, observer: &dyn RunProgressObserver) -> TaskOutcome {
    let outcome = guarded(payload.pathway_id(), payload.sample_size(), || run_task(payload));
    observer.on_task_complete(payload.pathway_id(), payload.sample_size(), outcome.kind());
    outcome
}

/// Merges task outcomes into a report on the calling thread.
pub fn merge_outcomes<I>(outcomes: I) -> Result<OrchestratorReport, OrchestratorError>
where
    I: IntoIterator<Item = TaskOutcome>,
{
    let mut report = OrchestratorReport::default();
    for outcome in outcomes {
        match outcome {
            TaskOutcome::Scored(row) => report.results.insert(row)?,
            TaskOutcome::NotApplicable {
                pathway_id,
                sample_size,
            } => {
                log::warn!(
                    "Pathway '{pathway_id}' has no genes in the sample size {sample_size} cohort; excluded"
                );
                report.excluded.push((pathway_id, sample_size));
            }
            TaskOutcome::Failed(diagnostic) => {
                log::warn!(
                    "Task for pathway '{}' at sample size {} failed ({}): {}",
                    diagnostic.pathway_id.as_deref().unwrap_or_default(),
                    diagnostic.sample_size,
                    diagnostic.kind,
                    diagnostic.message
                );
                report.diagnostics.push(diagnostic);
            }
        }
    }
    report.excluded.sort();
    report
        .diagnostics
        .sort_by(|a, b| (&a.pathway_id, a.sample_size).cmp(&(&b.pathway_id, b.sample_size)));
    Ok(report)
}

/// Executes every payload on `workers` threads and merges the outcomes.
///
/// With one worker the tasks run sequentially on the calling thread.
pub fn run_tasks(
    payloads: &[TaskPayload<'_>],
    workers: usize,
    observer: &dyn RunProgressObserver,
) -> Result<OrchestratorReport, OrchestratorError> {
    let workers = resolve_worker_count(workers);
    observer.on_dispatch(payloads.len());
    log::info!(
        "Dispatching {} tasks on {} worker{}",
        payloads.len(),
        workers,
        if workers == 1 { "" } else { "s" }
    );

    let outcomes: Vec<TaskOutcome> = if workers == 1 {
        payloads.iter().map(|p| execute(p, observer)).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
        pool.install(|| payloads.par_iter().map(|p| execute(p, observer)).collect())
    };
    observer.on_finish();

    let report = merge_outcomes(outcomes)?;
    log::info!(
        "Tasks finished: {} scored, {} not applicable, {} failed",
        report.results.len(),
        report.excluded.len(),
        report.diagnostics.len()
    );
    Ok(report)
}
