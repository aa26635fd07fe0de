//! # Pathway Trainer
//!
//! Trains one ridge logistic classifier restricted to a single pathway's genes.
//! The penalty is chosen by repeated stratified cross-validation on the training
//! rows, then a final model is refitted on all training rows with that penalty.

use crate::catalog::Pathway;
use crate::cohort::{ColumnSelection, Cohort, CohortError};
use crate::crossval::{CvError, CvProfile, CvSettings, repeated_cv};
use crate::logistic::{FitError, FitStatus, RidgeLogisticFit, RidgeOptions, fit_ridge_logistic};
use crate::standardize::{StandardizeError, Standardizer};
use ndarray::Array1;
use rand::Rng;
use thiserror::Error;

/// Everything a task needs to know about model selection.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerSettings {
    pub cv: CvSettings,
    pub lambda_grid: Vec<f64>,
    pub ridge: RidgeOptions,
}

#[derive(Error, Debug)]
pub enum TrainError {
    #[error(
        "Pathway '{pathway_id}' has no genes in the sample size {sample_size} cohort and cannot be scored."
    )]
    PathwayNotApplicable {
        pathway_id: String,
        sample_size: usize,
    },
    #[error(
        "No penalty produced a cross-validated AUC for pathway '{pathway_id}' at sample size {sample_size}."
    )]
    NoUsableLambda {
        pathway_id: String,
        sample_size: usize,
    },
    #[error("Cross-validation failed for pathway '{pathway_id}' at sample size {sample_size}: {source}")]
    CrossValidation {
        pathway_id: String,
        sample_size: usize,
        #[source]
        source: CvError,
    },
    #[error("Final fit failed for pathway '{pathway_id}' at sample size {sample_size}: {source}")]
    Fit {
        pathway_id: String,
        sample_size: usize,
        #[source]
        source: FitError,
    },
    #[error("Column projection failed for pathway '{pathway_id}' at sample size {sample_size}: {source}")]
    Projection {
        pathway_id: String,
        sample_size: usize,
        #[source]
        source: CohortError,
    },
    #[error("Standardization failed for pathway '{pathway_id}' at sample size {sample_size}: {source}")]
    Standardize {
        pathway_id: String,
        sample_size: usize,
        #[source]
        source: StandardizeError,
    },
}

impl TrainError {
    pub fn is_not_applicable(&self) -> bool {
        matches!(self, Self::PathwayNotApplicable { .. })
    }
}

/// A fitted classifier bound to one (pathway, sample size) pair.
#[derive(Debug, Clone)]
pub struct TrainedPathwayModel {
    pathway_id: String,
    sample_size: usize,
    selection: ColumnSelection,
    standardizer: Standardizer,
    fit: RidgeLogisticFit,
    cv_profile: CvProfile,
    cv_auc: f64,
    n_train: usize,
}

impl TrainedPathwayModel {
    pub fn pathway_id(&self) -> &str {
        &self.pathway_id
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Mean cross-validated ROC-AUC of the selected penalty.
    pub fn cv_auc(&self) -> f64 {
        self.cv_auc
    }

    pub fn selected_lambda(&self) -> f64 {
        self.fit.lambda
    }

    pub fn genes(&self) -> &[String] {
        self.selection.names()
    }

    pub fn n_train(&self) -> usize {
        self.n_train
    }

    pub fn cv_profile(&self) -> &CvProfile {
        &self.cv_profile
    }

    /// Training-row statistics applied to every row this model scores.
    pub fn standardizer(&self) -> &Standardizer {
        &self.standardizer
    }

    pub fn fit(&self) -> &RidgeLogisticFit {
        &self.fit
    }

    /// Probability of `Group2` for every row of `rows`.
    pub fn predict_probability(&self, rows: &Cohort) -> Result<Array1<f64>, TrainError> {
        let x = rows
            .project(&self.selection)
            .map_err(|source| TrainError::Projection {
                pathway_id: self.pathway_id.clone(),
                sample_size: self.sample_size,
                source,
            })?;
        let z = self
            .standardizer
            .transform(x.view())
            .map_err(|source| TrainError::Standardize {
                pathway_id: self.pathway_id.clone(),
                sample_size: self.sample_size,
                source,
            })?;
        Ok(self.fit.predict_probability(z.view()))
    }
}

/// Trains and tunes a classifier on `train` using only the genes of `pathway`.
pub fn train_pathway<R: Rng + ?Sized>(
    pathway: &Pathway,
    train: &Cohort,
    settings: &TrainerSettings,
    rng: &mut R,
) -> Result<TrainedPathwayModel, TrainError> {
    let pathway_id = pathway.term().to_string();
    let sample_size = train.sample_size();

    let selection = train.schema().resolve(pathway.genes());
    if selection.is_empty() {
        return Err(TrainError::PathwayNotApplicable {
            pathway_id,
            sample_size,
        });
    }
    let x = train
        .project(&selection)
        .map_err(|source| TrainError::Projection {
            pathway_id: pathway_id.clone(),
            sample_size,
            source,
        })?;

    let cv_profile = repeated_cv(
        x.view(),
        train.classes(),
        &settings.lambda_grid,
        &settings.cv,
        &settings.ridge,
        rng,
    )
    .map_err(|source| TrainError::CrossValidation {
        pathway_id: pathway_id.clone(),
        sample_size,
        source,
    })?;

    let best = cv_profile
        .best()
        .cloned()
        .ok_or_else(|| TrainError::NoUsableLambda {
            pathway_id: pathway_id.clone(),
            sample_size,
        })?;
    log::debug!(
        "Pathway '{}' (n={}): selected lambda={:.3e} with CV AUC {:.4} over {} folds",
        pathway_id,
        sample_size,
        best.lambda,
        best.mean_auc,
        best.scored_folds
    );

    let standardizer = Standardizer::fit(x.view()).map_err(|source| TrainError::Standardize {
        pathway_id: pathway_id.clone(),
        sample_size,
        source,
    })?;
    let z = standardizer
        .transform(x.view())
        .map_err(|source| TrainError::Standardize {
            pathway_id: pathway_id.clone(),
            sample_size,
            source,
        })?;
    let fit = fit_ridge_logistic(z.view(), train.responses().view(), best.lambda, &settings.ridge)
        .map_err(|source| TrainError::Fit {
            pathway_id: pathway_id.clone(),
            sample_size,
            source,
        })?;
    if fit.status == FitStatus::MaxIterationsReached {
        log::warn!(
            "Final fit for pathway '{}' at sample size {} did not converge in {} iterations",
            pathway_id,
            sample_size,
            fit.iterations
        );
    }

    Ok(TrainedPathwayModel {
        pathway_id,
        sample_size,
        selection,
        standardizer,
        fit,
        cv_profile,
        cv_auc: best.mean_auc,
        n_train: train.n_rows(),
    })
}
