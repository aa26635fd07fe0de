//! # Repeated Stratified Cross-Validation
//!
//! Scores every penalty in the grid by mean validation ROC-AUC over
//! `repeats × k_folds` stratified folds of the training rows. Each fold fits its
//! own `Standardizer` on the fold's training part only, so validation rows never
//! contribute to centering or scaling.

use crate::auc::roc_auc;
use crate::logistic::{RidgeOptions, fit_ridge_logistic};
use crate::standardize::{StandardizeError, Standardizer};
use crate::types::Class;
use ndarray::{Array1, ArrayView2, Axis};
use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;

pub const DEFAULT_K_FOLDS: usize = 5;
pub const DEFAULT_REPEATS: usize = 5;

#[derive(Error, Debug)]
pub enum CvError {
    #[error("Cross-validation needs at least 2 folds, got {0}.")]
    TooFewFolds(usize),
    #[error("Cross-validation needs at least one repeat.")]
    NoRepeats,
    #[error("The penalty grid is empty.")]
    EmptyGrid,
    #[error("Feature matrix has {rows} rows but {labels} class labels were supplied.")]
    LengthMismatch { rows: usize, labels: usize },
    #[error(transparent)]
    Standardize(#[from] StandardizeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CvSettings {
    pub k_folds: usize,
    pub repeats: usize,
}

impl Default for CvSettings {
    fn default() -> Self {
        Self {
            k_folds: DEFAULT_K_FOLDS,
            repeats: DEFAULT_REPEATS,
        }
    }
}

/// Cross-validated performance of one penalty value.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaScore {
    pub lambda: f64,
    pub mean_auc: f64,
    pub sd_auc: f64,
    /// Folds that produced a validation AUC for this penalty.
    pub scored_folds: usize,
    /// Folds where the model fit itself failed.
    pub failed_fits: usize,
}

impl LambdaScore {
    pub fn is_eligible(&self) -> bool {
        self.scored_folds > 0 && self.mean_auc.is_finite()
    }
}

/// Scores for every penalty, in grid order.
#[derive(Debug, Clone, PartialEq)]
pub struct CvProfile {
    pub scores: Vec<LambdaScore>,
}

impl CvProfile {
    /// The penalty with the highest mean AUC; the earliest grid entry wins ties.
    pub fn best(&self) -> Option<&LambdaScore> {
        self.scores
            .iter()
            .filter(|s| s.is_eligible())
            .fold(None, |best: Option<&LambdaScore>, candidate| match best {
                Some(current) if current.mean_auc >= candidate.mean_auc => Some(current),
                _ => Some(candidate),
            })
    }
}

/// Assigns every row to one of `k` folds, class by class.
///
/// Each class is shuffled and dealt round-robin; the dealing position carries
/// over between classes so fold sizes differ by at most one row.
pub fn stratified_folds<R: Rng + ?Sized>(classes: &[Class], k: usize, rng: &mut R) -> Vec<Vec<usize>> {
    let mut folds = vec![Vec::new(); k];
    let mut slot = 0;
    for class in Class::ALL {
        let mut members: Vec<usize> = classes
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == class)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(rng);
        for row in members {
            folds[slot % k].push(row);
            slot += 1;
        }
    }
    for fold in folds.iter_mut() {
        fold.sort_unstable();
    }
    folds
}

fn mean_and_sd(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Runs repeated stratified k-fold cross-validation over `lambda_grid`.
pub fn repeated_cv<R: Rng + ?Sized>(
    x: ArrayView2<f64>,
    classes: &[Class],
    lambda_grid: &[f64],
    settings: &CvSettings,
    options: &RidgeOptions,
    rng: &mut R,
) -> Result<CvProfile, CvError> {
    if settings.k_folds < 2 {
        return Err(CvError::TooFewFolds(settings.k_folds));
    }
    if settings.repeats == 0 {
        return Err(CvError::NoRepeats);
    }
    if lambda_grid.is_empty() {
        return Err(CvError::EmptyGrid);
    }
    if x.nrows() != classes.len() {
        return Err(CvError::LengthMismatch {
            rows: x.nrows(),
            labels: classes.len(),
        });
    }

    let mut fold_aucs: Vec<Vec<f64>> = vec![Vec::new(); lambda_grid.len()];
    let mut failed_fits = vec![0usize; lambda_grid.len()];

    for repeat in 0..settings.repeats {
        let folds = stratified_folds(classes, settings.k_folds, rng);
        for (fold_idx, validation_rows) in folds.iter().enumerate() {
            let validation_classes: Vec<Class> =
                validation_rows.iter().map(|&r| classes[r]).collect();
            let has_both = Class::ALL
                .iter()
                .all(|class| validation_classes.contains(class));
            if !has_both {
                log::debug!(
                    "Repeat {} fold {} has a single-class validation set; skipping",
                    repeat + 1,
                    fold_idx + 1
                );
                continue;
            }

            let mut in_validation = vec![false; classes.len()];
            for &r in validation_rows {
                in_validation[r] = true;
            }
            let training_rows: Vec<usize> =
                (0..classes.len()).filter(|&r| !in_validation[r]).collect();

            let train_x = x.select(Axis(0), &training_rows);
            let standardizer = Standardizer::fit(train_x.view())?;
            let train_x = standardizer.transform(train_x.view())?;
            let validation_x = standardizer.transform(x.select(Axis(0), validation_rows).view())?;
            let train_y: Array1<f64> = training_rows.iter().map(|&r| classes[r].response()).collect();

            for (lambda_idx, &lambda) in lambda_grid.iter().enumerate() {
                let fit = match fit_ridge_logistic(train_x.view(), train_y.view(), lambda, options) {
                    Ok(fit) => fit,
                    Err(e) => {
                        log::debug!(
                            "Repeat {} fold {}: fit with lambda={:.3e} failed: {}",
                            repeat + 1,
                            fold_idx + 1,
                            lambda,
                            e
                        );
                        failed_fits[lambda_idx] += 1;
                        continue;
                    }
                };
                let probabilities = fit.predict_probability(validation_x.view());
                match roc_auc(probabilities.view(), &validation_classes) {
                    Ok(auc) => fold_aucs[lambda_idx].push(auc),
                    Err(e) => {
                        log::debug!("Validation AUC unavailable for lambda={lambda:.3e}: {e}");
                        failed_fits[lambda_idx] += 1;
                    }
                }
            }
        }
    }

    let scores = lambda_grid
        .iter()
        .zip(fold_aucs.iter().zip(failed_fits))
        .map(|(&lambda, (aucs, failed))| {
            let (mean_auc, sd_auc) = mean_and_sd(aucs);
            LambdaScore {
                lambda,
                mean_auc,
                sd_auc,
                scored_folds: aucs.len(),
                failed_fits: failed,
            }
        })
        .collect();
    Ok(CvProfile { scores })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::StandardNormal;

    fn score(lambda: f64, mean_auc: f64, scored_folds: usize) -> LambdaScore {
        LambdaScore {
            lambda,
            mean_auc,
            sd_auc: 0.0,
            scored_folds,
            failed_fits: 0,
        }
    }

    #[test]
    fn best_prefers_first_of_tied_maxima() {
        let profile = CvProfile {
            scores: vec![
                score(0.01, 0.7, 25),
                score(0.1, 0.8, 25),
                score(1.0, 0.8, 25),
                score(10.0, 0.6, 25),
            ],
        };
        assert_eq!(profile.best().unwrap().lambda, 0.1);
    }

    #[test]
    fn best_skips_ineligible_penalties() {
        let profile = CvProfile {
            scores: vec![score(0.01, f64::NAN, 0), score(0.1, 0.55, 3)],
        };
        assert_eq!(profile.best().unwrap().lambda, 0.1);
        let none = CvProfile {
            scores: vec![score(0.01, f64::NAN, 0)],
        };
        assert!(none.best().is_none());
    }

    #[test]
    fn folds_partition_rows_and_stay_stratified() {
        let classes: Vec<Class> = (0..32)
            .map(|i| if i < 16 { Class::Group1 } else { Class::Group2 })
            .collect();
        let mut rng = StdRng::seed_from_u64(2);
        let folds = stratified_folds(&classes, 5, &mut rng);
        assert_eq!(folds.len(), 5);

        let mut all: Vec<usize> = folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..32).collect::<Vec<_>>());

        for fold in &folds {
            assert!(fold.len() == 6 || fold.len() == 7);
            let positives = fold.iter().filter(|&&r| classes[r].is_positive()).count();
            assert!((3..=4).contains(&positives), "{fold:?}");
        }
    }

    #[test]
    fn cv_ranks_informative_features_above_chance() {
        let mut rng = StdRng::seed_from_u64(10);
        let n = 120;
        let classes: Vec<Class> = (0..n)
            .map(|i| if i % 2 == 0 { Class::Group1 } else { Class::Group2 })
            .collect();
        let x = Array2::from_shape_fn((n, 3), |(i, j)| {
            let noise: f64 = rng.sample(StandardNormal);
            if j == 0 && classes[i].is_positive() { noise + 1.5 } else { noise }
        });
        let grid = [0.001, 0.01, 0.1, 1.0];
        let profile = repeated_cv(
            x.view(),
            &classes,
            &grid,
            &CvSettings { k_folds: 5, repeats: 2 },
            &RidgeOptions::default(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(profile.scores.len(), 4);
        for s in &profile.scores {
            assert_eq!(s.scored_folds, 10);
            assert!(s.mean_auc > 0.75, "{s:?}");
        }
        assert!(profile.best().is_some());
    }

    #[test]
    fn invalid_settings_fail_fast() {
        let x = Array2::<f64>::zeros((4, 1));
        let classes = [Class::Group1, Class::Group1, Class::Group2, Class::Group2];
        let mut rng = StdRng::seed_from_u64(0);
        let options = RidgeOptions::default();
        assert!(matches!(
            repeated_cv(x.view(), &classes, &[0.1], &CvSettings { k_folds: 1, repeats: 1 }, &options, &mut rng),
            Err(CvError::TooFewFolds(1))
        ));
        assert!(matches!(
            repeated_cv(x.view(), &classes, &[], &CvSettings::default(), &options, &mut rng),
            Err(CvError::EmptyGrid)
        ));
    }
}
