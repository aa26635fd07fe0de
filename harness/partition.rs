//! Stratified train/test partitioning of a cohort.

use crate::cohort::Cohort;
use crate::types::Class;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;

pub const DEFAULT_SPLIT_FRACTION: f64 = 0.8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PartitionError {
    #[error(
        "Class {class} has only {found} rows in the sample size {sample_size} cohort; a stratified split needs at least 2."
    )]
    InsufficientData {
        class: Class,
        found: usize,
        sample_size: usize,
    },
    #[error("Split fraction must lie strictly between 0 and 1, got {0}.")]
    InvalidFraction(f64),
}

/// Disjoint train and test cohorts that together cover the source cohort.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Cohort,
    pub test: Cohort,
}

impl Split {
    pub fn sample_size(&self) -> usize {
        self.train.sample_size()
    }
}

/// Number of training rows drawn from a class of `count` rows.
///
/// Rounds to the nearest row and always leaves at least one row on each side.
fn train_rows_for(count: usize, fraction: f64) -> usize {
    let target = (fraction * count as f64).round() as usize;
    target.clamp(1, count - 1)
}

/// Splits `cohort` so that each class contributes `fraction` of its rows to the
/// training set. The same `seed` always selects the same rows.
pub fn stratified_split(cohort: &Cohort, fraction: f64, seed: u64) -> Result<Split, PartitionError> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(PartitionError::InvalidFraction(fraction));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train_rows = Vec::with_capacity(cohort.n_rows());
    let mut test_rows = Vec::with_capacity(cohort.n_rows());

    for class in Class::ALL {
        let mut members: Vec<usize> = cohort
            .classes()
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == class)
            .map(|(i, _)| i)
            .collect();
        if members.len() < 2 {
            return Err(PartitionError::InsufficientData {
                class,
                found: members.len(),
                sample_size: cohort.sample_size(),
            });
        }
        members.shuffle(&mut rng);
        let n_train = train_rows_for(members.len(), fraction);
        train_rows.extend_from_slice(&members[..n_train]);
        test_rows.extend_from_slice(&members[n_train..]);
    }

    train_rows.sort_unstable();
    test_rows.sort_unstable();
    log::debug!(
        "Split sample size {} cohort into {} training and {} test rows",
        cohort.sample_size(),
        train_rows.len(),
        test_rows.len()
    );
    Ok(Split {
        train: cohort.subset_rows(&train_rows),
        test: cohort.subset_rows(&test_rows),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::GeneSchema;
    use ndarray::Array2;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn toy_cohort(group1: usize, group2: usize) -> Cohort {
        let schema = Arc::new(GeneSchema::new(vec!["G1".to_string()]));
        let n = group1 + group2;
        let expression = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        let classes = std::iter::repeat_n(Class::Group1, group1)
            .chain(std::iter::repeat_n(Class::Group2, group2))
            .collect();
        Cohort::new(group1.max(group2), schema, expression, classes).unwrap()
    }

    #[test]
    fn split_is_a_stratified_partition() {
        let cohort = toy_cohort(20, 20);
        let split = stratified_split(&cohort, 0.8, 17).unwrap();
        assert_eq!(split.train.n_rows(), 32);
        assert_eq!(split.test.n_rows(), 8);
        assert_eq!(split.train.class_count(Class::Group1), 16);
        assert_eq!(split.train.class_count(Class::Group2), 16);

        let train: HashSet<usize> = split.train.row_ids().iter().copied().collect();
        let test: HashSet<usize> = split.test.row_ids().iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), 40);
        assert_eq!(split.sample_size(), 20);
    }

    #[test]
    fn train_size_stays_within_one_row_of_target() {
        for (g1, g2) in [(7, 7), (13, 13), (11, 29), (9, 9), (50, 50)] {
            for fraction in [0.5, 0.66, 0.8, 0.9] {
                let cohort = toy_cohort(g1, g2);
                let split = stratified_split(&cohort, fraction, 1).unwrap();
                let target = fraction * (g1 + g2) as f64;
                let diff = (split.train.n_rows() as f64 - target).abs();
                assert!(diff <= 1.0 + 1e-9, "{g1}/{g2} at {fraction}: {diff}");
                assert!(split.test.class_count(Class::Group1) >= 1);
                assert!(split.test.class_count(Class::Group2) >= 1);
            }
        }
    }

    #[test]
    fn same_seed_same_membership() {
        let cohort = toy_cohort(25, 25);
        let a = stratified_split(&cohort, 0.8, 99).unwrap();
        let b = stratified_split(&cohort, 0.8, 99).unwrap();
        let c = stratified_split(&cohort, 0.8, 100).unwrap();
        assert_eq!(a.train.row_ids(), b.train.row_ids());
        assert_eq!(a.test.row_ids(), b.test.row_ids());
        assert_ne!(a.train.row_ids(), c.train.row_ids());
    }

    #[test]
    fn tiny_class_is_insufficient() {
        let cohort = toy_cohort(1, 5);
        let err = stratified_split(&cohort, 0.8, 0).unwrap_err();
        assert_eq!(
            err,
            PartitionError::InsufficientData {
                class: Class::Group1,
                found: 1,
                sample_size: 5
            }
        );
    }

    #[test]
    fn fraction_bounds_are_enforced() {
        let cohort = toy_cohort(4, 4);
        assert!(matches!(
            stratified_split(&cohort, 1.0, 0),
            Err(PartitionError::InvalidFraction(_))
        ));
        assert!(matches!(
            stratified_split(&cohort, f64::NAN, 0),
            Err(PartitionError::InvalidFraction(_))
        ));
    }
}
