//! Rank-based ROC-AUC.
//!
//! The AUC equals the Mann-Whitney U statistic of the positive scores divided by
//! `n_pos · n_neg`. Tied scores receive their average rank, which counts every
//! positive/negative tie as one half.

use crate::types::Class;
use ndarray::ArrayView1;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AucError {
    #[error("Received {scores} scores but {labels} labels.")]
    LengthMismatch { scores: usize, labels: usize },
    #[error("ROC-AUC needs both classes; no {0} rows were present.")]
    MissingClass(Class),
    #[error("Score at position {0} is not finite.")]
    NonFiniteScore(usize),
}

/// ROC-AUC where higher scores are expected for `Group2`.
pub fn roc_auc(scores: ArrayView1<f64>, classes: &[Class]) -> Result<f64, AucError> {
    if scores.len() != classes.len() {
        return Err(AucError::LengthMismatch {
            scores: scores.len(),
            labels: classes.len(),
        });
    }
    if let Some(position) = scores.iter().position(|s| !s.is_finite()) {
        return Err(AucError::NonFiniteScore(position));
    }
    let n_pos = classes.iter().filter(|c| c.is_positive()).count();
    let n_neg = classes.len() - n_pos;
    if n_pos == 0 {
        return Err(AucError::MissingClass(Class::Group2));
    }
    if n_neg == 0 {
        return Err(AucError::MissingClass(Class::Group1));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // Sum of 1-based average ranks of the positive rows.
    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        let average_rank = (start + end + 2) as f64 / 2.0;
        let tied_positives = order[start..=end]
            .iter()
            .filter(|&&i| classes[i].is_positive())
            .count();
        positive_rank_sum += average_rank * tied_positives as f64;
        start = end + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    let u = positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0;
    Ok(u / (n_pos * n_neg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, array};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::types::Class::{Group1 as G1, Group2 as G2};

    /// Direct pairwise count, used as the reference estimator.
    fn pairwise_auc(scores: &[f64], classes: &[Class]) -> f64 {
        let mut wins = 0.0;
        let mut pairs = 0.0;
        for (i, ci) in classes.iter().enumerate() {
            for (j, cj) in classes.iter().enumerate() {
                if ci.is_positive() && !cj.is_positive() {
                    pairs += 1.0;
                    if scores[i] > scores[j] {
                        wins += 1.0;
                    } else if scores[i] == scores[j] {
                        wins += 0.5;
                    }
                }
            }
        }
        wins / pairs
    }

    #[test]
    fn perfect_and_inverted_rankings() {
        let classes = [G1, G1, G2, G2];
        assert_eq!(roc_auc(array![0.1, 0.2, 0.8, 0.9].view(), &classes).unwrap(), 1.0);
        assert_eq!(roc_auc(array![0.9, 0.8, 0.2, 0.1].view(), &classes).unwrap(), 0.0);
    }

    #[test]
    fn ties_count_as_half() {
        let classes = [G1, G2];
        assert_eq!(roc_auc(array![0.5, 0.5].view(), &classes).unwrap(), 0.5);
        let classes = [G1, G1, G2, G2, G2];
        let scores = [0.3, 0.7, 0.7, 0.7, 0.9];
        let expected = pairwise_auc(&scores, &classes);
        let got = roc_auc(Array1::from(scores.to_vec()).view(), &classes).unwrap();
        assert_abs_diff_eq!(got, expected, epsilon = 1e-12);
    }

    #[test]
    fn matches_pairwise_definition_on_random_data() {
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..50 {
            let n = rng.gen_range(2..40);
            let mut classes: Vec<Class> = (0..n)
                .map(|_| if rng.gen_bool(0.5) { G2 } else { G1 })
                .collect();
            classes[0] = G1;
            classes[1] = G2;
            let scores: Vec<f64> = (0..n).map(|_| (rng.gen_range(0..6) as f64) / 5.0).collect();
            let got = roc_auc(Array1::from(scores.clone()).view(), &classes).unwrap();
            assert!((0.0..=1.0).contains(&got));
            assert_abs_diff_eq!(got, pairwise_auc(&scores, &classes), epsilon = 1e-12);
        }
    }

    #[test]
    fn degenerate_inputs_fail() {
        assert_eq!(
            roc_auc(array![0.1, 0.2].view(), &[G1, G1]),
            Err(AucError::MissingClass(Class::Group2))
        );
        assert_eq!(
            roc_auc(array![0.1].view(), &[G1, G2]),
            Err(AucError::LengthMismatch {
                scores: 1,
                labels: 2
            })
        );
        assert_eq!(
            roc_auc(array![0.1, f64::NAN].view(), &[G1, G2]),
            Err(AucError::NonFiniteScore(1))
        );
    }
}
