//! Column centering and scaling fitted on training rows only.
//!
//! A `Standardizer` is always fitted on the rows a model is trained on and then
//! applied unchanged to validation or test rows, so no statistic ever sees
//! held-out data.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use thiserror::Error;

/// Columns whose standard deviation falls below this are left unscaled.
const MIN_SCALE: f64 = 1e-12;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StandardizeError {
    #[error("Cannot fit standardization on a matrix with no rows.")]
    NoRows,
    #[error("Standardizer was fitted on {expected} columns but received {found}.")]
    ColumnMismatch { expected: usize, found: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl Standardizer {
    /// Column means and sample standard deviations (n - 1 denominator).
    pub fn fit(x: ArrayView2<f64>) -> Result<Self, StandardizeError> {
        let n = x.nrows();
        let means = x.mean_axis(Axis(0)).ok_or(StandardizeError::NoRows)?;
        let scales = if n < 2 {
            Array1::ones(x.ncols())
        } else {
            x.std_axis(Axis(0), 1.0)
                .mapv(|sd| if sd.is_finite() && sd > MIN_SCALE { sd } else { 1.0 })
        };
        Ok(Self { means, scales })
    }

    pub fn means(&self) -> &Array1<f64> {
        &self.means
    }

    pub fn scales(&self) -> &Array1<f64> {
        &self.scales
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, StandardizeError> {
        if x.ncols() != self.means.len() {
            return Err(StandardizeError::ColumnMismatch {
                expected: self.means.len(),
                found: x.ncols(),
            });
        }
        let centered = &x - &self.means.view().insert_axis(Axis(0));
        Ok(centered / &self.scales.view().insert_axis(Axis(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn transform_uses_fitted_statistics_only() {
        let train = array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]];
        let test = array![[100.0, 50.0], [-100.0, 0.0]];
        let standardizer = Standardizer::fit(train.view()).unwrap();

        assert_eq!(standardizer.means(), &array![3.0, 10.0]);
        assert_abs_diff_eq!(standardizer.scales()[0], 2.0, epsilon = 1e-12);
        // Constant column keeps unit scale.
        assert_eq!(standardizer.scales()[1], 1.0);

        let transformed = standardizer.transform(test.view()).unwrap();
        assert_abs_diff_eq!(transformed[[0, 0]], 48.5, epsilon = 1e-12);
        assert_abs_diff_eq!(transformed[[1, 0]], -51.5, epsilon = 1e-12);
        assert_abs_diff_eq!(transformed[[0, 1]], 40.0, epsilon = 1e-12);
    }

    #[test]
    fn training_rows_become_standard() {
        let train = array![[2.0, -1.0], [4.0, 0.5], [9.0, 3.0], [1.0, 2.0]];
        let standardizer = Standardizer::fit(train.view()).unwrap();
        let z = standardizer.transform(train.view()).unwrap();
        let means = z.mean_axis(Axis(0)).unwrap();
        let sds = z.std_axis(Axis(0), 1.0);
        for j in 0..2 {
            assert_abs_diff_eq!(means[j], 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(sds[j], 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn width_mismatch_and_empty_input_fail() {
        let standardizer = Standardizer::fit(array![[1.0], [2.0]].view()).unwrap();
        assert_eq!(
            standardizer.transform(array![[1.0, 2.0]].view()),
            Err(StandardizeError::ColumnMismatch {
                expected: 1,
                found: 2
            })
        );
        let empty = Array2::<f64>::zeros((0, 3));
        assert_eq!(
            Standardizer::fit(empty.view()),
            Err(StandardizeError::NoRows)
        );
    }
}
