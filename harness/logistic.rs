//! # Ridge-Penalized Logistic Regression
//!
//! Fits `logit P(Group2) = β₀ + xᵀβ` by minimising
//!
//! ```text
//! -(1/n)·loglik(β₀, β) + (λ/2)·‖β‖²
//! ```
//!
//! with an unpenalized intercept. This is the elastic-net objective at mixing
//! parameter zero. The solver is penalized iteratively reweighted least squares:
//! each iteration solves `(XᵀWX + nλD)·β = XᵀWz` for the working response `z`,
//! and the proposed step is halved until the penalized deviance does not increase.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip, concatenate};
use ndarray_linalg::Solve;
use thiserror::Error;

const PROB_EPS: f64 = 1e-10;
const MIN_WEIGHT: f64 = 1e-10;
const MAX_STEP_HALVINGS: usize = 30;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("Design matrix has {rows} rows but the response has {responses} entries.")]
    DimensionMismatch { rows: usize, responses: usize },
    #[error("Cannot fit a model without observations.")]
    NoObservations,
    #[error("Penalty must be finite and non-negative, got {0}.")]
    InvalidLambda(f64),
    #[error("Response values must be exactly 0 or 1; found {0}.")]
    InvalidResponse(f64),
    #[error("The penalized weighted least-squares system is singular: {0}")]
    SingularSystem(#[from] ndarray_linalg::error::LinalgError),
    #[error("Non-finite coefficients appeared at IRLS iteration {iteration}.")]
    NonFinite { iteration: usize },
}

/// Controls for the IRLS loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RidgeOptions {
    pub max_iterations: usize,
    /// Relative change in penalized deviance below which the fit is converged.
    pub tolerance: f64,
}

impl Default for RidgeOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

/// The status of the IRLS convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    /// Converged successfully within tolerance.
    Converged,
    /// Reached the iteration limit; coefficients are the last accepted iterate.
    MaxIterationsReached,
}

#[derive(Debug, Clone)]
pub struct RidgeLogisticFit {
    pub intercept: f64,
    pub coefficients: Array1<f64>,
    pub lambda: f64,
    /// Unpenalized binomial deviance at the final coefficients.
    pub deviance: f64,
    pub iterations: usize,
    pub status: FitStatus,
}

impl RidgeLogisticFit {
    pub fn linear_predictor(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients) + self.intercept
    }

    /// Probability of the positive class for each row of `x`.
    pub fn predict_probability(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.linear_predictor(x).mapv(sigmoid)
    }
}

fn sigmoid(eta: f64) -> f64 {
    let eta = eta.clamp(-700.0, 700.0);
    1.0 / (1.0 + (-eta).exp())
}

/// Mean, IRLS weights and working response for the current linear predictor.
fn update_glm_vectors(
    y: ArrayView1<f64>,
    eta: &Array1<f64>,
) -> (Array1<f64>, Array1<f64>, Array1<f64>) {
    let mu = eta.mapv(|e| sigmoid(e).clamp(PROB_EPS, 1.0 - PROB_EPS));
    let weights = mu.mapv(|m| (m * (1.0 - m)).max(MIN_WEIGHT));
    let z = Zip::from(eta)
        .and(y)
        .and(&mu)
        .and(&weights)
        .map_collect(|&e, &yi, &m, &w| e + (yi - m) / w);
    (mu, weights, z)
}

/// Binomial deviance, `-2·loglik`, for 0/1 responses.
pub fn binomial_deviance(y: ArrayView1<f64>, mu: &Array1<f64>) -> f64 {
    let total = Zip::from(y).and(mu).fold(0.0, |acc, &yi, &mi| {
        let m = mi.clamp(PROB_EPS, 1.0 - PROB_EPS);
        acc - if yi > 0.5 { m.ln() } else { (1.0 - m).ln() }
    });
    2.0 * total
}

fn penalized_deviance(
    y: ArrayView1<f64>,
    design: &Array2<f64>,
    beta: &Array1<f64>,
    penalty_weight: f64,
) -> (f64, f64) {
    let eta = design.dot(beta);
    let mu = eta.mapv(sigmoid);
    let deviance = binomial_deviance(y, &mu);
    let ridge = beta.iter().skip(1).map(|b| b * b).sum::<f64>();
    (deviance + penalty_weight * ridge, deviance)
}

/// Fits a ridge logistic regression of `y` (0/1) on the columns of `x`.
pub fn fit_ridge_logistic(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    lambda: f64,
    options: &RidgeOptions,
) -> Result<RidgeLogisticFit, FitError> {
    let n = x.nrows();
    if n != y.len() {
        return Err(FitError::DimensionMismatch {
            rows: n,
            responses: y.len(),
        });
    }
    if n == 0 {
        return Err(FitError::NoObservations);
    }
    if !lambda.is_finite() || lambda < 0.0 {
        return Err(FitError::InvalidLambda(lambda));
    }
    if let Some(&bad) = y.iter().find(|&&v| v != 0.0 && v != 1.0) {
        return Err(FitError::InvalidResponse(bad));
    }

    let design = concatenate![Axis(1), Array2::ones((n, 1)), x];
    let p = design.ncols();
    let penalty_weight = n as f64 * lambda;
    let mut penalty = Array2::<f64>::eye(p) * penalty_weight;
    penalty[[0, 0]] = 0.0;

    // Start from the intercept-only fit.
    let prevalence = (y.sum() / n as f64).clamp(0.01, 0.99);
    let mut beta = Array1::<f64>::zeros(p);
    beta[0] = (prevalence / (1.0 - prevalence)).ln();
    let (mut objective, mut deviance) = penalized_deviance(y, &design, &beta, penalty_weight);
    let mut status = FitStatus::MaxIterationsReached;
    let mut iterations = 0;

    for iter in 1..=options.max_iterations {
        iterations = iter;
        let eta = design.dot(&beta);
        let (_, weights, z) = update_glm_vectors(y, &eta);

        let weighted = &design * &weights.view().insert_axis(Axis(1));
        let lhs = design.t().dot(&weighted) + &penalty;
        let rhs = weighted.t().dot(&z);
        let proposal = lhs.solve(&rhs)?;
        if !proposal.iter().all(|v| v.is_finite()) {
            return Err(FitError::NonFinite { iteration: iter });
        }

        let mut step = &proposal - &beta;
        let mut accepted = None;
        for halving in 0..=MAX_STEP_HALVINGS {
            let candidate = &beta + &step;
            let (candidate_objective, candidate_deviance) =
                penalized_deviance(y, &design, &candidate, penalty_weight);
            if candidate_objective.is_finite() && candidate_objective <= objective * (1.0 + 1e-12) {
                if halving > 0 {
                    log::debug!("IRLS iteration {iter}: accepted step after {halving} halvings");
                }
                accepted = Some((candidate, candidate_objective, candidate_deviance));
                break;
            }
            step.mapv_inplace(|v| v * 0.5);
        }

        let Some((candidate, candidate_objective, candidate_deviance)) = accepted else {
            // No descent direction left: the current iterate is a minimum to working precision.
            status = FitStatus::Converged;
            break;
        };

        let change = (objective - candidate_objective).abs() / (candidate_objective.abs() + 0.1);
        beta = candidate;
        objective = candidate_objective;
        deviance = candidate_deviance;
        if change < options.tolerance {
            status = FitStatus::Converged;
            break;
        }
    }

    if status == FitStatus::MaxIterationsReached {
        log::debug!(
            "Ridge logistic fit (lambda={lambda:.3e}) stopped after {iterations} iterations without converging"
        );
    }

    Ok(RidgeLogisticFit {
        intercept: beta[0],
        coefficients: beta.slice(ndarray::s![1..]).to_owned(),
        lambda,
        deviance,
        iterations,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    fn simulated(n: usize, beta: &[f64], seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let x = Array2::from_shape_fn((n, beta.len()), |_| rng.sample(StandardNormal));
        let y = x
            .rows()
            .into_iter()
            .map(|row| {
                let eta: f64 = row.iter().zip(beta).map(|(a, b)| a * b).sum();
                if rng.r#gen::<f64>() < sigmoid(eta) { 1.0 } else { 0.0 }
            })
            .collect();
        (x, y)
    }

    #[test]
    fn recovers_coefficients_without_penalty() {
        let (x, y) = simulated(4000, &[1.0, -0.5], 21);
        let fit = fit_ridge_logistic(x.view(), y.view(), 0.0, &RidgeOptions::default()).unwrap();
        assert_eq!(fit.status, FitStatus::Converged);
        assert_abs_diff_eq!(fit.coefficients[0], 1.0, epsilon = 0.12);
        assert_abs_diff_eq!(fit.coefficients[1], -0.5, epsilon = 0.12);
        assert_abs_diff_eq!(fit.intercept, 0.0, epsilon = 0.12);
    }

    #[test]
    fn stationarity_holds_at_the_penalized_optimum() {
        let (x, y) = simulated(200, &[0.8, 0.3, -0.4], 5);
        let lambda = 0.05;
        let options = RidgeOptions {
            max_iterations: 200,
            tolerance: 1e-14,
        };
        let fit = fit_ridge_logistic(x.view(), y.view(), lambda, &options).unwrap();
        let mu = fit.predict_probability(x.view());
        let residual = &y - &mu;
        let n = x.nrows() as f64;
        // Intercept score is zero; slope scores balance the ridge term.
        assert_abs_diff_eq!(residual.sum() / n, 0.0, epsilon = 1e-6);
        let gradient = x.t().dot(&residual) / n - &fit.coefficients * lambda;
        for g in gradient.iter() {
            assert_abs_diff_eq!(*g, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn larger_penalty_shrinks_coefficients() {
        let (x, y) = simulated(300, &[1.5, -1.0], 8);
        let options = RidgeOptions::default();
        let norms: Vec<f64> = [0.001, 0.1, 1.0, 10.0]
            .iter()
            .map(|&lambda| {
                let fit = fit_ridge_logistic(x.view(), y.view(), lambda, &options).unwrap();
                fit.coefficients.dot(&fit.coefficients).sqrt()
            })
            .collect();
        assert!(norms.windows(2).all(|w| w[1] < w[0]), "{norms:?}");
    }

    #[test]
    fn separable_data_with_penalty_stays_finite() {
        let x = array![[-2.0], [-1.0], [-0.5], [0.5], [1.0], [2.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let fit = fit_ridge_logistic(x.view(), y.view(), 0.01, &RidgeOptions::default()).unwrap();
        assert!(fit.coefficients[0].is_finite() && fit.coefficients[0] > 0.0);
        let probs = fit.predict_probability(x.view());
        assert!(probs[5] > probs[0]);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let x = array![[1.0], [2.0]];
        let options = RidgeOptions::default();
        assert!(matches!(
            fit_ridge_logistic(x.view(), array![0.0].view(), 0.1, &options),
            Err(FitError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            fit_ridge_logistic(x.view(), array![0.0, 2.0].view(), 0.1, &options),
            Err(FitError::InvalidResponse(v)) if v == 2.0
        ));
        assert!(matches!(
            fit_ridge_logistic(x.view(), array![0.0, 1.0].view(), -1.0, &options),
            Err(FitError::InvalidLambda(_))
        ));
    }

    #[test]
    fn deviance_of_perfect_guess_is_near_zero() {
        let y = array![0.0, 1.0, 1.0];
        let mu = array![1e-12, 1.0, 1.0];
        assert!(binomial_deviance(y.view(), &mu) < 1e-8);
        let half = array![0.5, 0.5, 0.5];
        assert_abs_diff_eq!(binomial_deviance(y.view(), &half), 6.0 * 2f64.ln(), epsilon = 1e-12);
    }
}
