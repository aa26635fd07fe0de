//! # Cohort Generation
//!
//! Builds the simulated expression matrices. Background genes are independent
//! standard normal noise. The truth genes of the first half of the rows (Group1)
//! are overwritten with a multivariate normal draw whose mean is shifted to
//! `SIGNAL_MEAN` and whose covariance is a single random `Σ = AᵀA` shared by every
//! scenario of the run.
//!
//! Columns are addressed by gene name through `GeneSchema`; pathway subsetting
//! goes through an explicit, schema-validated projection rather than positions.

use crate::seeding::{SeedSequence, SeedStream};
use crate::types::Class;
use ahash::{AHashMap, AHashSet};
use ndarray::{Array1, Array2, ArrayView1, Axis, s};
use ndarray_linalg::{Eigh, UPLO};
use rand::Rng;
use rand_distr::StandardNormal;
use std::sync::Arc;
use thiserror::Error;

/// Number of classes in every simulated cohort.
pub const GROUP_COUNT: usize = 2;

/// Mean of every truth gene in Group1 rows.
pub const SIGNAL_MEAN: f64 = 0.5;

/// Relative tolerance below which negative eigenvalues are treated as rounding noise.
const PSD_TOLERANCE: f64 = 1e-6;

#[derive(Error, Debug)]
pub enum CohortError {
    #[error("The truth pathway has no genes; a signal cannot be embedded.")]
    EmptyTruthSet,
    #[error("Truth gene '{0}' is not part of the gene universe.")]
    TruthGeneOutsideUniverse(String),
    #[error("Sample size must be positive, got {0}.")]
    InvalidSampleSize(usize),
    #[error("Covariance matrix is {rows}x{cols}, but {expected} truth genes were supplied.")]
    CovarianceDimension {
        rows: usize,
        cols: usize,
        expected: usize,
    },
    #[error("Covariance matrix is not symmetric (max asymmetry {0:.3e}).")]
    CovarianceNotSymmetric(f64),
    #[error("Covariance matrix is not positive semi-definite (smallest eigenvalue {0:.3e}).")]
    CovarianceNotPsd(f64),
    #[error("Eigendecomposition of the covariance matrix failed: {0}")]
    Eigendecomposition(#[from] ndarray_linalg::error::LinalgError),
    #[error(
        "Expression matrix is {rows}x{cols}, but the cohort has {classes} class labels and {genes} genes."
    )]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        classes: usize,
        genes: usize,
    },
    #[error("Column '{gene}' is not at position {position} of this cohort's schema.")]
    SchemaMismatch { gene: String, position: usize },
}

/// Covariance shared by the truth genes of every scenario in a run.
///
/// Holds `Σ` together with a factor `L` such that `L·Lᵀ = Σ`, derived from the
/// symmetric eigendecomposition so that singular matrices are still usable.
#[derive(Debug, Clone)]
pub struct TruthCovariance {
    sigma: Array2<f64>,
    factor: Array2<f64>,
}

impl TruthCovariance {
    /// Draws `A` with entries uniform in `[-1, 1)` and returns `Σ = AᵀA`.
    pub fn random<R: Rng + ?Sized>(dim: usize, rng: &mut R) -> Result<Self, CohortError> {
        if dim == 0 {
            return Err(CohortError::EmptyTruthSet);
        }
        let a = Array2::from_shape_fn((dim, dim), |_| rng.gen_range(-1.0..1.0));
        let sigma = a.t().dot(&a);
        Self::from_matrix(sigma)
    }

    pub fn from_matrix(sigma: Array2<f64>) -> Result<Self, CohortError> {
        let (rows, cols) = sigma.dim();
        if rows != cols || rows == 0 {
            return Err(CohortError::CovarianceDimension {
                rows,
                cols,
                expected: rows.max(cols),
            });
        }
        let asymmetry = (&sigma - &sigma.t())
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let scale = sigma.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
        if asymmetry > 1e-9 * scale {
            return Err(CohortError::CovarianceNotSymmetric(asymmetry));
        }

        let (eigenvalues, eigenvectors) = sigma.eigh(UPLO::Lower)?;
        let largest = eigenvalues.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let smallest = eigenvalues.iter().copied().fold(f64::INFINITY, f64::min);
        if smallest < -PSD_TOLERANCE * largest {
            return Err(CohortError::CovarianceNotPsd(smallest));
        }
        let root = eigenvalues.mapv(|v| v.max(0.0).sqrt());
        let factor = &eigenvectors * &root.view().insert_axis(Axis(0));
        Ok(Self { sigma, factor })
    }

    pub fn dim(&self) -> usize {
        self.sigma.nrows()
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.sigma
    }

    /// Draws `rows` samples from `N(mean·1, Σ)`, one sample per row.
    pub fn sample<R: Rng + ?Sized>(&self, mean: f64, rows: usize, rng: &mut R) -> Array2<f64> {
        let z = Array2::from_shape_fn((rows, self.dim()), |_| rng.sample(StandardNormal));
        let mut draws = z.dot(&self.factor.t());
        draws.mapv_inplace(|v| v + mean);
        draws
    }
}

/// Ordered gene columns of a cohort with name lookup.
#[derive(Debug)]
pub struct GeneSchema {
    genes: Vec<String>,
    index: AHashMap<String, usize>,
}

impl GeneSchema {
    pub fn new(genes: Vec<String>) -> Self {
        let index = genes
            .iter()
            .enumerate()
            .map(|(i, g)| (g.clone(), i))
            .collect();
        Self { genes, index }
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn position(&self, gene: &str) -> Option<usize> {
        self.index.get(gene).copied()
    }

    /// Resolves the genes that exist in this schema, keeping request order and
    /// dropping duplicates. Genes absent from the schema are skipped.
    pub fn resolve<S: AsRef<str>>(&self, genes: &[S]) -> ColumnSelection {
        let mut seen = AHashSet::new();
        let mut names = Vec::new();
        let mut positions = Vec::new();
        for gene in genes {
            let gene = gene.as_ref();
            if let Some(position) = self.position(gene) {
                if seen.insert(position) {
                    names.push(gene.to_string());
                    positions.push(position);
                }
            }
        }
        ColumnSelection { names, positions }
    }
}

/// Named columns resolved against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSelection {
    names: Vec<String>,
    positions: Vec<usize>,
}

impl ColumnSelection {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One simulated scenario: `2 · sample_size` rows of expression plus class labels.
#[derive(Debug, Clone)]
pub struct Cohort {
    sample_size: usize,
    schema: Arc<GeneSchema>,
    expression: Array2<f64>,
    classes: Vec<Class>,
    row_ids: Vec<usize>,
}

impl Cohort {
    pub fn new(
        sample_size: usize,
        schema: Arc<GeneSchema>,
        expression: Array2<f64>,
        classes: Vec<Class>,
    ) -> Result<Self, CohortError> {
        if expression.ncols() != schema.len() || expression.nrows() != classes.len() {
            return Err(CohortError::ShapeMismatch {
                rows: expression.nrows(),
                cols: expression.ncols(),
                classes: classes.len(),
                genes: schema.len(),
            });
        }
        let row_ids = (0..classes.len()).collect();
        Ok(Self {
            sample_size,
            schema,
            expression,
            classes,
            row_ids,
        })
    }

    /// Rows per group in the scenario this cohort belongs to.
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn schema(&self) -> &Arc<GeneSchema> {
        &self.schema
    }

    pub fn expression(&self) -> &Array2<f64> {
        &self.expression
    }

    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    /// Row identifiers relative to the originally generated cohort.
    pub fn row_ids(&self) -> &[usize] {
        &self.row_ids
    }

    pub fn n_rows(&self) -> usize {
        self.classes.len()
    }

    pub fn class_count(&self, class: Class) -> usize {
        self.classes.iter().filter(|&&c| c == class).count()
    }

    /// Binary responses with Group2 coded as 1.
    pub fn responses(&self) -> Array1<f64> {
        self.classes.iter().map(|c| c.response()).collect()
    }

    pub fn column(&self, gene: &str) -> Option<ArrayView1<'_, f64>> {
        self.schema
            .position(gene)
            .map(|j| self.expression.column(j))
    }

    /// Copies the selected columns into a new matrix, checking every selected
    /// name against this cohort's schema first.
    pub fn project(&self, selection: &ColumnSelection) -> Result<Array2<f64>, CohortError> {
        for (name, &position) in selection.names.iter().zip(&selection.positions) {
            if self.schema.genes.get(position) != Some(name) {
                return Err(CohortError::SchemaMismatch {
                    gene: name.clone(),
                    position,
                });
            }
        }
        Ok(self.expression.select(Axis(1), &selection.positions))
    }

    /// A new cohort containing only `rows` (positions in this cohort), in the given order.
    pub fn subset_rows(&self, rows: &[usize]) -> Cohort {
        Cohort {
            sample_size: self.sample_size,
            schema: Arc::clone(&self.schema),
            expression: self.expression.select(Axis(0), rows),
            classes: rows.iter().map(|&r| self.classes[r]).collect(),
            row_ids: rows.iter().map(|&r| self.row_ids[r]).collect(),
        }
    }
}

/// Column order used by every cohort: truth genes first, then the remaining
/// universe genes in universe order.
pub fn cohort_schema<S: AsRef<str>>(
    truth_genes: &[S],
    all_genes: &[S],
) -> Result<GeneSchema, CohortError> {
    if truth_genes.is_empty() {
        return Err(CohortError::EmptyTruthSet);
    }
    let universe: AHashSet<&str> = all_genes.iter().map(AsRef::as_ref).collect();
    let mut truth_set = AHashSet::new();
    let mut columns = Vec::with_capacity(all_genes.len());
    for gene in truth_genes {
        let gene = gene.as_ref();
        if !universe.contains(gene) {
            return Err(CohortError::TruthGeneOutsideUniverse(gene.to_string()));
        }
        if truth_set.insert(gene) {
            columns.push(gene.to_string());
        }
    }
    let mut placed = truth_set.clone();
    for gene in all_genes {
        let gene = gene.as_ref();
        if placed.insert(gene) {
            columns.push(gene.to_string());
        }
    }
    Ok(GeneSchema::new(columns))
}

/// Generates one cohort per sample size.
///
/// Every scenario reuses `covariance`; scenarios differ only in their row count
/// and in the random stream derived for them from `seeds`.
pub fn generate_cohorts<S: AsRef<str>>(
    sample_sizes: &[usize],
    truth_genes: &[S],
    all_genes: &[S],
    covariance: &TruthCovariance,
    seeds: &SeedSequence,
) -> Result<Vec<Cohort>, CohortError> {
    let schema = Arc::new(cohort_schema(truth_genes, all_genes)?);
    let n_truth = truth_genes
        .iter()
        .map(AsRef::as_ref)
        .collect::<AHashSet<&str>>()
        .len();
    if covariance.dim() != n_truth {
        return Err(CohortError::CovarianceDimension {
            rows: covariance.dim(),
            cols: covariance.dim(),
            expected: n_truth,
        });
    }

    let mut cohorts = Vec::with_capacity(sample_sizes.len());
    for &sample_size in sample_sizes {
        if sample_size == 0 {
            return Err(CohortError::InvalidSampleSize(sample_size));
        }
        let mut rng = seeds.rng(SeedStream::Cohort { sample_size });
        let n_rows = sample_size * GROUP_COUNT;
        let mut expression =
            Array2::from_shape_fn((n_rows, schema.len()), |_| rng.sample(StandardNormal));
        let signal = covariance.sample(SIGNAL_MEAN, sample_size, &mut rng);
        expression
            .slice_mut(s![..sample_size, ..n_truth])
            .assign(&signal);

        let classes = Class::ALL
            .iter()
            .flat_map(|&class| std::iter::repeat_n(class, sample_size))
            .collect();

        log::info!(
            "Generated cohort for sample size {}: {} rows x {} genes ({} truth genes)",
            sample_size,
            n_rows,
            schema.len(),
            n_truth
        );
        cohorts.push(Cohort::new(
            sample_size,
            Arc::clone(&schema),
            expression,
            classes,
        )?);
    }
    Ok(cohorts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn genes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn random_covariance_is_symmetric_psd() {
        let mut rng = StdRng::seed_from_u64(11);
        for dim in [1, 2, 5, 12] {
            let cov = TruthCovariance::random(dim, &mut rng).unwrap();
            let sigma = cov.matrix();
            for i in 0..dim {
                for j in 0..dim {
                    assert_abs_diff_eq!(sigma[[i, j]], sigma[[j, i]], epsilon = 1e-12);
                }
            }
            let (eigenvalues, _) = sigma.eigh(UPLO::Lower).unwrap();
            let largest = eigenvalues.iter().fold(0.0_f64, |a, v| a.max(v.abs()));
            assert!(eigenvalues.iter().all(|&v| v >= -1e-9 * largest.max(1.0)));
        }
    }

    #[test]
    fn factor_reconstructs_sigma_even_when_singular() {
        let sigma = ndarray::array![[1.0, 1.0], [1.0, 1.0]];
        let cov = TruthCovariance::from_matrix(sigma.clone()).unwrap();
        let rebuilt = cov.factor.dot(&cov.factor.t());
        for (a, b) in rebuilt.iter().zip(sigma.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn indefinite_matrix_is_rejected() {
        let sigma = ndarray::array![[1.0, 2.0], [2.0, 1.0]];
        assert!(matches!(
            TruthCovariance::from_matrix(sigma),
            Err(CohortError::CovarianceNotPsd(_))
        ));
    }

    #[test]
    fn samples_match_requested_moments() {
        let sigma = ndarray::array![[2.0, 0.8], [0.8, 1.0]];
        let cov = TruthCovariance::from_matrix(sigma).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let draws = cov.sample(0.5, 40_000, &mut rng);
        let mean = draws.mean_axis(Axis(0)).unwrap();
        assert_abs_diff_eq!(mean[0], 0.5, epsilon = 0.03);
        assert_abs_diff_eq!(mean[1], 0.5, epsilon = 0.03);
        let centered = &draws - &mean.insert_axis(Axis(0));
        let empirical = centered.t().dot(&centered) / (draws.nrows() as f64 - 1.0);
        assert_abs_diff_eq!(empirical[[0, 0]], 2.0, epsilon = 0.08);
        assert_abs_diff_eq!(empirical[[0, 1]], 0.8, epsilon = 0.05);
        assert_abs_diff_eq!(empirical[[1, 1]], 1.0, epsilon = 0.05);
    }

    #[test]
    fn cohorts_have_balanced_classes_and_truth_first_columns() {
        let truth = genes(&["G2", "G1"]);
        let all = genes(&["G1", "G2", "G3", "G4"]);
        let mut rng = StdRng::seed_from_u64(5);
        let cov = TruthCovariance::random(truth.len(), &mut rng).unwrap();
        let cohorts = generate_cohorts(&[10, 25], &truth, &all, &cov, &SeedSequence::new(9)).unwrap();

        assert_eq!(cohorts.len(), 2);
        for (cohort, n) in cohorts.iter().zip([10, 25]) {
            assert_eq!(cohort.n_rows(), 2 * n);
            assert_eq!(cohort.class_count(Class::Group1), n);
            assert_eq!(cohort.class_count(Class::Group2), n);
            assert_eq!(cohort.schema().genes(), &["G2", "G1", "G3", "G4"]);
            assert!(cohort.classes()[..n].iter().all(|&c| c == Class::Group1));
        }
        assert!(Arc::ptr_eq(cohorts[0].schema(), cohorts[1].schema()));
    }

    #[test]
    fn group1_truth_genes_carry_the_shift() {
        let truth = genes(&["T1", "T2", "T3"]);
        let all = genes(&["T1", "T2", "T3", "B1", "B2"]);
        let cov = TruthCovariance::from_matrix(Array2::eye(3)).unwrap();
        let cohort = generate_cohorts(&[4000], &truth, &all, &cov, &SeedSequence::new(1))
            .unwrap()
            .remove(0);
        let n = cohort.sample_size();
        let t1 = cohort.column("T1").unwrap();
        let b1 = cohort.column("B1").unwrap();
        let group1_mean = t1.slice(s![..n]).mean().unwrap();
        let group2_mean = t1.slice(s![n..]).mean().unwrap();
        assert_abs_diff_eq!(group1_mean, SIGNAL_MEAN, epsilon = 0.06);
        assert_abs_diff_eq!(group2_mean, 0.0, epsilon = 0.06);
        assert_abs_diff_eq!(b1.slice(s![..n]).mean().unwrap(), 0.0, epsilon = 0.06);
    }

    #[test]
    fn empty_truth_set_is_rejected() {
        let all = genes(&["G1"]);
        let none: Vec<String> = Vec::new();
        let cov = TruthCovariance::from_matrix(Array2::eye(1)).unwrap();
        assert!(matches!(
            generate_cohorts(&[5], &none, &all, &cov, &SeedSequence::new(0)),
            Err(CohortError::EmptyTruthSet)
        ));
    }

    #[test]
    fn projection_is_by_name_and_validated() {
        let schema = Arc::new(GeneSchema::new(genes(&["A", "B", "C"])));
        let expression = ndarray::array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let cohort = Cohort::new(1, schema, expression, vec![Class::Group1, Class::Group2]).unwrap();
        let selection = cohort.schema().resolve(&["C", "missing", "A", "C"]);
        assert_eq!(selection.names(), &["C", "A"]);
        let projected = cohort.project(&selection).unwrap();
        assert_eq!(projected, ndarray::array![[3.0, 1.0], [6.0, 4.0]]);

        let foreign = GeneSchema::new(genes(&["X", "C"])).resolve(&["C"]);
        assert!(matches!(
            cohort.project(&foreign),
            Err(CohortError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn subset_rows_tracks_original_ids() {
        let schema = Arc::new(GeneSchema::new(genes(&["A"])));
        let expression = ndarray::array![[0.0], [1.0], [2.0], [3.0]];
        let classes = vec![Class::Group1, Class::Group1, Class::Group2, Class::Group2];
        let cohort = Cohort::new(2, schema, expression, classes).unwrap();
        let subset = cohort.subset_rows(&[3, 1]);
        let nested = subset.subset_rows(&[1]);
        assert_eq!(subset.row_ids(), &[3, 1]);
        assert_eq!(nested.row_ids(), &[1]);
        assert_eq!(nested.expression()[[0, 0]], 1.0);
        assert_eq!(subset.classes(), &[Class::Group2, Class::Group1]);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let schema = Arc::new(GeneSchema::new(genes(&["A", "B"])));
        let too_narrow = ndarray::array![[0.0], [1.0]];
        assert!(matches!(
            Cohort::new(1, Arc::clone(&schema), too_narrow, vec![Class::Group1, Class::Group2]),
            Err(CohortError::ShapeMismatch { cols: 1, genes: 2, .. })
        ));
        let too_few_labels = ndarray::array![[0.0, 1.0], [1.0, 2.0]];
        assert!(matches!(
            Cohort::new(1, schema, too_few_labels, vec![Class::Group1]),
            Err(CohortError::ShapeMismatch { rows: 2, classes: 1, .. })
        ));
    }
}
