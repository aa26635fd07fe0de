//! # Run Configuration
//!
//! Every tunable of a harness run, loadable from TOML. Missing fields take their
//! defaults, and `validate` rejects anything that would make the run meaningless
//! before a single cohort is generated.

use crate::catalog::PathwayCatalog;
use crate::crossval::{CvSettings, DEFAULT_K_FOLDS, DEFAULT_REPEATS};
use crate::logistic::RidgeOptions;
use crate::orchestrator::resolve_worker_count;
use crate::overlap::DEFAULT_OVERLAP_THRESHOLD;
use crate::partition::DEFAULT_SPLIT_FRACTION;
use crate::trainer::TrainerSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Truth pathway '{0}' is not in the pathway catalog.")]
    UnknownTruthPathway(String),
}

fn default_sample_sizes() -> Vec<usize> {
    vec![20, 50, 100]
}

fn default_k_folds() -> usize {
    DEFAULT_K_FOLDS
}

fn default_repeats() -> usize {
    DEFAULT_REPEATS
}

fn default_lambda_grid() -> Vec<f64> {
    vec![0.0001, 0.001, 0.01, 0.1, 1.0]
}

fn default_split_fraction() -> f64 {
    DEFAULT_SPLIT_FRACTION
}

fn default_overlap_threshold() -> f64 {
    DEFAULT_OVERLAP_THRESHOLD
}

fn default_seed() -> u64 {
    42
}

fn default_max_iterations() -> usize {
    RidgeOptions::default().max_iterations
}

fn default_convergence_tolerance() -> f64 {
    RidgeOptions::default().tolerance
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    #[serde(default = "default_sample_sizes")]
    pub sample_sizes: Vec<usize>,
    pub truth_pathway_id: String,
    #[serde(default = "default_k_folds")]
    pub k_folds: usize,
    #[serde(default = "default_repeats")]
    pub repeats: usize,
    /// Ridge penalties to tune over, strictly ascending.
    #[serde(default = "default_lambda_grid")]
    pub lambda_grid: Vec<f64>,
    #[serde(default = "default_split_fraction")]
    pub split_fraction: f64,
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f64,
    /// Worker threads; 0 uses every available core.
    #[serde(default)]
    pub worker_count: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_convergence_tolerance")]
    pub convergence_tolerance: f64,
}

impl HarnessConfig {
    /// A configuration with every default and the given truth pathway.
    pub fn new(truth_pathway_id: impl Into<String>) -> Self {
        Self {
            sample_sizes: default_sample_sizes(),
            truth_pathway_id: truth_pathway_id.into(),
            k_folds: default_k_folds(),
            repeats: default_repeats(),
            lambda_grid: default_lambda_grid(),
            split_fraction: default_split_fraction(),
            overlap_threshold: default_overlap_threshold(),
            worker_count: 0,
            seed: default_seed(),
            max_iterations: default_max_iterations(),
            convergence_tolerance: default_convergence_tolerance(),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Checks every field for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidConfiguration(msg));

        if self.truth_pathway_id.trim().is_empty() {
            return invalid("truth_pathway_id must not be empty".to_string());
        }
        if self.sample_sizes.is_empty() {
            return invalid("sample_sizes must list at least one scenario".to_string());
        }
        if self.sample_sizes.contains(&0) {
            return invalid("every sample size must be positive".to_string());
        }
        let mut sorted = self.sample_sizes.clone();
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return invalid("sample_sizes must not contain duplicates".to_string());
        }
        if self.k_folds < 2 {
            return invalid(format!("k_folds must be at least 2, got {}", self.k_folds));
        }
        if self.repeats == 0 {
            return invalid("repeats must be at least 1".to_string());
        }
        if self.lambda_grid.is_empty() {
            return invalid("lambda_grid must not be empty".to_string());
        }
        if let Some(&bad) = self
            .lambda_grid
            .iter()
            .find(|&&l| !l.is_finite() || l < 0.0)
        {
            return invalid(format!("lambda_grid values must be finite and non-negative, got {bad}"));
        }
        if self.lambda_grid.windows(2).any(|w| w[0] >= w[1]) {
            return invalid("lambda_grid must be strictly ascending".to_string());
        }
        if !(self.split_fraction > 0.0 && self.split_fraction < 1.0) {
            return invalid(format!(
                "split_fraction must lie strictly between 0 and 1, got {}",
                self.split_fraction
            ));
        }
        if !(0.0..=1.0).contains(&self.overlap_threshold) {
            return invalid(format!(
                "overlap_threshold must lie in [0, 1], got {}",
                self.overlap_threshold
            ));
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1".to_string());
        }
        if !(self.convergence_tolerance.is_finite() && self.convergence_tolerance > 0.0) {
            return invalid(format!(
                "convergence_tolerance must be positive, got {}",
                self.convergence_tolerance
            ));
        }
        Ok(())
    }

    /// Fails unless the truth pathway is part of `catalog`.
    pub fn check_against(&self, catalog: &PathwayCatalog) -> Result<(), ConfigError> {
        if catalog.get(&self.truth_pathway_id).is_none() {
            return Err(ConfigError::UnknownTruthPathway(self.truth_pathway_id.clone()));
        }
        Ok(())
    }

    pub fn trainer_settings(&self) -> TrainerSettings {
        TrainerSettings {
            cv: CvSettings {
                k_folds: self.k_folds,
                repeats: self.repeats,
            },
            lambda_grid: self.lambda_grid.clone(),
            ridge: RidgeOptions {
                max_iterations: self.max_iterations,
                tolerance: self.convergence_tolerance,
            },
        }
    }

    pub fn resolved_worker_count(&self) -> usize {
        resolve_worker_count(self.worker_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn minimal_toml_takes_defaults() {
        let config = HarnessConfig::from_toml_str("truth_pathway_id = \"WNT\"\n").unwrap();
        assert_eq!(config, HarnessConfig::new("WNT"));
        assert_eq!(config.k_folds, 5);
        assert_eq!(config.repeats, 5);
        assert_eq!(config.split_fraction, 0.8);
        assert_eq!(config.overlap_threshold, 0.75);
        assert_eq!(config.seed, 42);
        config.validate().unwrap();
    }

    #[test]
    fn file_round_trip_preserves_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        let mut config = HarnessConfig::new("NOTCH");
        config.sample_sizes = vec![10, 30];
        config.lambda_grid = vec![0.5, 2.0];
        config.worker_count = 3;
        config.save(&path).unwrap();
        let loaded = HarnessConfig::from_toml_file(&path).unwrap();
        assert_eq!(loaded, config);
        let settings = loaded.trainer_settings();
        assert_eq!(settings.lambda_grid, vec![0.5, 2.0]);
        assert_eq!(loaded.resolved_worker_count(), 3);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = HarnessConfig::from_toml_str("truth_pathway_id = \"X\"\nfolds = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation_catches_malformed_settings() {
        let cases: [fn(&mut HarnessConfig); 14] = [
            |c| c.sample_sizes.clear(),
            |c| c.sample_sizes = vec![20, 0],
            |c| c.sample_sizes = vec![20, 20],
            |c| c.k_folds = 1,
            |c| c.repeats = 0,
            |c| c.lambda_grid.clear(),
            |c| c.lambda_grid = vec![0.1, 0.01],
            |c| c.lambda_grid = vec![-0.1, 0.1],
            |c| c.lambda_grid = vec![0.1, f64::INFINITY],
            |c| c.split_fraction = 1.0,
            |c| c.overlap_threshold = f64::NAN,
            |c| c.max_iterations = 0,
            |c| c.convergence_tolerance = 0.0,
            |c| c.truth_pathway_id = " ".to_string(),
        ];
        for (i, mutate) in cases.iter().enumerate() {
            let mut config = HarnessConfig::new("WNT");
            mutate(&mut config);
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidConfiguration(_))),
                "case {i} was accepted"
            );
        }
    }

    #[test]
    fn truth_pathway_must_exist_in_catalog() {
        let catalog = PathwayCatalog::from_entries(vec![("A", vec!["G1"])]).unwrap();
        assert!(HarnessConfig::new("A").check_against(&catalog).is_ok());
        assert!(matches!(
            HarnessConfig::new("B").check_against(&catalog),
            Err(ConfigError::UnknownTruthPathway(_))
        ));
    }
}
