//! Analysis settings. Every field has a default; a TOML file may override any
//! subset of them and the command line overrides the file.

use crate::features::DEFAULT_RARENESS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Which model to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelChoice {
    /// Logistic regression for discrete labels, lasso for continuous ones.
    #[default]
    Auto,
    Logistic,
    Lasso,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Minimum number of records for a test to be tracked or chosen as the rare test.
    pub rareness: usize,
    pub test_fraction: f64,
    pub seed: u64,
    /// Labels with at most this many distinct whole values are treated as classes.
    pub max_discrete_classes: usize,
    pub model: ModelChoice,
    pub lasso_alpha: f64,
    pub lasso_max_iterations: usize,
    pub lasso_tolerance: f64,
    /// Ridge penalty on the non-intercept logistic coefficients.
    pub logistic_ridge: f64,
    pub max_iterations: usize,
    pub convergence_tolerance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rareness: DEFAULT_RARENESS,
            test_fraction: 0.2,
            seed: 42,
            max_discrete_classes: 10,
            model: ModelChoice::Auto,
            lasso_alpha: 1.0,
            lasso_max_iterations: 1000,
            lasso_tolerance: 1e-4,
            logistic_ridge: 1e-3,
            max_iterations: 50,
            convergence_tolerance: 1e-8,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: AnalysisConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: String| ConfigError::InvalidValue { field, reason };

        if self.rareness == 0 {
            return Err(invalid("rareness", "must be at least 1".to_string()));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(invalid(
                "test_fraction",
                format!("must lie strictly between 0 and 1, got {}", self.test_fraction),
            ));
        }
        if self.max_discrete_classes < 2 {
            return Err(invalid(
                "max_discrete_classes",
                format!("must be at least 2, got {}", self.max_discrete_classes),
            ));
        }
        if !(self.lasso_alpha >= 0.0 && self.lasso_alpha.is_finite()) {
            return Err(invalid(
                "lasso_alpha",
                format!("must be a non-negative number, got {}", self.lasso_alpha),
            ));
        }
        if !(self.logistic_ridge >= 0.0 && self.logistic_ridge.is_finite()) {
            return Err(invalid(
                "logistic_ridge",
                format!("must be a non-negative number, got {}", self.logistic_ridge),
            ));
        }
        if self.max_iterations == 0 || self.lasso_max_iterations == 0 {
            return Err(invalid(
                "max_iterations",
                "iteration limits must be at least 1".to_string(),
            ));
        }
        if !(self.convergence_tolerance > 0.0) || !(self.lasso_tolerance > 0.0) {
            return Err(invalid(
                "convergence_tolerance",
                "tolerances must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_valid() {
        let config = AnalysisConfig::default();
        config.validate().unwrap();
        assert_eq!(config.rareness, 1000);
        assert_eq!(config.model, ModelChoice::Auto);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "rareness = 250\nmodel = \"linear\"\nseed = 9").unwrap();
        let config = AnalysisConfig::load(file.path()).unwrap();

        assert_eq!(config.rareness, 250);
        assert_eq!(config.model, ModelChoice::Linear);
        assert_eq!(config.seed, 9);
        assert_eq!(config.test_fraction, AnalysisConfig::default().test_fraction);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "rarenes = 250").unwrap();
        match AnalysisConfig::load(file.path()) {
            Err(ConfigError::TomlParseError(_)) => {}
            other => panic!("Expected TomlParseError, got {:?}", other),
        }
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let config = AnalysisConfig {
            test_fraction: 0.0,
            ..AnalysisConfig::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "test_fraction"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }

        let config = AnalysisConfig {
            max_discrete_classes: 1,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
