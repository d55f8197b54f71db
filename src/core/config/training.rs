//! Training and dataset configuration.

use super::errors::{ConfigError, ConfigValidator};
use crate::core::constants::{DEFAULT_IMAGE_EXTENSIONS, MAX_BATCH_SIZE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Early stopping on validation loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingConfig {
    /// Number of epochs without improvement before stopping.
    pub patience: usize,
    /// Minimum decrease of validation loss that counts as an improvement.
    #[serde(default)]
    pub min_delta: f32,
}

/// Hyperparameters of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of passes over the training subset.
    pub epochs: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    /// Adam learning rate.
    pub learning_rate: f64,
    /// Share of the dataset held out for validation, in `[0, 1)`.
    pub validation_fraction: f32,
    /// Seed for the split and the per-epoch shuffles.
    pub seed: u64,
    /// Stop early when validation loss stops improving. Disabled when `None`.
    pub early_stopping: Option<EarlyStoppingConfig>,
    /// Where the trained artifact is written. Nothing is persisted when `None`.
    pub output_dir: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            learning_rate: 1e-3,
            validation_fraction: 0.2,
            seed: 42,
            early_stopping: None,
            output_dir: None,
        }
    }
}

impl TrainingConfig {
    /// Creates a configuration with default hyperparameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of epochs.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets the mini-batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the validation fraction.
    pub fn with_validation_fraction(mut self, fraction: f32) -> Self {
        self.validation_fraction = fraction;
        self
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enables early stopping.
    pub fn with_early_stopping(mut self, patience: usize, min_delta: f32) -> Self {
        self.early_stopping = Some(EarlyStoppingConfig {
            patience,
            min_delta,
        });
        self
    }

    /// Sets the artifact output directory.
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }
}

impl ConfigValidator for TrainingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_positive_usize(self.epochs, "epochs")?;
        self.validate_batch_size(self.batch_size)?;
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::ResourceLimitExceeded {
                message: format!(
                    "Batch size {} exceeds maximum allowed batch size {}",
                    self.batch_size, MAX_BATCH_SIZE
                ),
            });
        }
        self.validate_positive_f32(self.learning_rate as f32, "learning_rate")?;
        self.validate_f32_range(self.validation_fraction, 0.0, 1.0, "validation_fraction")?;
        if let Some(early) = &self.early_stopping {
            self.validate_positive_usize(early.patience, "early_stopping.patience")?;
            if !early.min_delta.is_finite() || early.min_delta < 0.0 {
                return Err(ConfigError::InvalidConfig {
                    message: format!(
                        "early_stopping.min_delta must be a non-negative number, got {}",
                        early.min_delta
                    ),
                });
            }
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Settings for walking and embedding a labeled image tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Worker threads for per-file preprocessing and embedding. Defaults to the
    /// available parallelism.
    pub workers: Option<usize>,
    /// Accepted file extensions, compared case-insensitively.
    pub extensions: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            workers: None,
            extensions: DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl DatasetConfig {
    /// Sets the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Returns the effective worker count.
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Returns true when `extension` is one of the accepted extensions.
    pub fn accepts_extension(&self, extension: &str) -> bool {
        self.extensions
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(extension))
    }
}

impl ConfigValidator for DatasetConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(workers) = self.workers {
            self.validate_thread_count(workers)?;
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::InvalidConfig {
                message: "at least one image extension is required".to_string(),
            });
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_training_config_is_valid() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.epochs, 10);
        assert_eq!(config.batch_size, 32);
        assert!(config.output_dir.is_none());
    }

    #[test]
    fn test_training_config_rejects_bad_values() {
        assert!(TrainingConfig::new().with_epochs(0).validate().is_err());
        assert!(TrainingConfig::new().with_batch_size(0).validate().is_err());
        assert!(
            TrainingConfig::new()
                .with_validation_fraction(1.0)
                .validate()
                .is_err()
        );
        assert!(
            TrainingConfig::new()
                .with_learning_rate(-1.0)
                .validate()
                .is_err()
        );
        assert!(
            TrainingConfig::new()
                .with_early_stopping(0, 0.0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_training_config_partial_json_uses_defaults() {
        let config: TrainingConfig =
            serde_json::from_str(r#"{ "epochs": 3, "early_stopping": { "patience": 2 } }"#)
                .unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.early_stopping.unwrap().min_delta, 0.0);
    }

    #[test]
    fn test_dataset_config_extension_matching() {
        let config = DatasetConfig::default();
        assert!(config.accepts_extension("JPG"));
        assert!(config.accepts_extension("jpeg"));
        assert!(config.accepts_extension("Png"));
        assert!(!config.accepts_extension("gif"));
        assert!(config.validate().is_ok());
        assert!(DatasetConfig::default().with_workers(0).validate().is_err());
    }
}
