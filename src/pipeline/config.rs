//! Inference service configuration.

use crate::core::config::{ConfigError, ConfigValidator, load_json_config};
use crate::core::AcneError;
use crate::domain::LabelSet;
use crate::models::ExtractorSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What the [`InferenceService`](super::InferenceService) loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub extractor: ExtractorSpec,
    /// Artifact directory written by training.
    pub classifier_path: Option<PathBuf>,
    /// Use the extractor output directly when no artifact exists.
    pub allow_passthrough: bool,
    /// Labels for passthrough mode. A loaded artifact brings its own.
    pub labels: LabelSet,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorSpec::default(),
            classifier_path: None,
            allow_passthrough: false,
            labels: LabelSet::acne(),
        }
    }
}

impl ServiceConfig {
    pub fn new(extractor: ExtractorSpec) -> Self {
        Self {
            extractor,
            ..Self::default()
        }
    }

    pub fn with_classifier_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.classifier_path = Some(path.into());
        self
    }

    pub fn with_passthrough(mut self, allow: bool) -> Self {
        self.allow_passthrough = allow;
        self
    }

    pub fn with_labels(mut self, labels: LabelSet) -> Self {
        self.labels = labels;
        self
    }

    /// Loads and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AcneError> {
        load_json_config(path)
    }
}

impl ConfigValidator for ServiceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.extractor.validate()?;
        if self.classifier_path.is_none() && !self.allow_passthrough {
            return Err(ConfigError::InvalidConfig {
                message: "classifier_path is required unless allow_passthrough is set"
                    .to_string(),
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
    fn test_requires_classifier_or_passthrough() {
        assert!(ServiceConfig::default().validate().is_err());
        assert!(ServiceConfig::default().with_passthrough(true).validate().is_ok());
        assert!(
            ServiceConfig::default()
                .with_classifier_path("models/acne")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.json");
        std::fs::write(
            &path,
            r#"{
                "extractor": { "kind": "pooled_color", "grid": 2 },
                "classifier_path": "models/acne"
            }"#,
        )
        .unwrap();
        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.extractor, ExtractorSpec::PooledColor { grid: 2 });
        assert_eq!(config.labels, LabelSet::acne());
        assert!(!config.allow_passthrough);
    }
}
