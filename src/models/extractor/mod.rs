//! Frozen feature extractors mapping preprocessed images to embeddings.

pub mod onnx;
pub mod pooled;

pub use onnx::{OnnxExtractorConfig, OnnxFeatureExtractor};
pub use pooled::PooledColorExtractor;

use crate::core::config::{ConfigError, ConfigValidator};
use crate::core::AcneError;
use crate::domain::EmbeddingVector;
use crate::models::head::ExtractorIdentity;
use crate::processors::PreprocessedTensor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A pretrained network run up to (and excluding) its classification layer.
///
/// Implementations are deterministic and never update their weights. They are shared
/// across threads behind an `Arc`.
pub trait FeatureExtractor: Send + Sync + std::fmt::Debug {
    /// Stable identifier recorded in trained artifacts.
    fn name(&self) -> &str;

    /// Width of every embedding this extractor produces.
    fn embedding_dim(&self) -> usize;

    /// Computes the embedding of one preprocessed image.
    fn embed(&self, tensor: &PreprocessedTensor) -> Result<EmbeddingVector, AcneError>;

    /// Name and width, as persisted next to a trained head.
    fn identity(&self) -> ExtractorIdentity {
        ExtractorIdentity {
            name: self.name().to_string(),
            embedding_dim: self.embedding_dim(),
        }
    }
}

/// Selects and configures a feature extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorSpec {
    Onnx(OnnxExtractorConfig),
    PooledColor {
        #[serde(default = "default_grid")]
        grid: usize,
    },
}

fn default_grid() -> usize {
    4
}

impl Default for ExtractorSpec {
    fn default() -> Self {
        Self::PooledColor {
            grid: default_grid(),
        }
    }
}

impl ExtractorSpec {
    /// Loads the configured extractor.
    pub fn load(&self) -> Result<Arc<dyn FeatureExtractor>, AcneError> {
        match self {
            Self::Onnx(config) => Ok(Arc::new(OnnxFeatureExtractor::load(config)?)),
            Self::PooledColor { grid } => Ok(Arc::new(PooledColorExtractor::new(*grid)?)),
        }
    }
}

impl ConfigValidator for ExtractorSpec {
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Onnx(config) => config.validate(),
            Self::PooledColor { grid } => {
                if *grid == 0 || *grid > PooledColorExtractor::MAX_GRID {
                    Err(ConfigError::InvalidConfig {
                        message: format!(
                            "grid must be in 1..={}, got {grid}",
                            PooledColorExtractor::MAX_GRID
                        ),
                    })
                } else {
                    Ok(())
                }
            }
        }
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_json_forms() {
        let pooled: ExtractorSpec = serde_json::from_str(r#"{ "kind": "pooled_color" }"#).unwrap();
        assert_eq!(pooled, ExtractorSpec::PooledColor { grid: 4 });

        let onnx: ExtractorSpec = serde_json::from_str(
            r#"{ "kind": "onnx", "model_path": "mobilenet.onnx", "channel_order": "CHW" }"#,
        )
        .unwrap();
        match onnx {
            ExtractorSpec::Onnx(config) => {
                assert_eq!(config.model_path, std::path::PathBuf::from("mobilenet.onnx"));
                assert_eq!(config.channel_order, crate::processors::ChannelOrder::CHW);
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn test_load_pooled_and_identity() {
        let extractor = ExtractorSpec::PooledColor { grid: 3 }.load().unwrap();
        let identity = extractor.identity();
        assert_eq!(identity.embedding_dim, 27);
        assert_eq!(identity.name, "pooled-color-3x3");
    }

    #[test]
    fn test_validate_grid() {
        assert!(ExtractorSpec::PooledColor { grid: 0 }.validate().is_err());
        assert!(ExtractorSpec::default().validate().is_ok());
    }
}
