//! Frozen backbone served through ONNX Runtime.

use super::FeatureExtractor;
use crate::core::config::{ConfigError, ConfigValidator, OrtSessionConfig};
use crate::core::constants::{INPUT_CHANNELS, INPUT_SIZE};
use crate::core::errors::SimpleError;
use crate::core::{AcneError, OrtInfer, Tensor4D};
use crate::domain::EmbeddingVector;
use crate::processors::{ChannelOrder, PreprocessedTensor};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Configuration of an ONNX backbone exported without its classification layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnnxExtractorConfig {
    /// Path to the `.onnx` file.
    pub model_path: PathBuf,
    /// Input tensor name; the first model input when unset.
    #[serde(default)]
    pub input_name: Option<String>,
    /// Output tensor name (the pre-logit activation); the first model output when unset.
    #[serde(default)]
    pub output_name: Option<String>,
    /// Layout the backbone expects.
    #[serde(default)]
    pub channel_order: ChannelOrder,
    #[serde(default)]
    pub session: OrtSessionConfig,
    /// Number of pooled sessions.
    #[serde(default = "default_pool_size")]
    pub session_pool_size: usize,
}

fn default_pool_size() -> usize {
    1
}

impl OnnxExtractorConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            input_name: None,
            output_name: None,
            channel_order: ChannelOrder::default(),
            session: OrtSessionConfig::default(),
            session_pool_size: default_pool_size(),
        }
    }

    pub fn with_input_name(mut self, name: impl Into<String>) -> Self {
        self.input_name = Some(name.into());
        self
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
        self.channel_order = order;
        self
    }

    pub fn with_session(mut self, session: OrtSessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_session_pool_size(mut self, size: usize) -> Self {
        self.session_pool_size = size;
        self
    }
}

impl ConfigValidator for OnnxExtractorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_model_path(&self.model_path)?;
        self.validate_positive_usize(self.session_pool_size, "session_pool_size")?;
        if let Some(threads) = self.session.intra_threads {
            self.validate_thread_count(threads)?;
        }
        if let Some(threads) = self.session.inter_threads {
            self.validate_thread_count(threads)?;
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::new("models/backbone.onnx")
    }
}

/// Feature extractor backed by an ONNX session pool.
#[derive(Debug)]
pub struct OnnxFeatureExtractor {
    inference: OrtInfer,
    channel_order: ChannelOrder,
    embedding_dim: usize,
}

impl OnnxFeatureExtractor {
    /// Opens the backbone and discovers its embedding width with an all-zero probe.
    ///
    /// # Errors
    ///
    /// `ModelLoad` when the file cannot be opened or the probe fails or yields no
    /// features.
    pub fn load(config: &OnnxExtractorConfig) -> Result<Self, AcneError> {
        config.validate().map_err(|e| {
            AcneError::model_load_error(
                &config.model_path,
                "invalid extractor configuration",
                None,
                Some(e),
            )
        })?;
        let inference = OrtInfer::from_config(
            &config.model_path,
            &config.session,
            config.session_pool_size,
            config.input_name.as_deref(),
            config.output_name.as_deref(),
        )?;

        let probe = Self::zero_batch(config.channel_order);
        let output = inference.infer_2d(&probe).map_err(|e| {
            AcneError::model_load_error(
                &config.model_path,
                "probe inference failed",
                Some("check input/output names and the expected channel order"),
                Some(e),
            )
        })?;
        let embedding_dim = output.ncols();
        if embedding_dim == 0 {
            return Err(AcneError::model_load_message(
                &config.model_path,
                "backbone produced an empty embedding",
                None,
            ));
        }

        info!(
            "loaded backbone '{}' ({} sessions, embedding width {})",
            inference.model_name(),
            inference.pool_size(),
            embedding_dim
        );
        Ok(Self {
            inference,
            channel_order: config.channel_order,
            embedding_dim,
        })
    }

    fn zero_batch(order: ChannelOrder) -> Tensor4D {
        let size = INPUT_SIZE as usize;
        match order {
            ChannelOrder::CHW => Tensor4D::zeros((1, INPUT_CHANNELS, size, size)),
            ChannelOrder::HWC => Tensor4D::zeros((1, size, size, INPUT_CHANNELS)),
        }
    }
}

impl FeatureExtractor for OnnxFeatureExtractor {
    fn name(&self) -> &str {
        self.inference.model_name()
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn embed(&self, tensor: &PreprocessedTensor) -> Result<EmbeddingVector, AcneError> {
        let batch = tensor.to_batch(self.channel_order);
        let output = self.inference.infer_2d(&batch)?;
        if output.ncols() != self.embedding_dim {
            return Err(AcneError::embedding(
                format!(
                    "backbone '{}' returned {} features, expected {}",
                    self.name(),
                    output.ncols(),
                    self.embedding_dim
                ),
                SimpleError::new("embedding width changed"),
            ));
        }
        EmbeddingVector::new(output.row(0).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_json() {
        let config: OnnxExtractorConfig =
            serde_json::from_str(r#"{ "model_path": "backbone.onnx" }"#).unwrap();
        assert_eq!(config.session_pool_size, 1);
        assert_eq!(config.channel_order, ChannelOrder::HWC);
        assert!(config.input_name.is_none());
    }

    #[test]
    fn test_zero_batch_layouts() {
        assert_eq!(
            OnnxFeatureExtractor::zero_batch(ChannelOrder::CHW).shape(),
            &[1, 3, 224, 224]
        );
        assert_eq!(
            OnnxFeatureExtractor::zero_batch(ChannelOrder::HWC).shape(),
            &[1, 224, 224, 3]
        );
    }

    #[test]
    fn test_missing_model_is_model_load_error() {
        let config = OnnxExtractorConfig::new("does/not/exist.onnx");
        let err = OnnxFeatureExtractor::load(&config).unwrap_err();
        assert!(matches!(err, AcneError::ModelLoad { .. }));
    }
}
