//! Error constructor utilities.
//!
//! Ergonomic helpers for creating `AcneError` values with context and error chaining.
//! Call sites use these instead of spelling out struct variants:
//!
//! ```rust
//! use acne_classifier::core::AcneError;
//!
//! let error = AcneError::model_load_message(
//!     "models/acne-classifier",
//!     "model.json is missing",
//!     Some("re-run training to produce a complete artifact"),
//! );
//! assert!(error.to_string().contains("model.json is missing"));
//! ```

use super::types::{AcneError, ProcessingStage, SimpleError};
use std::path::Path;

impl AcneError {
    /// Internal helper to build a Processing error with minimal boilerplate.
    #[inline]
    fn processing_with_context(
        kind: ProcessingStage,
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates an error for input that could not be decoded as an image.
    ///
    /// # Arguments
    ///
    /// * `context` - What was being decoded (file path or buffer description).
    /// * `error` - The underlying decoder error.
    pub fn decode(
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Decode {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a decode error from a plain message.
    pub fn decode_message(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::decode(context, SimpleError::new(message))
    }

    /// Creates an error for a model that failed to load.
    ///
    /// # Arguments
    ///
    /// * `path` - Location of the model.
    /// * `reason` - Short description of the failure.
    /// * `suggestion` - Optional remediation hint.
    /// * `error` - Optional underlying error.
    pub fn model_load_error(
        path: impl AsRef<Path>,
        reason: impl Into<String>,
        suggestion: Option<&str>,
        error: Option<impl std::error::Error + Send + Sync + 'static>,
    ) -> Self {
        Self::ModelLoad {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
            suggestion: suggestion.map(str::to_string),
            source: error.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }

    /// Creates a model load error that has no underlying cause.
    pub fn model_load_message(
        path: impl AsRef<Path>,
        reason: impl Into<String>,
        suggestion: Option<&str>,
    ) -> Self {
        Self::model_load_error(path, reason, suggestion, None::<SimpleError>)
    }

    /// Creates an error for a dataset build that produced no samples.
    pub fn empty_dataset(root: impl AsRef<Path>, classes_searched: usize) -> Self {
        Self::EmptyDataset {
            root: root.as_ref().to_path_buf(),
            classes_searched,
        }
    }

    /// Creates a training error with an underlying cause.
    pub fn training(
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Training {
            context: context.into(),
            source: Some(Box::new(error)),
        }
    }

    /// Creates a training error from a plain message.
    pub fn training_error(context: impl Into<String>) -> Self {
        Self::Training {
            context: context.into(),
            source: None,
        }
    }

    /// Creates the error returned when inference is attempted before loading finished.
    pub fn model_not_ready(state: impl std::fmt::Display) -> Self {
        Self::ModelNotReady {
            state: state.to_string(),
        }
    }

    /// Wraps a downstream failure that happened inside an `analyze` call.
    pub fn analysis(
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Analysis {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates an error for tensor operations.
    ///
    /// # Arguments
    ///
    /// * `context` - Additional context about the error.
    /// * `error` - The underlying error that caused this error.
    pub fn tensor_operation(
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::processing_with_context(ProcessingStage::TensorOperation, context, error)
    }

    /// Creates an error for embedding computation.
    pub fn embedding(
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::processing_with_context(ProcessingStage::Embedding, context, error)
    }

    /// Creates an error for post-processing operations.
    pub fn post_processing(
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::processing_with_context(ProcessingStage::PostProcessing, context, error)
    }

    /// Creates an error for a failed model forward pass.
    ///
    /// # Arguments
    ///
    /// * `model_name` - The name of the model.
    /// * `context` - Additional context about the error.
    /// * `error` - The underlying error that caused this error.
    pub fn inference_error(
        model_name: &str,
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            model_name: model_name.to_string(),
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates an error for tensor shape mismatches with expected and actual shapes.
    pub fn tensor_shape_error(context: &str, expected: &[usize], actual: &[usize]) -> Self {
        Self::tensor_operation(
            format!("{context}: expected shape {expected:?}, got {actual:?}"),
            SimpleError::new("tensor shape mismatch"),
        )
    }

    /// Creates an error for invalid input.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates an error for configuration problems.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Creates an error for configuration problems with field context.
    ///
    /// # Arguments
    ///
    /// * `field` - The field where the error occurred.
    /// * `value` - The value of the field.
    /// * `reason` - The reason for the error.
    pub fn config_error_with_context(field: &str, value: &str, reason: &str) -> Self {
        Self::ConfigError {
            message: format!(
                "Configuration error in field '{field}' with value '{value}': {reason}"
            ),
        }
    }

    /// Returns true for failures a caller may reasonably retry (model loading).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ModelLoad { .. } | Self::ModelNotReady { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_decode_error_keeps_source() {
        let error = AcneError::decode(
            "photo.png",
            std::io::Error::new(std::io::ErrorKind::InvalidData, "bad header"),
        );
        assert!(error.to_string().contains("photo.png"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_model_load_message_includes_suggestion() {
        let error = AcneError::model_load_message("model", "weights missing", Some("retrain"));
        let message = error.to_string();
        assert!(message.contains("weights missing"));
        assert!(message.contains("(retrain)"));
        assert!(error.source().is_none());
        assert!(error.is_retryable());
    }

    #[test]
    fn test_training_error_is_not_retryable() {
        let error = AcneError::training_error("loss diverged");
        assert!(!error.is_retryable());
        assert_eq!(error.to_string(), "training failed: loss diverged");
    }

    #[test]
    fn test_config_error_conversion() {
        let error: AcneError = crate::core::config::ConfigError::InvalidBatchSize.into();
        assert!(matches!(error, AcneError::ConfigError { .. }));
    }
}
