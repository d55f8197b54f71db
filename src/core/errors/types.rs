//! Error type definitions.

use std::path::PathBuf;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Enum representing the different stages of processing in the pipeline.
///
/// Used by [`AcneError::Processing`] to tell where a numeric or image operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Error occurred during tensor operations.
    TensorOperation,
    /// Error occurred while computing an embedding.
    Embedding,
    /// Error occurred while turning class scores into a prediction.
    PostProcessing,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::TensorOperation => write!(f, "tensor operation"),
            ProcessingStage::Embedding => write!(f, "embedding"),
            ProcessingStage::PostProcessing => write!(f, "post-processing"),
        }
    }
}

/// Enum representing the errors that can occur while preprocessing, training or
/// running inference.
#[derive(Error, Debug)]
pub enum AcneError {
    /// The input could not be interpreted as an image.
    #[error("failed to decode image '{context}'")]
    Decode {
        /// What was being decoded (path, buffer description).
        context: String,
        /// The underlying decoder error.
        #[source]
        source: BoxedSource,
    },

    /// A feature extractor or classifier failed to load or parse.
    #[error("failed to load model '{}': {reason}{}", path.display(), suggestion.as_ref().map(|s| format!(" ({s})")).unwrap_or_default())]
    ModelLoad {
        /// Location of the model that failed to load.
        path: PathBuf,
        /// Short description of what went wrong.
        reason: String,
        /// Optional hint for the operator.
        suggestion: Option<String>,
        /// The underlying error, when there is one.
        #[source]
        source: Option<BoxedSource>,
    },

    /// No usable training samples were found.
    #[error("no training samples could be built from '{}' ({classes_searched} classes searched)", root.display())]
    EmptyDataset {
        /// The dataset root that was searched.
        root: PathBuf,
        /// Number of class names that were looked up.
        classes_searched: usize,
    },

    /// A training run was aborted.
    #[error("training failed: {context}")]
    Training {
        /// Description of the failure.
        context: String,
        /// The underlying error, when there is one.
        #[source]
        source: Option<BoxedSource>,
    },

    /// Inference was requested before the models finished loading.
    #[error("models are not ready (state: {state})")]
    ModelNotReady {
        /// The readiness state observed by the call.
        state: String,
    },

    /// An inference call failed after the models were loaded.
    #[error("analysis failed: {context}")]
    Analysis {
        /// Description of the failed step.
        context: String,
        /// The underlying error.
        #[source]
        source: BoxedSource,
    },

    /// Error occurred during processing.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: BoxedSource,
    },

    /// Error occurred while running a model.
    #[error("inference with model '{model_name}' failed: {context}")]
    Inference {
        /// Name of the model that failed.
        model_name: String,
        /// Additional context about the error.
        context: String,
        /// The underlying error.
        #[source]
        source: BoxedSource,
    },

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from a candle tensor operation in the classifier head.
    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    /// Error from ndarray shape operations.
    #[error("tensor shape")]
    Tensor(#[from] ndarray::ShapeError),

    /// JSON (de)serialization error.
    #[error("serialization")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

impl From<crate::core::config::ConfigError> for AcneError {
    fn from(error: crate::core::config::ConfigError) -> Self {
        Self::ConfigError {
            message: error.to_string(),
        }
    }
}

/// A plain-message error used as the source of errors that have no deeper cause.
#[derive(Debug, Clone)]
pub struct SimpleError(String);

impl SimpleError {
    /// Creates a new simple error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::fmt::Display for SimpleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SimpleError {}
