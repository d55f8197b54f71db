//! # acne-classifier
//!
//! Classifies facial skin-lesion images into acne categories with transfer learning: a
//! frozen image backbone turns each image into an embedding, and a small trainable head
//! maps embeddings to class probabilities.
//!
//! ## Features
//!
//! - One preprocessing path (RGB, bilinear 224×224, `/255`) for training and inference
//! - ONNX Runtime backbones with a session pool and configurable execution providers
//! - A candle classifier head with batch normalization and dropout, trained with Adam
//! - Versioned model artifacts (`model.json`, `weights.safetensors`, `labels.json`)
//!   written atomically
//! - A readiness-gated inference service that is safe to share across threads
//!
//! ## Modules
//!
//! * [`core`] - Configuration, constants, errors and ONNX Runtime integration
//! * [`domain`] - Labels, embeddings, datasets and predictions
//! * [`processors`] - Image decoding and normalization
//! * [`models`] - Feature extractors, the classifier head and artifacts
//! * [`training`] - Dataset building and the training loop
//! * [`pipeline`] - The inference service
//!
//! ## Quick Start
//!
//! ### Training
//!
//! ```rust,no_run
//! use acne_classifier::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = ExtractorSpec::Onnx(OnnxExtractorConfig::new("models/backbone.onnx")).load()?;
//! let labels = LabelSet::acne();
//!
//! let builder = DatasetBuilder::new(extractor.clone(), DatasetConfig::default())?;
//! let (dataset, _report) = builder.build(Path::new("data/acne"), &labels)?;
//!
//! let head = HeadConfig::default();
//! let model = ClassifierModel::build(dataset.embedding_dim(), labels.len(), &head)?;
//! let config = TrainingConfig::new().with_epochs(20).with_output_dir("models/acne-v1");
//! let trained = Trainer::new(config, labels, extractor.identity())?.train(&dataset, model)?;
//! println!("{:?}", trained.final_metrics());
//! # Ok(())
//! # }
//! ```
//!
//! ### Inference
//!
//! ```rust,no_run
//! use acne_classifier::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::new(ExtractorSpec::Onnx(OnnxExtractorConfig::new(
//!     "models/backbone.onnx",
//! )))
//! .with_classifier_path("models/acne-v1");
//! let service = InferenceService::new(config);
//! service.load()?;
//!
//! let result = service.analyze_path(Path::new("face.jpg"))?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod domain;
pub mod models;
pub mod pipeline;
pub mod processors;
pub mod training;

/// Prelude module for convenient imports.
///
/// ```rust
/// use acne_classifier::prelude::*;
/// ```
///
/// Covers the training and inference entry points plus the crate error type. Lower
/// level pieces (artifact I/O, ONNX sessions, tensor aliases) are imported from their
/// modules.
pub mod prelude {
    pub use crate::core::{AcneError, AcneResult, DatasetConfig, TrainingConfig};
    pub use crate::domain::{LabelSet, PredictionResult};
    pub use crate::models::{
        ClassifierModel, ClassifierSource, ExtractorSpec, FeatureExtractor, HeadConfig,
        OnnxExtractorConfig, load_model,
    };
    pub use crate::pipeline::{InferenceService, Readiness, ServiceConfig};
    pub use crate::processors::ImagePreprocessor;
    pub use crate::training::{DatasetBuilder, Trainer};
}
