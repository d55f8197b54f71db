//! Domain types: labels, embeddings, datasets and predictions.

pub mod dataset;
pub mod embedding;
pub mod labels;
pub mod prediction;

pub use dataset::{Dataset, LabeledSample};
pub use embedding::EmbeddingVector;
pub use labels::LabelSet;
pub use prediction::{ClassPrediction, PredictionResult};
