//! Where class probabilities come from once an embedding is available.

use super::head::{ClassifierModel, ExtractorIdentity, artifact_exists, load_artifact};
use crate::core::AcneError;
use crate::domain::{EmbeddingVector, LabelSet};
use std::path::Path;
use tracing::{info, warn};

/// Tolerance for treating extractor output as an existing probability distribution.
const DISTRIBUTION_TOLERANCE: f32 = 1e-3;

/// The classifier stage of the inference pipeline.
#[derive(Debug)]
pub enum ClassifierSource {
    /// A head trained on extractor embeddings and loaded from an artifact.
    TrainedHead {
        model: ClassifierModel,
        labels: LabelSet,
        extractor: ExtractorIdentity,
    },
    /// The extractor already outputs one score per class.
    RawExtractorPassthrough { labels: LabelSet },
}

impl ClassifierSource {
    pub fn labels(&self) -> &LabelSet {
        match self {
            Self::TrainedHead { labels, .. } | Self::RawExtractorPassthrough { labels } => labels,
        }
    }

    /// Embedding width this source accepts.
    pub fn input_dim(&self) -> usize {
        match self {
            Self::TrainedHead { model, .. } => model.input_dim(),
            Self::RawExtractorPassthrough { labels } => labels.len(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TrainedHead { .. } => "trained head",
            Self::RawExtractorPassthrough { .. } => "extractor passthrough",
        }
    }

    /// Maps an embedding to a probability distribution over [`Self::labels`].
    pub fn probabilities(&self, embedding: &EmbeddingVector) -> Result<Vec<f32>, AcneError> {
        if embedding.dim() != self.input_dim() {
            return Err(AcneError::tensor_shape_error(
                "classifier input",
                &[self.input_dim()],
                &[embedding.dim()],
            ));
        }
        match self {
            Self::TrainedHead { model, .. } => model.predict_proba(embedding.as_slice()),
            Self::RawExtractorPassthrough { .. } => Ok(as_distribution(embedding.as_slice())),
        }
    }
}

/// Uses `scores` as-is when they are already a distribution, otherwise applies softmax.
fn as_distribution(scores: &[f32]) -> Vec<f32> {
    let sum: f32 = scores.iter().sum();
    if scores.iter().all(|&s| s >= 0.0) && (sum - 1.0).abs() <= DISTRIBUTION_TOLERANCE {
        return scores.to_vec();
    }
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Loads a trained head from an artifact directory.
pub fn load_model(path: impl AsRef<Path>) -> Result<ClassifierSource, AcneError> {
    let path = path.as_ref();
    let artifact = load_artifact(path)?;
    info!(
        "loaded classifier from {} ({} classes)",
        path.display(),
        artifact.labels.len()
    );
    Ok(ClassifierSource::TrainedHead {
        model: artifact.model,
        labels: artifact.labels,
        extractor: artifact.extractor,
    })
}

/// Picks the classifier source at load time.
///
/// An existing artifact at `path` is always loaded, and a corrupt one is an error.
/// Without an artifact, `allow_passthrough` selects [`ClassifierSource::RawExtractorPassthrough`]
/// over `labels`; otherwise the absence is a `ModelLoad` error.
pub fn select_classifier(
    path: Option<&Path>,
    allow_passthrough: bool,
    labels: &LabelSet,
) -> Result<ClassifierSource, AcneError> {
    match path {
        Some(path) if artifact_exists(path) => load_model(path),
        Some(path) if allow_passthrough => {
            warn!(
                "no classifier artifact at {}; using extractor output directly",
                path.display()
            );
            Ok(ClassifierSource::RawExtractorPassthrough {
                labels: labels.clone(),
            })
        }
        None if allow_passthrough => {
            warn!("no classifier artifact configured; using extractor output directly");
            Ok(ClassifierSource::RawExtractorPassthrough {
                labels: labels.clone(),
            })
        }
        Some(path) => Err(AcneError::model_load_message(
            path,
            "classifier artifact not found",
            Some("train a model or enable extractor passthrough"),
        )),
        None => Err(AcneError::model_load_message(
            "<unset>",
            "no classifier artifact configured",
            Some("set classifier_path or enable extractor passthrough"),
        )),
    }
}
