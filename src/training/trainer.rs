//! Mini-batch training of the classifier head.

use super::lock::ArtifactLock;
use crate::core::config::{ConfigValidatorExt, TrainingConfig};
use crate::core::AcneError;
use crate::domain::{Dataset, LabelSet};
use crate::models::head::{ClassifierModel, ExtractorIdentity, save_artifact};
use crate::models::ClassifierSource;
use candle_core::{D, DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Metrics recorded after one epoch, all computed in evaluation mode except
/// `batch_loss`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochMetrics {
    /// 1-based epoch index.
    pub epoch: usize,
    /// Mean mini-batch loss seen by the optimizer during the epoch.
    pub batch_loss: f32,
    pub train_loss: f32,
    pub train_accuracy: f32,
    /// `None` when the validation subset is empty.
    pub val_loss: Option<f32>,
    pub val_accuracy: Option<f32>,
}

/// The outcome of a training run.
#[derive(Debug)]
pub struct TrainedModel {
    pub model: ClassifierModel,
    pub labels: LabelSet,
    pub extractor: ExtractorIdentity,
    pub history: Vec<EpochMetrics>,
    pub stopped_early: bool,
    /// Where the artifact was written, if the run persisted one.
    pub artifact_path: Option<PathBuf>,
}

impl TrainedModel {
    pub fn final_metrics(&self) -> Option<&EpochMetrics> {
        self.history.last()
    }

    /// Persists the model as an artifact at `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), AcneError> {
        save_artifact(dir, &self.model, &self.labels, &self.extractor)
    }

    /// Hands the trained head to inference without a round trip through disk.
    pub fn into_classifier_source(self) -> ClassifierSource {
        ClassifierSource::TrainedHead {
            model: self.model,
            labels: self.labels,
            extractor: self.extractor,
        }
    }
}

/// Trains a [`ClassifierModel`] on a [`Dataset`] of embeddings.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainingConfig,
    labels: LabelSet,
    extractor: ExtractorIdentity,
}

struct Split {
    features: Tensor,
    targets: Tensor,
    len: usize,
}

impl Split {
    fn new(dataset: &Dataset, device: &Device) -> Result<Self, AcneError> {
        let (features, targets) = dataset.to_arrays();
        let len = dataset.len();
        Ok(Self {
            features: Tensor::from_vec(features, (len, dataset.embedding_dim()), device)?,
            targets: Tensor::from_vec(targets, len, device)?,
            len,
        })
    }
}

impl Trainer {
    pub fn new(
        config: TrainingConfig,
        labels: LabelSet,
        extractor: ExtractorIdentity,
    ) -> Result<Self, AcneError> {
        Ok(Self {
            config: config.validated()?,
            labels,
            extractor,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Runs the configured number of epochs and, when `output_dir` is set, persists the
    /// result.
    ///
    /// # Errors
    ///
    /// `Training` on a dimension or class-count mismatch between `dataset`, `model`,
    /// the label set and the extractor, on a non-finite loss, or when another run
    /// holds the output artifact. A previously persisted artifact is left untouched on
    /// every failure.
    pub fn train(
        &self,
        dataset: &Dataset,
        model: ClassifierModel,
    ) -> Result<TrainedModel, AcneError> {
        self.check_compatible(dataset, &model)?;
        let _lock = self
            .config
            .output_dir
            .as_deref()
            .map(ArtifactLock::acquire)
            .transpose()?;

        let (train_set, val_set) =
            dataset.split(self.config.validation_fraction, self.config.seed);
        if model.has_batch_norm() && (train_set.len() < 2 || self.config.batch_size < 2) {
            return Err(AcneError::training_error(format!(
                "batch normalization needs at least two rows per batch \
                 ({} training samples, batch size {})",
                train_set.len(),
                self.config.batch_size
            )));
        }
        info!(
            "training on {} samples, validating on {} ({} epochs, batch size {})",
            train_set.len(),
            val_set.len(),
            self.config.epochs,
            self.config.batch_size
        );
        let device = model.device().clone();
        let train = Split::new(&train_set, &device)?;
        let val = if val_set.is_empty() {
            None
        } else {
            Some(Split::new(&val_set, &device)?)
        };
        if val.is_none() && self.config.early_stopping.is_some() {
            warn!("validation subset is empty; early stopping is disabled");
        }

        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(model.varmap().all_vars(), params)
            .map_err(|e| AcneError::training("failed to create optimizer", e))?;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut order: Vec<u32> = (0..train.len as u32).collect();
        let mut history = Vec::with_capacity(self.config.epochs);
        let mut best_val_loss = f32::INFINITY;
        let mut epochs_without_improvement = 0;
        let mut stopped_early = false;

        for epoch in 1..=self.config.epochs {
            order.shuffle(&mut rng);
            let mut loss_sum = 0.0;
            let mut batches = 0;
            for chunk in mini_batches(&order, self.config.batch_size) {
                let ids = Tensor::from_slice(chunk, chunk.len(), &device)?;
                let xs = train.features.index_select(&ids, 0)?;
                let ys = train.targets.index_select(&ids, 0)?;
                let logits = model.forward_t(&xs, true)?;
                let loss = candle_nn::loss::cross_entropy(&logits, &ys)?;
                let loss_value = loss.to_scalar::<f32>()?;
                if !loss_value.is_finite() {
                    return Err(AcneError::training_error(format!(
                        "loss became non-finite at epoch {epoch}; lower the learning rate"
                    )));
                }
                optimizer.backward_step(&loss).map_err(|e| {
                    AcneError::training(format!("optimizer step failed at epoch {epoch}"), e)
                })?;
                loss_sum += loss_value;
                batches += 1;
            }

            let (train_loss, train_accuracy) = evaluate(&model, &train)?;
            let (val_loss, val_accuracy) = match &val {
                Some(val) => {
                    let (loss, accuracy) = evaluate(&model, val)?;
                    (Some(loss), Some(accuracy))
                }
                None => (None, None),
            };
            for loss in std::iter::once(train_loss).chain(val_loss) {
                if !loss.is_finite() {
                    return Err(AcneError::training_error(format!(
                        "evaluation loss became non-finite at epoch {epoch}"
                    )));
                }
            }

            let metrics = EpochMetrics {
                epoch,
                batch_loss: loss_sum / batches.max(1) as f32,
                train_loss,
                train_accuracy,
                val_loss,
                val_accuracy,
            };
            info!(
                "epoch {}/{}: loss={:.4} accuracy={:.4} val_loss={} val_accuracy={}",
                epoch,
                self.config.epochs,
                metrics.train_loss,
                metrics.train_accuracy,
                fmt_metric(metrics.val_loss),
                fmt_metric(metrics.val_accuracy)
            );
            history.push(metrics);

            if let (Some(early), Some(val_loss)) = (&self.config.early_stopping, val_loss) {
                if val_loss < best_val_loss - early.min_delta {
                    best_val_loss = val_loss;
                    epochs_without_improvement = 0;
                } else {
                    epochs_without_improvement += 1;
                    if epochs_without_improvement >= early.patience {
                        info!(
                            "stopping early after epoch {}: \
                             no validation improvement for {} epochs",
                            epoch,
                            early.patience
                        );
                        stopped_early = true;
                        break;
                    }
                }
            }
        }

        let trained = TrainedModel {
            model,
            labels: self.labels.clone(),
            extractor: self.extractor.clone(),
            history,
            stopped_early,
            artifact_path: None,
        };
        match &self.config.output_dir {
            Some(dir) => {
                trained.save(dir)?;
                Ok(TrainedModel {
                    artifact_path: Some(dir.clone()),
                    ..trained
                })
            }
            None => Ok(trained),
        }
    }

    fn check_compatible(
        &self,
        dataset: &Dataset,
        model: &ClassifierModel,
    ) -> Result<(), AcneError> {
        if dataset.is_empty() {
            return Err(AcneError::training_error("dataset has no samples"));
        }
        if dataset.embedding_dim() != model.input_dim() {
            return Err(AcneError::training_error(format!(
                "dataset embeddings are {}-wide but the model expects {}",
                dataset.embedding_dim(),
                model.input_dim()
            )));
        }
        if dataset.embedding_dim() != self.extractor.embedding_dim {
            return Err(AcneError::training_error(format!(
                "dataset embeddings are {}-wide but extractor '{}' produces {}",
                dataset.embedding_dim(),
                self.extractor.name,
                self.extractor.embedding_dim
            )));
        }
        if self.labels.len() != model.num_classes() {
            return Err(AcneError::training_error(format!(
                "label set has {} classes but the model has {} outputs",
                self.labels.len(),
                model.num_classes()
            )));
        }
        if dataset.num_classes() != self.labels.len() {
            return Err(AcneError::training_error(format!(
                "dataset indexes {} classes but the label set has {}",
                dataset.num_classes(),
                self.labels.len()
            )));
        }
        Ok(())
    }
}

/// Splits `order` into batches of `batch_size`.
///
/// A trailing single-row batch is merged into the one before it: batch normalization
/// cannot estimate a variance from one row.
fn mini_batches(order: &[u32], batch_size: usize) -> Vec<&[u32]> {
    let mut batches: Vec<&[u32]> = order.chunks(batch_size).collect();
    if batches.len() > 1 && batches.last().is_some_and(|last| last.len() == 1) {
        let start = (batches.len() - 2) * batch_size;
        batches.truncate(batches.len() - 2);
        batches.push(&order[start..]);
    }
    batches
}

/// Mean cross-entropy and accuracy over `split`, in evaluation mode.
fn evaluate(model: &ClassifierModel, split: &Split) -> Result<(f32, f32), AcneError> {
    let logits = model.forward_t(&split.features, false)?;
    let loss = candle_nn::loss::cross_entropy(&logits, &split.targets)?.to_scalar::<f32>()?;
    let accuracy = logits
        .argmax(D::Minus1)?
        .eq(&split.targets)?
        .to_dtype(DType::F32)?
        .mean_all()?
        .to_scalar::<f32>()?;
    Ok((loss, accuracy))
}

fn fmt_metric(value: Option<f32>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}
