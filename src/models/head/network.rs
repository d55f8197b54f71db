//! The trainable classifier head, built with candle.

use super::config::{HeadArchitecture, HeadConfig, LayerSpec};
use crate::core::AcneError;
use candle_core::{D, DType, Device, Tensor};
use candle_nn::{
    BatchNorm, BatchNormConfig, Dropout, Linear, Module, ModuleT, VarBuilder, VarMap,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

enum Layer {
    Dense(Linear),
    Relu,
    BatchNorm(BatchNorm),
    Dropout(Dropout),
}

/// A feed-forward head mapping embeddings to class probabilities.
///
/// All parameters, including batch-norm running statistics, live in one [`VarMap`]; the
/// layers hold handles onto the same storage, so training updates and loaded weights are
/// visible to both.
pub struct ClassifierModel {
    architecture: HeadArchitecture,
    varmap: VarMap,
    layers: Vec<Layer>,
    device: Device,
}

impl std::fmt::Debug for ClassifierModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierModel")
            .field("input_dim", &self.architecture.input_dim)
            .field("num_classes", &self.architecture.num_classes)
            .field("layers", &self.architecture.layers.len())
            .finish()
    }
}

impl ClassifierModel {
    /// Builds an untrained head for `input_dim`-wide embeddings and `num_classes` outputs.
    ///
    /// Dense weights and biases are drawn uniformly from `±1/sqrt(fan_in)` with a
    /// generator seeded by `config.init_seed`.
    pub fn build(
        input_dim: usize,
        num_classes: usize,
        config: &HeadConfig,
    ) -> Result<Self, AcneError> {
        let architecture = HeadArchitecture::from_config(input_dim, num_classes, config);
        let mut model = Self::from_architecture(architecture)?;
        model.initialize(config.init_seed)?;
        Ok(model)
    }

    /// Builds the graph described by `architecture` with placeholder parameters.
    pub fn from_architecture(architecture: HeadArchitecture) -> Result<Self, AcneError> {
        architecture.validate()?;
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let mut layers = Vec::with_capacity(architecture.layers.len());
        for spec in &architecture.layers {
            let layer = match spec {
                LayerSpec::Dense {
                    name,
                    input,
                    output,
                } => Layer::Dense(candle_nn::linear(*input, *output, vb.pp(name))?),
                LayerSpec::Relu => Layer::Relu,
                LayerSpec::BatchNorm {
                    name,
                    features,
                    eps,
                } => {
                    let bn_config = BatchNormConfig {
                        eps: *eps,
                        ..Default::default()
                    };
                    Layer::BatchNorm(candle_nn::batch_norm(*features, bn_config, vb.pp(name))?)
                }
                LayerSpec::Dropout { rate } => Layer::Dropout(Dropout::new(*rate)),
                // Applied by `predict_proba`; training works on logits.
                LayerSpec::Softmax => continue,
            };
            layers.push(layer);
        }

        Ok(Self {
            architecture,
            varmap,
            layers,
            device,
        })
    }

    fn initialize(&mut self, seed: u64) -> Result<(), AcneError> {
        let mut rng = StdRng::seed_from_u64(seed);
        for spec in &self.architecture.layers {
            if let LayerSpec::Dense {
                name,
                input,
                output,
            } = spec
            {
                let bound = 1.0 / (*input as f32).sqrt();
                let weight: Vec<f32> = (0..input * output)
                    .map(|_| rng.random_range(-bound..bound))
                    .collect();
                let bias: Vec<f32> = (0..*output)
                    .map(|_| rng.random_range(-bound..bound))
                    .collect();
                self.varmap.set_one(
                    format!("{name}.weight"),
                    Tensor::from_vec(weight, (*output, *input), &self.device)?,
                )?;
                self.varmap.set_one(
                    format!("{name}.bias"),
                    Tensor::from_vec(bias, *output, &self.device)?,
                )?;
            }
        }
        Ok(())
    }

    /// Rebuilds the graph from `architecture` and loads weights from a safetensors file.
    ///
    /// Every parameter the graph declares must be present with a matching shape.
    pub fn load(architecture: HeadArchitecture, weights: &Path) -> Result<Self, AcneError> {
        let mut model = Self::from_architecture(architecture)?;
        model.varmap.load(weights).map_err(|e| {
            AcneError::model_load_error(
                weights,
                "weights do not match the declared architecture",
                Some("re-export the artifact from the same training run"),
                Some(e),
            )
        })?;
        Ok(model)
    }

    /// Writes all parameters to a safetensors file.
    pub fn save_weights(&self, path: &Path) -> Result<(), AcneError> {
        self.varmap.save(path)?;
        Ok(())
    }

    pub fn architecture(&self) -> &HeadArchitecture {
        &self.architecture
    }

    pub fn input_dim(&self) -> usize {
        self.architecture.input_dim
    }

    pub fn num_classes(&self) -> usize {
        self.architecture.num_classes
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Whether any layer normalizes with batch statistics during training.
    pub fn has_batch_norm(&self) -> bool {
        self.layers
            .iter()
            .any(|layer| matches!(layer, Layer::BatchNorm(_)))
    }

    pub(crate) fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Computes logits for a `[batch, input_dim]` tensor.
    ///
    /// With `train` set, batch normalization uses batch statistics (and updates its
    /// running averages) and dropout is active.
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let mut xs = xs.clone();
        for layer in &self.layers {
            xs = match layer {
                Layer::Dense(linear) => linear.forward(&xs)?,
                Layer::Relu => xs.relu()?,
                Layer::BatchNorm(bn) => bn.forward_t(&xs, train)?,
                Layer::Dropout(dropout) => dropout.forward_t(&xs, train)?,
            };
        }
        Ok(xs)
    }

    /// Class probabilities for a row-major `[rows, input_dim]` buffer, in evaluation mode.
    pub fn predict_proba_batch(
        &self,
        features: &[f32],
        rows: usize,
    ) -> Result<Vec<Vec<f32>>, AcneError> {
        if rows == 0 || features.len() != rows * self.input_dim() {
            return Err(AcneError::tensor_shape_error(
                "classifier input",
                &[rows, self.input_dim()],
                &[features.len()],
            ));
        }
        let xs = Tensor::from_slice(features, (rows, self.input_dim()), &self.device)?;
        let logits = self.forward_t(&xs, false)?;
        let probabilities = candle_nn::ops::softmax(&logits, D::Minus1)?;
        Ok(probabilities.to_vec2::<f32>()?)
    }

    /// Class probabilities for a single embedding, in evaluation mode.
    pub fn predict_proba(&self, embedding: &[f32]) -> Result<Vec<f32>, AcneError> {
        let mut rows = self.predict_proba_batch(embedding, 1)?;
        rows.pop()
            .ok_or_else(|| AcneError::invalid_input("classifier returned no rows"))
    }
}
