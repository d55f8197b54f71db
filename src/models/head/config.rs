//! Declarative description of the classifier head.
//!
//! [`HeadConfig`] holds the tunable hyperparameters. [`HeadArchitecture`] is the concrete
//! layer list derived from it for a given input width and class count; it is what gets
//! written to `model.json` and what inference rebuilds the graph from.

use crate::core::config::{ConfigError, ConfigValidator};
use crate::core::AcneError;
use serde::{Deserialize, Serialize};

/// Hyperparameters of the classifier head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadConfig {
    /// Widths of the hidden dense layers, in order.
    pub hidden_units: Vec<usize>,
    /// Dropout rate after each hidden layer. `0.0` disables dropout.
    pub dropout: f32,
    /// Insert batch normalization after each hidden dense layer.
    pub batch_norm: bool,
    /// Batch normalization epsilon.
    pub batch_norm_eps: f64,
    /// Seed for weight initialization.
    pub init_seed: u64,
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            hidden_units: vec![512, 256],
            dropout: 0.5,
            batch_norm: true,
            batch_norm_eps: 1e-3,
            init_seed: 42,
        }
    }
}

impl HeadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hidden_units(mut self, hidden_units: Vec<usize>) -> Self {
        self.hidden_units = hidden_units;
        self
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_batch_norm(mut self, enabled: bool) -> Self {
        self.batch_norm = enabled;
        self
    }

    pub fn with_init_seed(mut self, seed: u64) -> Self {
        self.init_seed = seed;
        self
    }
}

impl ConfigValidator for HeadConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (i, &units) in self.hidden_units.iter().enumerate() {
            self.validate_positive_usize(units, &format!("hidden_units[{i}]"))?;
        }
        self.validate_f32_range(self.dropout, 0.0, 1.0, "dropout")?;
        if !self.batch_norm_eps.is_finite() || self.batch_norm_eps <= 0.0 {
            return Err(ConfigError::InvalidConfig {
                message: format!(
                    "batch_norm_eps must be greater than 0, got {}",
                    self.batch_norm_eps
                ),
            });
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// One layer of the head, in forward order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    /// Fully connected layer; weights are stored as `<name>.weight` `[output, input]`
    /// and `<name>.bias` `[output]`.
    Dense {
        name: String,
        input: usize,
        output: usize,
    },
    Relu,
    /// Batch normalization with affine parameters and running statistics stored under
    /// `<name>.weight`, `<name>.bias`, `<name>.running_mean` and `<name>.running_var`.
    BatchNorm {
        name: String,
        features: usize,
        eps: f64,
    },
    /// Only active in training mode.
    Dropout { rate: f32 },
    Softmax,
}

/// The concrete layer graph of a classifier head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadArchitecture {
    pub input_dim: usize,
    pub num_classes: usize,
    pub layers: Vec<LayerSpec>,
}

impl HeadArchitecture {
    /// Lays out `dense -> relu -> [batch_norm] -> [dropout]` per hidden width, then a dense
    /// layer of width `num_classes` and a softmax.
    pub fn from_config(input_dim: usize, num_classes: usize, config: &HeadConfig) -> Self {
        let mut layers = Vec::new();
        let mut width = input_dim;
        for (i, &units) in config.hidden_units.iter().enumerate() {
            layers.push(LayerSpec::Dense {
                name: format!("dense_{i}"),
                input: width,
                output: units,
            });
            layers.push(LayerSpec::Relu);
            if config.batch_norm {
                layers.push(LayerSpec::BatchNorm {
                    name: format!("batch_norm_{i}"),
                    features: units,
                    eps: config.batch_norm_eps,
                });
            }
            if config.dropout > 0.0 {
                layers.push(LayerSpec::Dropout {
                    rate: config.dropout,
                });
            }
            width = units;
        }
        layers.push(LayerSpec::Dense {
            name: "logits".to_string(),
            input: width,
            output: num_classes,
        });
        layers.push(LayerSpec::Softmax);
        Self {
            input_dim,
            num_classes,
            layers,
        }
    }

    /// Checks that layer widths chain from `input_dim` to `num_classes`, layer names are
    /// unique and the graph ends in a softmax.
    pub fn validate(&self) -> Result<(), AcneError> {
        if self.input_dim == 0 || self.num_classes == 0 {
            return Err(AcneError::invalid_input(format!(
                "head needs a positive input width and class count, got {} -> {}",
                self.input_dim, self.num_classes
            )));
        }
        let mut names = std::collections::HashSet::new();
        let mut width = self.input_dim;
        for (i, layer) in self.layers.iter().enumerate() {
            match layer {
                LayerSpec::Dense {
                    name,
                    input,
                    output,
                } => {
                    if *input != width || *output == 0 {
                        return Err(AcneError::invalid_input(format!(
                            "layer {i} '{name}' maps {input} -> {output} but receives width {width}"
                        )));
                    }
                    if !names.insert(name.as_str()) {
                        return Err(AcneError::invalid_input(format!(
                            "duplicate layer name '{name}'"
                        )));
                    }
                    width = *output;
                }
                LayerSpec::BatchNorm { name, features, .. } => {
                    if *features != width {
                        return Err(AcneError::invalid_input(format!(
                            "layer {i} '{name}' normalizes {features} features \
                             but receives width {width}"
                        )));
                    }
                    if !names.insert(name.as_str()) {
                        return Err(AcneError::invalid_input(format!(
                            "duplicate layer name '{name}'"
                        )));
                    }
                }
                LayerSpec::Dropout { rate } => {
                    if !(0.0..1.0).contains(rate) {
                        return Err(AcneError::invalid_input(format!(
                            "layer {i} has dropout rate {rate} outside [0, 1)"
                        )));
                    }
                }
                LayerSpec::Relu => {}
                LayerSpec::Softmax => {
                    if i + 1 != self.layers.len() {
                        return Err(AcneError::invalid_input(
                            "softmax must be the last layer",
                        ));
                    }
                }
            }
        }
        if width != self.num_classes {
            return Err(AcneError::invalid_input(format!(
                "head produces {width} outputs for {} classes",
                self.num_classes
            )));
        }
        if !matches!(self.layers.last(), Some(LayerSpec::Softmax)) {
            return Err(AcneError::invalid_input("head must end with a softmax layer"));
        }
        Ok(())
    }

    /// Number of trainable weights (dense and batch-norm affine parameters).
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| match layer {
                LayerSpec::Dense { input, output, .. } => input * output + output,
                LayerSpec::BatchNorm { features, .. } => 2 * features,
                _ => 0,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_architecture_layout() {
        let arch = HeadArchitecture::from_config(1280, 7, &HeadConfig::default());
        assert!(arch.validate().is_ok());
        // 2 x (dense, relu, batch_norm, dropout) + dense + softmax
        assert_eq!(arch.layers.len(), 10);
        assert_eq!(
            arch.layers[0],
            LayerSpec::Dense {
                name: "dense_0".into(),
                input: 1280,
                output: 512
            }
        );
        assert_eq!(
            arch.layers[8],
            LayerSpec::Dense {
                name: "logits".into(),
                input: 256,
                output: 7
            }
        );
        assert_eq!(
            arch.parameter_count(),
            1280 * 512 + 512 + 2 * 512 + 512 * 256 + 256 + 2 * 256 + 256 * 7 + 7
        );
    }

    #[test]
    fn test_minimal_architecture() {
        let config = HeadConfig::new()
            .with_hidden_units(vec![])
            .with_batch_norm(false)
            .with_dropout(0.0);
        let arch = HeadArchitecture::from_config(12, 4, &config);
        assert_eq!(arch.layers.len(), 2);
        assert!(arch.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_broken_chains() {
        let mut arch = HeadArchitecture::from_config(8, 3, &HeadConfig::default());
        arch.num_classes = 4;
        assert!(arch.validate().is_err());

        let mut arch = HeadArchitecture::from_config(8, 3, &HeadConfig::default());
        arch.layers.pop();
        assert!(arch.validate().is_err());

        let mut arch = HeadArchitecture::from_config(8, 3, &HeadConfig::default());
        arch.input_dim = 9;
        assert!(arch.validate().is_err());
    }

    #[test]
    fn test_architecture_json_is_tagged() {
        let arch = HeadArchitecture::from_config(4, 2, &HeadConfig::default());
        let json = serde_json::to_value(&arch).unwrap();
        assert_eq!(json["layers"][0]["type"], "dense");
        assert_eq!(json["layers"][2]["type"], "batch_norm");
        let back: HeadArchitecture = serde_json::from_value(json).unwrap();
        assert_eq!(back, arch);
    }

    #[test]
    fn test_head_config_validation() {
        assert!(HeadConfig::default().validate().is_ok());
        assert!(HeadConfig::new().with_dropout(1.0).validate().is_err());
        assert!(
            HeadConfig::new()
                .with_hidden_units(vec![16, 0])
                .validate()
                .is_err()
        );
    }
}
