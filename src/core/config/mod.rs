//! Configuration management.
//!
//! Configuration types, the validation trait, and JSON loading shared by the training
//! and inference entry points.

pub mod errors;
pub mod onnx;
pub mod training;

pub use errors::{ConfigError, ConfigValidator, ConfigValidatorExt};
pub use onnx::*;
pub use training::{DatasetConfig, EarlyStoppingConfig, TrainingConfig};

use crate::core::errors::AcneError;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Reads a JSON configuration file and validates it.
pub fn load_json_config<T>(path: impl AsRef<Path>) -> Result<T, AcneError>
where
    T: DeserializeOwned + ConfigValidator,
{
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AcneError::config_error(format!(
            "failed to read configuration '{}': {e}",
            path.display()
        ))
    })?;
    let config: T = serde_json::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}
