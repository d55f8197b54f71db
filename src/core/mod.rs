//! Core building blocks shared by training and inference.
//!
//! - Configuration types and validation
//! - Constants (input geometry, artifact file names, the canonical label list)
//! - Error handling
//! - ONNX Runtime integration
//! - Tensor aliases

pub mod batch;
pub mod config;
pub mod constants;
pub mod errors;
pub mod inference;

pub use batch::{Tensor2D, Tensor3D, Tensor4D};
pub use config::{
    ConfigError, ConfigValidator, ConfigValidatorExt, DatasetConfig, OrtSessionConfig,
    TrainingConfig,
};
pub use constants::*;
pub use errors::{AcneError, AcneResult, ProcessingStage};
pub use inference::OrtInfer;

/// Initializes the tracing subscriber for logging.
///
/// Installs a registry with an `EnvFilter` read from `RUST_LOG` and a formatting layer.
/// Call once at the start of a binary.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
