//! Dataset construction and head training.

pub mod dataset_builder;
pub mod lock;
pub mod trainer;

pub use dataset_builder::{BuildReport, DatasetBuilder, SkippedFile};
pub use lock::ArtifactLock;
pub use trainer::{EpochMetrics, TrainedModel, Trainer};
