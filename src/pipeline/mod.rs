//! The inference pipeline: preprocessing, embedding and classification behind a
//! readiness gate.

mod config;
pub mod service;
pub mod stats;

pub use config::ServiceConfig;
pub use service::{InferenceService, LoadedPipeline, Readiness};
pub use stats::{AnalysisStats, StatsRecorder};
