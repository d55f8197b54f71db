//! Trainable classifier head: configuration, candle network and artifact persistence.

pub mod artifact;
pub mod config;
pub mod network;

pub use artifact::{
    ArtifactManifest, ExtractorIdentity, LoadedArtifact, artifact_exists, load_artifact,
    save_artifact,
};
pub use config::{HeadArchitecture, HeadConfig, LayerSpec};
pub use network::ClassifierModel;
