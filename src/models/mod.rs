//! Feature extractors, the trainable classifier head and classifier selection.

pub mod extractor;
pub mod head;
pub mod source;

pub use extractor::{
    ExtractorSpec, FeatureExtractor, OnnxExtractorConfig, OnnxFeatureExtractor,
    PooledColorExtractor,
};
pub use head::{
    ClassifierModel, ExtractorIdentity, HeadArchitecture, HeadConfig, LayerSpec, load_artifact,
    save_artifact,
};
pub use source::{ClassifierSource, load_model, select_classifier};
