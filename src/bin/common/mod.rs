//! Argument handling shared by the command-line tools.

use acne_classifier::core::config::{OrtExecutionProvider, OrtSessionConfig};
use acne_classifier::domain::LabelSet;
use acne_classifier::models::{ExtractorSpec, OnnxExtractorConfig};
use acne_classifier::processors::ChannelOrder;
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use tracing::warn;

/// Channel layout expected by the backbone.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Layout {
    Chw,
    Hwc,
}

impl From<Layout> for ChannelOrder {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Chw => ChannelOrder::CHW,
            Layout::Hwc => ChannelOrder::HWC,
        }
    }
}

/// Feature extractor selection.
#[derive(Debug, Args)]
pub struct ExtractorArgs {
    /// Headless ONNX backbone. Without it the pooled-color extractor is used
    #[arg(long)]
    pub backbone: Option<PathBuf>,

    /// Backbone input tensor name (defaults to the first input)
    #[arg(long)]
    pub input_name: Option<String>,

    /// Backbone output tensor name (defaults to the first output)
    #[arg(long)]
    pub output_name: Option<String>,

    /// Tensor layout the backbone expects
    #[arg(long, value_enum, default_value = "hwc")]
    pub layout: Layout,

    /// Device to run the backbone on (e.g., 'cpu', 'cuda', 'cuda:0')
    #[arg(long, default_value = "cpu")]
    pub device: String,

    /// Session pool size for concurrent inference
    #[arg(long, default_value = "1")]
    pub session_pool_size: usize,

    /// Intra-op threads for the backbone session
    #[arg(long)]
    pub threads: Option<usize>,

    /// Grid size of the pooled-color extractor
    #[arg(long, default_value = "4")]
    pub grid: usize,
}

impl ExtractorArgs {
    pub fn to_spec(&self) -> Result<ExtractorSpec, Box<dyn std::error::Error>> {
        let Some(backbone) = &self.backbone else {
            return Ok(ExtractorSpec::PooledColor { grid: self.grid });
        };
        let mut session = OrtSessionConfig::new();
        for provider in parse_device(&self.device)? {
            session = session.add_execution_provider(provider);
        }
        if let Some(threads) = self.threads {
            session = session.with_intra_threads(threads);
        }
        let mut config = OnnxExtractorConfig::new(backbone)
            .with_channel_order(self.layout.into())
            .with_session(session)
            .with_session_pool_size(self.session_pool_size);
        if let Some(name) = &self.input_name {
            config = config.with_input_name(name);
        }
        if let Some(name) = &self.output_name {
            config = config.with_output_name(name);
        }
        Ok(ExtractorSpec::Onnx(config))
    }
}

/// Parses a device string ("cpu", "cuda", "cuda:N") into execution providers.
pub fn parse_device(
    device: &str,
) -> Result<Vec<OrtExecutionProvider>, Box<dyn std::error::Error>> {
    let device = device.to_lowercase();
    if device == "cpu" {
        return Ok(vec![OrtExecutionProvider::CPU]);
    }
    let device_id = if device == "cuda" {
        0
    } else if let Some(id) = device.strip_prefix("cuda:") {
        id.parse::<i32>()?
    } else {
        return Err(
            format!("unsupported device: {device}. Supported devices: cpu, cuda, cuda:N").into(),
        );
    };
    if cfg!(feature = "cuda") {
        Ok(vec![
            OrtExecutionProvider::CUDA {
                device_id: Some(device_id),
            },
            OrtExecutionProvider::CPU,
        ])
    } else {
        warn!("CUDA requested but the cuda feature is not enabled. Falling back to CPU.");
        Ok(vec![OrtExecutionProvider::CPU])
    }
}

/// Reads a label set from `path`, or returns the canonical acne labels.
pub fn load_labels(path: Option<&PathBuf>) -> Result<LabelSet, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(LabelSet::load(path)?),
        None => Ok(LabelSet::acne()),
    }
}
