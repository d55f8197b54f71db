//! Classifies images with a trained acne classifier and prints JSON predictions.
//!
//! # Usage
//!
//! ```bash
//! acne-analyze [OPTIONS] <IMAGES>...
//! ```
//!
//! # Example
//!
//! ```bash
//! acne-analyze \
//!     --backbone models/mobilenet_v2_headless.onnx \
//!     --model models/acne-v1 \
//!     face1.jpg face2.png
//! ```

mod common;

use acne_classifier::core::init_tracing;
use acne_classifier::domain::ClassPrediction;
use acne_classifier::pipeline::{InferenceService, ServiceConfig};
use clap::Parser;
use common::{ExtractorArgs, load_labels};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};

/// Command-line arguments for analysis
#[derive(Parser)]
#[command(name = "acne-analyze")]
#[command(about = "Classify facial skin-lesion images")]
struct Args {
    /// Images to classify
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Trained artifact directory
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// JSON service configuration; replaces the extractor and model flags
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the extractor output as class scores when no artifact is available
    #[arg(long)]
    passthrough: bool,

    /// JSON label set for passthrough mode
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Only print the most confident entries
    #[arg(long)]
    top_k: Option<usize>,

    #[command(flatten)]
    extractor: ExtractorArgs,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Output<'a> {
    image: String,
    top_prediction: &'a ClassPrediction,
    all_predictions: &'a [ClassPrediction],
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => {
            let mut config = ServiceConfig::new(args.extractor.to_spec()?)
                .with_passthrough(args.passthrough)
                .with_labels(load_labels(args.labels.as_ref())?);
            if let Some(model) = &args.model {
                config = config.with_classifier_path(model);
            }
            config
        }
    };

    let service = InferenceService::new(config);
    service.load()?;

    let mut failures = 0;
    for path in &args.images {
        match service.analyze_path(path) {
            Ok(result) => {
                let output = Output {
                    image: path.display().to_string(),
                    top_prediction: &result.top_prediction,
                    all_predictions: result.top_k(args.top_k.unwrap_or(usize::MAX)),
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            Err(e) => {
                error!("{}: {}", path.display(), e);
                failures += 1;
            }
        }
    }

    info!("{}", service.stats());
    if failures > 0 {
        return Err(format!("{failures} of {} images failed", args.images.len()).into());
    }
    Ok(())
}
