//! Trains an acne classifier head on a labeled image directory.
//!
//! # Usage
//!
//! ```bash
//! acne-train [OPTIONS] <DATA_DIR> <OUTPUT>
//! ```
//!
//! `DATA_DIR` holds one subdirectory per class (`whitehead/`, `blackhead/`, ...) with
//! `.jpg`, `.jpeg` or `.png` files. `OUTPUT` is the artifact directory to write.
//!
//! # Example
//!
//! ```bash
//! RUST_LOG=info acne-train \
//!     --backbone models/mobilenet_v2_headless.onnx \
//!     --epochs 20 --batch-size 32 \
//!     data/acne models/acne-v1
//! ```

mod common;

use acne_classifier::core::config::{
    ConfigValidator, DatasetConfig, TrainingConfig, load_json_config,
};
use acne_classifier::core::init_tracing;
use acne_classifier::models::{ClassifierModel, HeadConfig};
use acne_classifier::training::{DatasetBuilder, Trainer};
use clap::Parser;
use common::{ExtractorArgs, load_labels};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

/// Command-line arguments for training
#[derive(Parser)]
#[command(name = "acne-train")]
#[command(about = "Train an acne classifier head on top of a frozen image backbone")]
struct Args {
    /// Dataset root with one subdirectory per class
    data_dir: PathBuf,

    /// Artifact directory to write
    output: PathBuf,

    /// JSON training configuration; command-line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON label set (defaults to the canonical acne classes)
    #[arg(long)]
    labels: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    /// Share of samples held out for validation
    #[arg(long)]
    validation_fraction: Option<f32>,

    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many epochs without validation improvement
    #[arg(long)]
    patience: Option<usize>,

    /// Hidden layer widths, comma separated
    #[arg(long, value_delimiter = ',', default_values_t = vec![512, 256])]
    hidden_units: Vec<usize>,

    #[arg(long, default_value = "0.5")]
    dropout: f32,

    /// Disable batch normalization in the head
    #[arg(long)]
    no_batch_norm: bool,

    /// Worker threads for dataset building (defaults to available parallelism)
    #[arg(long)]
    workers: Option<usize>,

    #[command(flatten)]
    extractor: ExtractorArgs,
}

impl Args {
    fn training_config(&self) -> Result<TrainingConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => load_json_config::<TrainingConfig>(path)?,
            None => TrainingConfig::default(),
        };
        if let Some(epochs) = self.epochs {
            config = config.with_epochs(epochs);
        }
        if let Some(batch_size) = self.batch_size {
            config = config.with_batch_size(batch_size);
        }
        if let Some(lr) = self.learning_rate {
            config = config.with_learning_rate(lr);
        }
        if let Some(fraction) = self.validation_fraction {
            config = config.with_validation_fraction(fraction);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(patience) = self.patience {
            config = config.with_early_stopping(patience, 0.0);
        }
        config = config.with_output_dir(&self.output);
        config.validate()?;
        Ok(config)
    }

    fn head_config(&self, seed: u64) -> Result<HeadConfig, Box<dyn std::error::Error>> {
        let config = HeadConfig::new()
            .with_hidden_units(self.hidden_units.clone())
            .with_dropout(self.dropout)
            .with_batch_norm(!self.no_batch_norm)
            .with_init_seed(seed);
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let training = args.training_config()?;
    let head = args.head_config(training.seed)?;
    let labels = load_labels(args.labels.as_ref())?;
    let mut dataset_config = DatasetConfig::default();
    if let Some(workers) = args.workers {
        dataset_config = dataset_config.with_workers(workers);
    }

    let extractor = args.extractor.to_spec()?.load()?;
    info!(
        "using extractor '{}' ({}-wide embeddings)",
        extractor.name(),
        extractor.embedding_dim()
    );

    let started = Instant::now();
    let builder = DatasetBuilder::new(extractor.clone(), dataset_config)?;
    let (dataset, report) = builder.build(&args.data_dir, &labels)?;
    for (class_name, count) in &report.samples_per_class {
        info!("  {class_name}: {count} samples");
    }
    for class_name in &report.missing_classes {
        warn!("  {class_name}: no directory");
    }
    if !report.skipped_files.is_empty() {
        warn!("{} files were skipped", report.skipped_files.len());
    }
    info!("dataset built in {:.2?}", started.elapsed());

    let model = ClassifierModel::build(dataset.embedding_dim(), labels.len(), &head)?;
    info!(
        "head has {} parameters",
        model.architecture().parameter_count()
    );
    let trainer = Trainer::new(training, labels, extractor.identity())?;
    let trained = match trainer.train(&dataset, model) {
        Ok(trained) => trained,
        Err(e) => {
            error!("training failed: {e}");
            return Err(e.into());
        }
    };

    if let Some(metrics) = trained.final_metrics() {
        info!(
            "finished after {} epochs{}: train accuracy {:.4}, validation accuracy {}",
            metrics.epoch,
            if trained.stopped_early { " (early stop)" } else { "" },
            metrics.train_accuracy,
            metrics
                .val_accuracy
                .map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
        );
    }
    if let Some(path) = &trained.artifact_path {
        info!("model written to {}", path.display());
    }
    Ok(())
}
