//! Builds an embedding dataset from a `<root>/<class>/<image>` directory tree.

use crate::core::config::{ConfigValidator, DatasetConfig};
use crate::core::AcneError;
use crate::domain::{Dataset, EmbeddingVector, LabelSet, LabeledSample};
use crate::models::FeatureExtractor;
use crate::processors::ImagePreprocessor;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A file the builder could not turn into a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// What a build found, per class and per file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    /// `(class name, samples built)` in label order, for classes whose directory exists.
    pub samples_per_class: Vec<(String, usize)>,
    /// Classes with no directory under the root.
    pub missing_classes: Vec<String>,
    pub skipped_files: Vec<SkippedFile>,
}

impl BuildReport {
    pub fn total_samples(&self) -> usize {
        self.samples_per_class.iter().map(|(_, n)| n).sum()
    }
}

/// Walks a labeled image tree, embedding every accepted file.
///
/// Classes are looked up by name in [`LabelSet`] order, so sample class indices never
/// depend on filesystem order. Per-file preprocessing and embedding run on a dedicated
/// rayon pool sized by [`DatasetConfig::workers`].
#[derive(Debug)]
pub struct DatasetBuilder {
    extractor: Arc<dyn FeatureExtractor>,
    preprocessor: ImagePreprocessor,
    config: DatasetConfig,
}

impl DatasetBuilder {
    pub fn new(
        extractor: Arc<dyn FeatureExtractor>,
        config: DatasetConfig,
    ) -> Result<Self, AcneError> {
        config.validate()?;
        Ok(Self {
            extractor,
            preprocessor: ImagePreprocessor::new(),
            config,
        })
    }

    /// Builds the dataset for `labels` from `root`.
    ///
    /// # Errors
    ///
    /// * `ConfigError` when `root` is not a directory.
    /// * `EmptyDataset` when no sample could be built.
    pub fn build(
        &self,
        root: &Path,
        labels: &LabelSet,
    ) -> Result<(Dataset, BuildReport), AcneError> {
        if !root.is_dir() {
            return Err(AcneError::config_error_with_context(
                "data_dir",
                &root.display().to_string(),
                "not a directory",
            ));
        }

        let mut report = BuildReport::default();
        let mut candidates: Vec<(usize, PathBuf)> = Vec::new();
        for (class_index, class_name) in labels.iter() {
            let class_dir = root.join(class_name);
            if !class_dir.is_dir() {
                warn!(
                    "class directory '{}' not found under {}; skipping",
                    class_name,
                    root.display()
                );
                report.missing_classes.push(class_name.to_string());
                continue;
            }
            match self.list_images(&class_dir) {
                Ok(files) => {
                    debug!("found {} candidate files for class '{}'", files.len(), class_name);
                    candidates.extend(files.into_iter().map(|path| (class_index, path)));
                }
                Err(e) => {
                    warn!("cannot read class directory {}: {}", class_dir.display(), e);
                    report.missing_classes.push(class_name.to_string());
                    continue;
                }
            }
            report.samples_per_class.push((class_name.to_string(), 0));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.effective_workers())
            .build()
            .map_err(|e| AcneError::config_error(format!("failed to build worker pool: {e}")))?;
        info!(
            "embedding {} images with {} workers",
            candidates.len(),
            pool.current_num_threads()
        );
        let results: Vec<(usize, PathBuf, Result<EmbeddingVector, AcneError>)> =
            pool.install(|| {
                candidates
                    .into_par_iter()
                    .map(|(class_index, path)| {
                        let embedding = self.embed_file(&path);
                        (class_index, path, embedding)
                    })
                    .collect()
            });

        let mut dataset = Dataset::new(self.extractor.embedding_dim(), labels.len());
        for (class_index, path, embedding) in results {
            let outcome =
                embedding.and_then(|e| dataset.push(LabeledSample::new(e, class_index)));
            match outcome {
                Ok(()) => {
                    if let Some(name) = labels.name(class_index) {
                        if let Some(entry) =
                            report.samples_per_class.iter_mut().find(|(n, _)| n == name)
                        {
                            entry.1 += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!("skipping {}: {}", path.display(), e);
                    report.skipped_files.push(SkippedFile {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if dataset.is_empty() {
            return Err(AcneError::empty_dataset(root, labels.len()));
        }
        info!(
            "built dataset with {} samples ({} classes missing, {} files skipped)",
            dataset.len(),
            report.missing_classes.len(),
            report.skipped_files.len()
        );
        Ok((dataset, report))
    }

    /// Accepted image files directly under `dir`, in sorted path order.
    fn list_images(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let accepted = path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| self.config.accepts_extension(ext));
            if accepted {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn embed_file(&self, path: &Path) -> Result<EmbeddingVector, AcneError> {
        let tensor = self.preprocessor.preprocess_path(path)?;
        self.extractor.embed(&tensor)
    }
}
