//! In-memory labeled embedding sets.

use super::embedding::EmbeddingVector;
use crate::core::AcneError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// One embedding paired with its class index.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSample {
    pub embedding: EmbeddingVector,
    pub class_index: usize,
}

impl LabeledSample {
    pub fn new(embedding: EmbeddingVector, class_index: usize) -> Self {
        Self {
            embedding,
            class_index,
        }
    }
}

/// A sequence of samples sharing one embedding dimension and one class count.
///
/// Both invariants are checked on every [`Dataset::push`], so a `Dataset` can be fed to
/// the trainer without revalidating individual samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    embedding_dim: usize,
    num_classes: usize,
    samples: Vec<LabeledSample>,
}

impl Dataset {
    /// Creates an empty dataset.
    pub fn new(embedding_dim: usize, num_classes: usize) -> Self {
        Self {
            embedding_dim,
            num_classes,
            samples: Vec::new(),
        }
    }

    /// Builds a dataset from samples, validating each one.
    pub fn from_samples(
        embedding_dim: usize,
        num_classes: usize,
        samples: impl IntoIterator<Item = LabeledSample>,
    ) -> Result<Self, AcneError> {
        let mut dataset = Self::new(embedding_dim, num_classes);
        for sample in samples {
            dataset.push(sample)?;
        }
        Ok(dataset)
    }

    /// Appends a sample.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the embedding dimension or class index does not fit.
    pub fn push(&mut self, sample: LabeledSample) -> Result<(), AcneError> {
        if sample.embedding.dim() != self.embedding_dim {
            return Err(AcneError::invalid_input(format!(
                "embedding dimension {} does not match dataset dimension {}",
                sample.embedding.dim(),
                self.embedding_dim
            )));
        }
        if sample.class_index >= self.num_classes {
            return Err(AcneError::invalid_input(format!(
                "class index {} out of range for {} classes",
                sample.class_index, self.num_classes
            )));
        }
        self.samples.push(sample);
        Ok(())
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[LabeledSample] {
        &self.samples
    }

    /// Number of samples per class index.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes];
        for sample in &self.samples {
            counts[sample.class_index] += 1;
        }
        counts
    }

    /// Copies the samples at `indices` into a new dataset.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            embedding_dim: self.embedding_dim,
            num_classes: self.num_classes,
            samples: indices
                .iter()
                .filter_map(|&i| self.samples.get(i).cloned())
                .collect(),
        }
    }

    /// Splits into `(train, validation)`.
    ///
    /// The validation subset holds `round(len * validation_fraction)` samples, capped so
    /// at least one sample stays in training. The assignment is a seeded shuffle, so the
    /// same seed always produces the same split.
    pub fn split(&self, validation_fraction: f32, seed: u64) -> (Self, Self) {
        let n = self.samples.len();
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let fraction = validation_fraction.clamp(0.0, 1.0);
        let n_val = ((n as f32 * fraction).round() as usize).min(n.saturating_sub(1));
        let (val_idx, train_idx) = indices.split_at(n_val);
        (self.subset(train_idx), self.subset(val_idx))
    }

    /// Flattens embeddings row-major and collects class indices, for tensor construction.
    pub fn to_arrays(&self) -> (Vec<f32>, Vec<u32>) {
        let mut features = Vec::with_capacity(self.samples.len() * self.embedding_dim);
        let mut labels = Vec::with_capacity(self.samples.len());
        for sample in &self.samples {
            features.extend_from_slice(sample.embedding.as_slice());
            labels.push(sample.class_index as u32);
        }
        (features, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(values: &[f32], class_index: usize) -> LabeledSample {
        LabeledSample::new(EmbeddingVector::new(values.to_vec()).unwrap(), class_index)
    }

    fn dataset_of(n: usize) -> Dataset {
        Dataset::from_samples(2, 3, (0..n).map(|i| sample(&[i as f32, 0.0], i % 3))).unwrap()
    }

    #[test]
    fn test_push_enforces_dimension_and_class_range() {
        let mut dataset = Dataset::new(2, 3);
        assert!(dataset.push(sample(&[1.0, 2.0], 2)).is_ok());
        assert!(dataset.push(sample(&[1.0], 0)).is_err());
        assert!(dataset.push(sample(&[1.0, 2.0], 3)).is_err());
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_split_is_reproducible_and_complete() {
        let dataset = dataset_of(10);
        let (train_a, val_a) = dataset.split(0.2, 7);
        let (train_b, val_b) = dataset.split(0.2, 7);
        assert_eq!(train_a, train_b);
        assert_eq!(val_a, val_b);
        assert_eq!(train_a.len(), 8);
        assert_eq!(val_a.len(), 2);

        let mut seen: Vec<f32> = train_a
            .samples()
            .iter()
            .chain(val_a.samples())
            .map(|s| s.embedding.as_slice()[0])
            .collect();
        seen.sort_by(f32::total_cmp);
        assert_eq!(seen, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_keeps_one_training_sample() {
        let (train, val) = dataset_of(1).split(0.9, 1);
        assert_eq!(train.len(), 1);
        assert!(val.is_empty());

        let (train, val) = dataset_of(3).split(0.99, 1);
        assert_eq!(train.len(), 1);
        assert_eq!(val.len(), 2);
    }

    #[test]
    fn test_class_counts_and_arrays() {
        let dataset = dataset_of(5);
        assert_eq!(dataset.class_counts(), vec![2, 2, 1]);
        let (features, labels) = dataset.to_arrays();
        assert_eq!(features.len(), 10);
        assert_eq!(labels, vec![0, 1, 2, 0, 1]);
    }
}
