//! Fixed-length image descriptors produced by a feature extractor.

use crate::core::AcneError;
use crate::core::errors::SimpleError;

/// An embedding vector. Always non-empty and finite.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Wraps raw extractor output.
    ///
    /// # Errors
    ///
    /// Returns an embedding error when the vector is empty or contains NaN/inf.
    pub fn new(values: Vec<f32>) -> Result<Self, AcneError> {
        if values.is_empty() {
            return Err(AcneError::embedding(
                "extractor produced an empty embedding",
                SimpleError::new("empty embedding"),
            ));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(AcneError::embedding(
                format!("embedding value at index {pos} is not finite"),
                SimpleError::new("non-finite embedding"),
            ));
        }
        Ok(Self(values))
    }

    /// Embedding dimension.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Borrows the values.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_non_finite() {
        assert!(EmbeddingVector::new(vec![]).is_err());
        assert!(EmbeddingVector::new(vec![0.1, f32::NAN]).is_err());
        assert!(EmbeddingVector::new(vec![0.1, f32::INFINITY]).is_err());
        let embedding = EmbeddingVector::new(vec![0.1, 0.2]).unwrap();
        assert_eq!(embedding.dim(), 2);
    }
}
