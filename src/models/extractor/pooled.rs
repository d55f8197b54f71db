//! A weight-free extractor that average-pools the image over a fixed grid.

use super::FeatureExtractor;
use crate::core::AcneError;
use crate::domain::EmbeddingVector;
use crate::processors::PreprocessedTensor;

/// Averages each channel over a `grid × grid` tiling of the 224×224 tensor.
///
/// The embedding has `3 · grid²` entries laid out cell by cell (row-major), RGB within
/// each cell. Useful for fixtures and smoke runs where no backbone is available.
#[derive(Debug, Clone)]
pub struct PooledColorExtractor {
    grid: usize,
    name: String,
}

impl PooledColorExtractor {
    /// Largest accepted grid; one cell per pixel.
    pub const MAX_GRID: usize = 224;

    pub fn new(grid: usize) -> Result<Self, AcneError> {
        if grid == 0 || grid > Self::MAX_GRID {
            return Err(AcneError::config_error(format!(
                "pooled extractor grid must be in 1..={}, got {grid}",
                Self::MAX_GRID
            )));
        }
        Ok(Self {
            grid,
            name: format!("pooled-color-{grid}x{grid}"),
        })
    }
}

impl FeatureExtractor for PooledColorExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn embedding_dim(&self) -> usize {
        3 * self.grid * self.grid
    }

    fn embed(&self, tensor: &PreprocessedTensor) -> Result<EmbeddingVector, AcneError> {
        let data = tensor.as_array();
        let (height, width, channels) = data.dim();
        let mut values = Vec::with_capacity(self.embedding_dim());

        for cy in 0..self.grid {
            let (y0, y1) = (cy * height / self.grid, (cy + 1) * height / self.grid);
            for cx in 0..self.grid {
                let (x0, x1) = (cx * width / self.grid, (cx + 1) * width / self.grid);
                let cell = data.slice(ndarray::s![y0..y1, x0..x1, ..]);
                let count = ((y1 - y0) * (x1 - x0)) as f32;
                for c in 0..channels {
                    values.push(cell.index_axis(ndarray::Axis(2), c).sum() / count);
                }
            }
        }
        EmbeddingVector::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Tensor3D;

    fn solid(r: f32, g: f32, b: f32) -> PreprocessedTensor {
        let data = Tensor3D::from_shape_fn((224, 224, 3), |(_, _, c)| [r, g, b][c]);
        PreprocessedTensor::from_array(data).unwrap()
    }

    #[test]
    fn test_solid_color_embeds_to_its_color() {
        let extractor = PooledColorExtractor::new(2).unwrap();
        assert_eq!(extractor.embedding_dim(), 12);
        let embedding = extractor.embed(&solid(1.0, 0.5, 0.0)).unwrap();
        assert_eq!(embedding.dim(), 12);
        for cell in embedding.as_slice().chunks(3) {
            assert!((cell[0] - 1.0).abs() < 1e-6);
            assert!((cell[1] - 0.5).abs() < 1e-6);
            assert!(cell[2].abs() < 1e-6);
        }
    }

    #[test]
    fn test_cells_follow_layout() {
        // Left half white, right half black.
        let data =
            Tensor3D::from_shape_fn((224, 224, 3), |(_, x, _)| if x < 112 { 1.0 } else { 0.0 });
        let tensor = PreprocessedTensor::from_array(data).unwrap();
        let embedding = PooledColorExtractor::new(2).unwrap().embed(&tensor).unwrap();
        let v = embedding.as_slice();
        assert_eq!(&v[0..3], &[1.0, 1.0, 1.0]);
        assert_eq!(&v[3..6], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_uneven_grid_is_deterministic() {
        let extractor = PooledColorExtractor::new(5).unwrap();
        let tensor = solid(0.2, 0.4, 0.6);
        let a = extractor.embed(&tensor).unwrap();
        let b = extractor.embed(&tensor).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dim(), 75);
    }

    #[test]
    fn test_grid_bounds() {
        assert!(PooledColorExtractor::new(0).is_err());
        assert!(PooledColorExtractor::new(225).is_err());
        assert!(PooledColorExtractor::new(224).is_ok());
    }
}
