//! Pixel normalization.
//!
//! Maps 8-bit RGB pixels into `f32` values by dividing by a fixed scale. No mean or
//! variance centering is applied.

use crate::core::constants::{INPUT_CHANNELS, PIXEL_SCALE};
use crate::core::{Tensor3D, Tensor4D};
use crate::processors::types::ChannelOrder;
use image::RgbImage;
use ndarray::{Array3, Axis};

/// Divides every channel value by `scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeImage {
    /// Divisor applied to each channel value.
    pub scale: f32,
}

impl Default for NormalizeImage {
    fn default() -> Self {
        Self::unit_range()
    }
}

impl NormalizeImage {
    /// Normalizer mapping `0..=255` onto `[0, 1]`.
    pub fn unit_range() -> Self {
        Self { scale: PIXEL_SCALE }
    }

    /// Normalizes an RGB image into an `(height, width, 3)` tensor.
    pub fn normalize(&self, img: &RgbImage) -> Tensor3D {
        let (width, height) = img.dimensions();
        Array3::from_shape_fn(
            (height as usize, width as usize, INPUT_CHANNELS),
            |(y, x, c)| img.get_pixel(x as u32, y as u32)[c] as f32 / self.scale,
        )
    }

    /// Lays a single HWC tensor out as a batch of one in the requested channel order.
    pub fn to_batch(tensor: &Tensor3D, order: ChannelOrder) -> Tensor4D {
        let batched = tensor.view().insert_axis(Axis(0));
        match order {
            ChannelOrder::HWC => batched.to_owned(),
            ChannelOrder::CHW => batched
                .permuted_axes([0, 3, 1, 2])
                .as_standard_layout()
                .into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_unit_range_bounds() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([255, 255, 255]));

        let tensor = NormalizeImage::unit_range().normalize(&img);
        assert_eq!(tensor.shape(), &[1, 2, 3]);
        assert_eq!(tensor[[0, 0, 0]], 0.0);
        assert_eq!(tensor[[0, 1, 2]], 1.0);
    }

    #[test]
    fn test_to_batch_channel_orders() {
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(1, 0, Rgb([10, 20, 30]));
        let tensor = NormalizeImage::unit_range().normalize(&img);

        let hwc = NormalizeImage::to_batch(&tensor, ChannelOrder::HWC);
        assert_eq!(hwc.shape(), &[1, 2, 2, 3]);
        assert_eq!(hwc[[0, 0, 1, 1]], 20.0 / 255.0);

        let chw = NormalizeImage::to_batch(&tensor, ChannelOrder::CHW);
        assert_eq!(chw.shape(), &[1, 3, 2, 2]);
        assert_eq!(chw[[0, 1, 0, 1]], 20.0 / 255.0);
        assert!(chw.is_standard_layout());
    }
}
