//! Image preprocessing shared by the training and inference paths.
//!
//! Every image, whether it comes from a dataset file, an upload, or a camera frame, goes
//! through [`ImagePreprocessor::preprocess`]: RGB coercion, a bilinear resize to
//! 224×224, and division by 255. The dataset builder and the inference service both
//! call this type; there is no second resize path.

use crate::core::constants::{INPUT_CHANNELS, INPUT_SIZE};
use crate::core::{AcneError, Tensor3D, Tensor4D};
use crate::processors::normalization::NormalizeImage;
use crate::processors::types::ChannelOrder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use std::path::Path;

/// A normalized `224×224×3` image tensor with values in `[0, 1]`.
///
/// The tensor is owned by the call that produced it and is dropped as soon as that call
/// returns; nothing caches it.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedTensor {
    data: Tensor3D,
}

impl PreprocessedTensor {
    /// Wraps an HWC tensor, checking the fixed input shape.
    pub fn from_array(data: Tensor3D) -> Result<Self, AcneError> {
        let expected = [INPUT_SIZE as usize, INPUT_SIZE as usize, INPUT_CHANNELS];
        if data.shape() != expected {
            return Err(AcneError::tensor_shape_error(
                "preprocessed tensor",
                &expected,
                data.shape(),
            ));
        }
        Ok(Self { data })
    }

    /// Shape as `[height, width, channels]`.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Borrows the underlying HWC array.
    pub fn as_array(&self) -> &Tensor3D {
        &self.data
    }

    /// Lays the tensor out as a batch of one for an ONNX backbone.
    pub fn to_batch(&self, order: ChannelOrder) -> Tensor4D {
        NormalizeImage::to_batch(&self.data, order)
    }
}

/// Decodes, resizes and normalizes images into [`PreprocessedTensor`]s.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    target_size: u32,
    filter: FilterType,
    normalizer: NormalizeImage,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self {
            target_size: INPUT_SIZE,
            // Bilinear; its support widens with the scale factor, so downscaling averages.
            filter: FilterType::Triangle,
            normalizer: NormalizeImage::unit_range(),
        }
    }
}

impl ImagePreprocessor {
    /// Creates the standard preprocessor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes encoded image bytes (JPEG, PNG, ...).
    ///
    /// # Errors
    ///
    /// Returns `AcneError::Decode` when the bytes are not a supported image.
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage, AcneError> {
        image::load_from_memory(bytes)
            .map_err(|e| AcneError::decode(format!("{} byte buffer", bytes.len()), e))
    }

    /// Opens and decodes an image file. The format is sniffed from the content, so a
    /// mislabeled extension still decodes.
    pub fn open(path: &Path) -> Result<DynamicImage, AcneError> {
        let context = path.display().to_string();
        image::ImageReader::open(path)
            .map_err(|e| AcneError::decode(&context, e))?
            .with_guessed_format()
            .map_err(|e| AcneError::decode(&context, e))?
            .decode()
            .map_err(|e| AcneError::decode(&context, e))
    }

    /// Builds an image from a raw interleaved pixel buffer.
    ///
    /// `channels` may be 1 (gray), 2 (gray + alpha), 3 (RGB) or 4 (RGBA).
    pub fn from_raw_pixels(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<DynamicImage, AcneError> {
        let context = format!("{width}x{height}x{channels} pixel buffer");
        let expected = width as usize * height as usize * channels as usize;
        if width == 0 || height == 0 {
            return Err(AcneError::decode_message(context, "image has zero area"));
        }
        if data.len() != expected {
            return Err(AcneError::decode_message(
                context,
                format!("expected {expected} bytes, got {}", data.len()),
            ));
        }
        let image = match channels {
            1 => GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
            2 => GrayAlphaImage::from_raw(width, height, data).map(DynamicImage::ImageLumaA8),
            3 => RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
            4 => RgbaImage::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
            other => {
                return Err(AcneError::decode_message(
                    context,
                    format!("unsupported channel count {other}"),
                ));
            }
        };
        image.ok_or_else(|| AcneError::decode_message(context, "buffer rejected"))
    }

    /// Converts a decoded image into a normalized `224×224×3` tensor.
    ///
    /// Alpha is dropped and grayscale is replicated across RGB before resizing.
    pub fn preprocess(&self, image: &DynamicImage) -> Result<PreprocessedTensor, AcneError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(AcneError::decode_message(
                format!("{}x{} image", image.width(), image.height()),
                "image has zero area",
            ));
        }
        let rgb: RgbImage = image.to_rgb8();
        let resized =
            image::imageops::resize(&rgb, self.target_size, self.target_size, self.filter);
        PreprocessedTensor::from_array(self.normalizer.normalize(&resized))
    }

    /// Decodes and preprocesses encoded image bytes.
    pub fn preprocess_bytes(&self, bytes: &[u8]) -> Result<PreprocessedTensor, AcneError> {
        let image = Self::decode(bytes)?;
        self.preprocess(&image)
    }

    /// Opens and preprocesses an image file.
    pub fn preprocess_path(&self, path: &Path) -> Result<PreprocessedTensor, AcneError> {
        let image = Self::open(path)?;
        self.preprocess(&image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};
    use std::io::Cursor;

    fn assert_valid(tensor: &PreprocessedTensor) {
        assert_eq!(tensor.shape(), &[224, 224, 3]);
        assert!(
            tensor
                .as_array()
                .iter()
                .all(|&v| (0.0..=1.0).contains(&v))
        );
    }

    #[test]
    fn test_preprocess_various_sizes() {
        let preprocessor = ImagePreprocessor::new();
        for (w, h) in [(1, 1), (17, 300), (224, 224), (640, 480)] {
            let img = DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
                image::Rgb([(x % 256) as u8, (y % 256) as u8, 255])
            }));
            let tensor = preprocessor.preprocess(&img).unwrap();
            assert_valid(&tensor);
        }
    }

    #[test]
    fn test_grayscale_is_replicated() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 10, Luma([51])));
        let tensor = ImagePreprocessor::new().preprocess(&gray).unwrap();
        assert_valid(&tensor);
        let px = tensor.as_array();
        let expected = 51.0 / 255.0;
        assert!((px[[100, 100, 0]] - expected).abs() < 1e-6);
        assert!((px[[100, 100, 1]] - expected).abs() < 1e-6);
        assert!((px[[100, 100, 2]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_alpha_is_dropped() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 10])));
        let tensor = ImagePreprocessor::new().preprocess(&rgba).unwrap();
        assert_valid(&tensor);
        assert_eq!(tensor.as_array()[[0, 0, 0]], 1.0);
        assert_eq!(tensor.as_array()[[0, 0, 1]], 0.0);
    }

    #[test]
    fn test_decode_round_trip_png() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 16, image::Rgb([0, 128, 255])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let tensor = ImagePreprocessor::new().preprocess_bytes(&bytes).unwrap();
        assert_valid(&tensor);
        assert_eq!(tensor.as_array()[[5, 5, 2]], 1.0);
    }

    #[test]
    fn test_garbage_bytes_are_decode_error() {
        let err = ImagePreprocessor::new()
            .preprocess_bytes(b"definitely not an image")
            .unwrap_err();
        assert!(matches!(err, AcneError::Decode { .. }));
    }

    #[test]
    fn test_raw_pixels_validation() {
        assert!(ImagePreprocessor::from_raw_pixels(2, 2, 3, vec![0; 12]).is_ok());
        assert!(ImagePreprocessor::from_raw_pixels(2, 2, 2, vec![0; 8]).is_ok());
        let err = ImagePreprocessor::from_raw_pixels(2, 2, 3, vec![0; 11]).unwrap_err();
        assert!(matches!(err, AcneError::Decode { .. }));
        let err = ImagePreprocessor::from_raw_pixels(2, 2, 5, vec![0; 20]).unwrap_err();
        assert!(matches!(err, AcneError::Decode { .. }));
        let err = ImagePreprocessor::from_raw_pixels(0, 2, 3, vec![]).unwrap_err();
        assert!(matches!(err, AcneError::Decode { .. }));
    }

    #[test]
    fn test_gray_alpha_raw_buffer_preprocesses() {
        let img = ImagePreprocessor::from_raw_pixels(3, 3, 2, vec![200; 18]).unwrap();
        assert!(matches!(img, DynamicImage::ImageLumaA8(_)));
        let tensor = ImagePreprocessor::new().preprocess(&img).unwrap();
        assert_valid(&tensor);
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(50, 70, |x, y| {
            image::Rgb([(x * 3) as u8, (y * 2) as u8, (x + y) as u8])
        }));
        let preprocessor = ImagePreprocessor::new();
        let a = preprocessor.preprocess(&img).unwrap();
        let b = preprocessor.preprocess(&img).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_downscale_averages_fine_detail() {
        // Alternating black and white columns at twice the target width.
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(448, 448, |x, _| {
            let v = if x % 2 == 0 { 0 } else { 255 };
            image::Rgb([v, v, v])
        }));
        let tensor = ImagePreprocessor::new().preprocess(&img).unwrap();
        let value = tensor.as_array()[[10, 10, 0]];
        assert!((value - 0.5).abs() < 0.05, "got {value}");
    }

    #[test]
    fn test_from_array_rejects_wrong_shape() {
        let err = PreprocessedTensor::from_array(Tensor3D::zeros((10, 10, 3))).unwrap_err();
        assert!(matches!(err, AcneError::Processing { .. }));
    }
}
