//! Image processing: decoding, RGB coercion, resizing and normalization.
//!
//! * `normalization` - pixel scaling into `[0, 1]` and batch layout
//! * `preprocess` - the [`ImagePreprocessor`] used by training and inference
//! * `types` - channel ordering for backbone inputs

pub mod normalization;
pub mod preprocess;
pub mod types;

pub use normalization::NormalizeImage;
pub use preprocess::{ImagePreprocessor, PreprocessedTensor};
pub use types::ChannelOrder;
