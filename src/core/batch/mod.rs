//! Tensor aliases used at the ndarray / ONNX Runtime boundary.

/// A 2-dimensional tensor (batch, features).
pub type Tensor2D = ndarray::Array2<f32>;

/// A 3-dimensional tensor, used for a single image in HWC layout.
pub type Tensor3D = ndarray::Array3<f32>;

/// A 4-dimensional tensor, used for image batches in NCHW or NHWC layout.
pub type Tensor4D = ndarray::Array4<f32>;
