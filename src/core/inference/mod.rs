//! Structures and helpers for ONNX Runtime inference.

pub mod ort_infer;
pub mod session;

pub use ort_infer::OrtInfer;
pub use session::load_session_with_config;
