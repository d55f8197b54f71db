//! ONNX Runtime inference engine with a session pool.

use super::session::load_session_with_config;
use crate::core::batch::{Tensor2D, Tensor4D};
use crate::core::config::OrtSessionConfig;
use crate::core::errors::{AcneError, SimpleError};
use ndarray::ArrayView2;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A pool of ONNX Runtime sessions over one model file.
///
/// Calls are spread round-robin over the pool; each session sits behind its own mutex so
/// concurrent callers only contend when they land on the same session.
pub struct OrtInfer {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    input_name: String,
    output_name: Option<String>,
    model_path: PathBuf,
    model_name: String,
}

impl std::fmt::Debug for OrtInfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtInfer")
            .field("sessions", &self.sessions.len())
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("model_path", &self.model_path)
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl OrtInfer {
    /// Opens `pool_size` sessions over the model at `model_path`.
    ///
    /// When `input_name` is `None` the first declared model input is used; when
    /// `output_name` is `None` the first declared output is used.
    pub fn from_config(
        model_path: impl AsRef<Path>,
        config: &OrtSessionConfig,
        pool_size: usize,
        input_name: Option<&str>,
        output_name: Option<&str>,
    ) -> Result<Self, AcneError> {
        let path = model_path.as_ref();
        let pool_size = pool_size.max(1);
        let mut sessions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            sessions.push(Mutex::new(load_session_with_config(path, config)?));
        }

        let input_name = match input_name {
            Some(name) => name.to_string(),
            None => {
                let first = sessions[0].lock().map_err(|_| {
                    AcneError::model_load_message(path, "session lock poisoned", None)
                })?;
                first
                    .inputs
                    .first()
                    .map(|input| input.name.clone())
                    .ok_or_else(|| {
                        AcneError::model_load_message(
                            path,
                            "model declares no inputs",
                            Some("export the backbone with a single image input"),
                        )
                    })?
            }
        };

        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown_model")
            .to_string();

        Ok(OrtInfer {
            sessions,
            next_idx: AtomicUsize::new(0),
            input_name,
            output_name: output_name.map(str::to_string),
            model_path: path.to_path_buf(),
            model_name,
        })
    }

    /// Returns the model name associated with this inference engine.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Returns the number of pooled sessions.
    pub fn pool_size(&self) -> usize {
        self.sessions.len()
    }

    fn get_output_name(&self) -> Result<String, AcneError> {
        if let Some(ref name) = self.output_name {
            return Ok(name.clone());
        }
        let session = self.sessions[0]
            .lock()
            .map_err(|_| AcneError::invalid_input("Failed to acquire session lock"))?;
        session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| {
                AcneError::invalid_input(
                    "No outputs available in session - model may be invalid or corrupted",
                )
            })
    }

    fn run_inference_with_processor<T>(
        &self,
        x: &Tensor4D,
        processor: impl FnOnce(&[i64], &[f32]) -> Result<T, AcneError>,
    ) -> Result<T, AcneError> {
        let input_shape = x.shape().to_vec();
        let output_name = self.get_output_name()?;

        let input_tensor = TensorRef::from_array_view(x.view()).map_err(|e| {
            AcneError::inference_error(
                &self.model_name,
                format!("failed to convert input tensor with shape {input_shape:?}"),
                e,
            )
        })?;
        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session_guard = self.sessions[idx].lock().map_err(|_| {
            AcneError::inference_error(
                &self.model_name,
                format!(
                    "failed to acquire session lock for session {}/{}",
                    idx,
                    self.sessions.len()
                ),
                SimpleError::new("session lock poisoned"),
            )
        })?;

        let outputs = session_guard.run(inputs).map_err(|e| {
            AcneError::inference_error(
                &self.model_name,
                format!(
                    "forward pass failed with input '{}' -> output '{}'",
                    self.input_name, output_name
                ),
                e,
            )
        })?;

        let (output_shape, output_data) = outputs[output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                AcneError::inference_error(
                    &self.model_name,
                    format!("failed to extract output tensor '{output_name}' as f32"),
                    e,
                )
            })?;

        processor(output_shape, output_data)
    }

    /// Runs the model and flattens every output dimension after the batch axis.
    ///
    /// Accepts outputs shaped `[N, D]` as well as pooled feature maps such as
    /// `[N, D, 1, 1]`.
    pub fn infer_2d(&self, x: &Tensor4D) -> Result<Tensor2D, AcneError> {
        let batch_size = x.shape()[0];
        self.run_inference_with_processor(x, |output_shape, output_data| {
            if output_shape.is_empty() || output_shape[0] as usize != batch_size {
                return Err(AcneError::tensor_operation(
                    format!(
                        "model '{}' returned shape {:?} for a batch of {}",
                        self.model_name, output_shape, batch_size
                    ),
                    SimpleError::new("unexpected output batch dimension"),
                ));
            }
            let features: usize = output_shape[1..].iter().map(|&d| d.max(0) as usize).product();
            let expected_len = batch_size * features;
            if output_data.len() != expected_len {
                return Err(AcneError::tensor_shape_error(
                    "output data size",
                    &[expected_len],
                    &[output_data.len()],
                ));
            }
            let view = ArrayView2::from_shape((batch_size, features), output_data)?;
            Ok(view.to_owned())
        })
    }
}
