//! Helpers for working directly with ONNX Runtime sessions.

use crate::core::config::{OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig};
use crate::core::errors::AcneError;
use ort::execution_providers::ExecutionProviderDispatch;
use ort::logging::LogLevel;
use ort::session::{Session, builder::SessionBuilder};
use std::path::Path;

/// Opens a single session with the given runtime configuration.
pub fn load_session_with_config(
    model_path: impl AsRef<Path>,
    config: &OrtSessionConfig,
) -> Result<Session, AcneError> {
    let path = model_path.as_ref();
    let builder = Session::builder()?.with_log_level(LogLevel::Error)?;
    let builder = apply_ort_config(builder, config)?;
    builder.commit_from_file(path).map_err(|e| {
        AcneError::model_load_error(
            path,
            "failed to create ONNX session",
            Some("verify the model file exists and matches the selected execution providers"),
            Some(e),
        )
    })
}

fn apply_ort_config(
    mut builder: SessionBuilder,
    cfg: &OrtSessionConfig,
) -> Result<SessionBuilder, ort::Error> {
    if let Some(intra) = cfg.intra_threads {
        builder = builder.with_intra_threads(intra)?;
    }
    if let Some(inter) = cfg.inter_threads {
        builder = builder.with_inter_threads(inter)?;
    }
    if let Some(par) = cfg.parallel_execution {
        builder = builder.with_parallel_execution(par)?;
    }
    if let Some(level) = cfg.optimization_level {
        use ort::session::builder::GraphOptimizationLevel as GOL;
        let mapped = match level {
            OrtGraphOptimizationLevel::DisableAll => GOL::Disable,
            OrtGraphOptimizationLevel::Level1 => GOL::Level1,
            OrtGraphOptimizationLevel::Level2 => GOL::Level2,
            OrtGraphOptimizationLevel::Level3 => GOL::Level3,
        };
        builder = builder.with_optimization_level(mapped)?;
    }
    if let Some(eps) = &cfg.execution_providers {
        let providers = build_execution_providers(eps)?;
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers)?;
        }
    }
    Ok(builder)
}

fn build_execution_providers(
    eps: &[OrtExecutionProvider],
) -> Result<Vec<ExecutionProviderDispatch>, ort::Error> {
    use OrtExecutionProvider as EP;
    let mut providers = Vec::new();

    for ep in eps {
        match ep {
            EP::CPU => {
                providers.push(ort::execution_providers::CPUExecutionProvider::default().build());
            }
            #[cfg(feature = "cuda")]
            EP::CUDA { device_id } => {
                let mut cuda = ort::execution_providers::CUDAExecutionProvider::default();
                if let Some(id) = device_id {
                    cuda = cuda.with_device_id(*id);
                }
                providers.push(cuda.build());
            }
            #[cfg(feature = "tensorrt")]
            EP::TensorRT {
                device_id,
                fp16_enable,
            } => {
                let mut trt = ort::execution_providers::TensorRTExecutionProvider::default();
                if let Some(id) = device_id {
                    trt = trt.with_device_id(*id);
                }
                if let Some(fp16) = fp16_enable {
                    trt = trt.with_fp16(*fp16);
                }
                providers.push(trt.build());
            }
            #[cfg(feature = "directml")]
            EP::DirectML { device_id } => {
                let mut dml = ort::execution_providers::DirectMLExecutionProvider::default();
                if let Some(id) = device_id {
                    dml = dml.with_device_id(*id);
                }
                providers.push(dml.build());
            }
            #[cfg(feature = "coreml")]
            EP::CoreML { subgraphs } => {
                let mut coreml = ort::execution_providers::CoreMLExecutionProvider::default();
                if let Some(sub) = subgraphs {
                    coreml = coreml.with_subgraphs(*sub);
                }
                providers.push(coreml.build());
            }
            #[cfg(feature = "openvino")]
            EP::OpenVINO { device_type } => {
                let mut openvino = ort::execution_providers::OpenVINOExecutionProvider::default();
                if let Some(device) = device_type {
                    openvino = openvino.with_device_type(device.clone());
                }
                providers.push(openvino.build());
            }
            #[cfg(feature = "webgpu")]
            EP::WebGPU => {
                providers
                    .push(ort::execution_providers::WebGPUExecutionProvider::default().build());
            }
            #[cfg(not(feature = "cuda"))]
            EP::CUDA { .. } => {
                return Err(ort::Error::new(
                    "CUDA execution provider requested but cuda feature is not enabled",
                ));
            }
            #[cfg(not(feature = "tensorrt"))]
            EP::TensorRT { .. } => {
                return Err(ort::Error::new(
                    "TensorRT execution provider requested but tensorrt feature is not enabled",
                ));
            }
            #[cfg(not(feature = "directml"))]
            EP::DirectML { .. } => {
                return Err(ort::Error::new(
                    "DirectML execution provider requested but directml feature is not enabled",
                ));
            }
            #[cfg(not(feature = "coreml"))]
            EP::CoreML { .. } => {
                return Err(ort::Error::new(
                    "CoreML execution provider requested but coreml feature is not enabled",
                ));
            }
            #[cfg(not(feature = "openvino"))]
            EP::OpenVINO { .. } => {
                return Err(ort::Error::new(
                    "OpenVINO execution provider requested but openvino feature is not enabled",
                ));
            }
            #[cfg(not(feature = "webgpu"))]
            EP::WebGPU => {
                return Err(ort::Error::new(
                    "WebGPU execution provider requested but webgpu feature is not enabled",
                ));
            }
        }
    }

    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_session_missing_file_is_model_load_error() {
        let err = load_session_with_config("does/not/exist.onnx", &OrtSessionConfig::default())
            .unwrap_err();
        assert!(matches!(err, AcneError::ModelLoad { .. } | AcneError::Session(_)));
    }
}
