use super::InferenceBackend;
use ndarray::ArrayD;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use preprocess::TensorLayout;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
}

/// ONNX Runtime session for image feature extractors exported with an NCHW input.
pub struct OrtBackend {
    name: String,
    // `Session::run` needs `&mut`; the lock lets callers share the backend.
    session: Mutex<Session>,
}

impl OrtBackend {
    pub fn from_memory(name: &str, model: &[u8]) -> anyhow::Result<Self> {
        let provider = if cfg!(feature = "cuda") {
            ExecutionProvider::Cuda
        } else {
            ExecutionProvider::Cpu
        };
        Self::from_memory_with_provider(name, model, provider)
    }

    pub fn from_memory_with_provider(
        name: &str,
        model: &[u8],
        provider: ExecutionProvider,
    ) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        match provider {
            #[cfg(feature = "cuda")]
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                ])?;
            }
            #[cfg(not(feature = "cuda"))]
            ExecutionProvider::Cuda => {
                anyhow::bail!("CUDA execution provider requested without the cuda feature");
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder.commit_from_memory(model)?;

        tracing::info!(model = name, bytes = model.len(), "ONNX model loaded");
        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&self, input: &ArrayD<f32>) -> anyhow::Result<ArrayD<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("ONNX session lock poisoned"))?;

        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let features = outputs[0].try_extract_array::<f32>()?;
        Ok(features.into_owned())
    }

    fn layout(&self) -> TensorLayout {
        TensorLayout::Nchw
    }
}
