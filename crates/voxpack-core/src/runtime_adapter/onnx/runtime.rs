use crate::runtime_adapter::{
    BackendKind, ExecutionContext, LoadedModel, ModelRuntime, RuntimeError, RuntimeResult,
};
use ndarray::{ArrayD, IxDyn};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputValue, SessionInputs};
use ort::value::Value;
use std::borrow::Cow;
use std::collections::HashMap;

/// Model runtime backed by ONNX Runtime.
#[derive(Debug, Default)]
pub struct OnnxRuntime;

impl OnnxRuntime {
    pub fn new() -> Self {
        Self
    }

    fn configure_backend(
        builder: SessionBuilder,
        backend: BackendKind,
    ) -> RuntimeResult<SessionBuilder> {
        match backend {
            BackendKind::Cpu => Ok(builder),
            BackendKind::Gpu => {
                use ort::ep;

                log::debug!("Configuring CUDA execution provider");
                builder
                    .with_execution_providers([ep::CUDA::default().build()])
                    .map_err(|e| {
                        RuntimeError::ContextFailed(format!(
                            "Failed to configure CUDA execution provider: {}",
                            e
                        ))
                    })
            }
        }
    }
}

impl ModelRuntime for OnnxRuntime {
    fn name(&self) -> &str {
        "onnxruntime"
    }

    fn create_context(
        &self,
        model: &LoadedModel,
        backend: BackendKind,
    ) -> RuntimeResult<Box<dyn ExecutionContext>> {
        // Environment is a process singleton; repeated commits are no-ops
        let _ = ort::init().commit();

        let builder = Session::builder()
            .map_err(|e| {
                RuntimeError::ContextFailed(format!("Failed to create session builder: {}", e))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                RuntimeError::ContextFailed(format!("Failed to set optimization level: {}", e))
            })?;
        let session = Self::configure_backend(builder, backend)?
            .commit_from_memory(model.bytes())
            .map_err(|e| {
                RuntimeError::LoadFailed(format!(
                    "Failed to load ONNX model {}: {}",
                    model.path().display(),
                    e
                ))
            })?;

        let output_names = session
            .outputs()
            .iter()
            .map(|output| output.name().to_string())
            .collect();

        log::info!(
            "Created ONNX session on {} for model: {}",
            backend,
            model.path().display()
        );

        Ok(Box::new(OnnxContext {
            session,
            output_names,
            backend,
        }))
    }
}

/// A committed ONNX session.
pub struct OnnxContext {
    session: Session,
    output_names: Vec<String>,
    backend: BackendKind,
}

impl OnnxContext {
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }
}

impl ExecutionContext for OnnxContext {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn run(
        &mut self,
        inputs: HashMap<String, ArrayD<f32>>,
    ) -> RuntimeResult<HashMap<String, ArrayD<f32>>> {
        let ort_inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)> = inputs
            .into_iter()
            .map(|(name, array)| {
                let value = Value::from_array(array).map_err(|e| {
                    RuntimeError::InferenceFailed(format!("Failed to convert tensor: {}", e))
                })?;
                Ok((Cow::Owned(name), value.into()))
            })
            .collect::<RuntimeResult<_>>()?;

        let outputs = self
            .session
            .run(SessionInputs::from(ort_inputs))
            .map_err(|e| {
                RuntimeError::InferenceFailed(format!("ONNX Runtime inference failed: {}", e))
            })?;

        let mut result = HashMap::new();
        for name in &self.output_names {
            let value = &outputs[name.as_str()];

            // f32 first, then i64 widened to f32
            let array = if let Ok(view) = value.try_extract_array::<f32>() {
                let dims: Vec<usize> = view.shape().to_vec();
                let data: Vec<f32> = view.iter().copied().collect();
                ArrayD::from_shape_vec(IxDyn(&dims), data)
            } else if let Ok(view) = value.try_extract_array::<i64>() {
                let dims: Vec<usize> = view.shape().to_vec();
                let data: Vec<f32> = view.iter().map(|&x| x as f32).collect();
                ArrayD::from_shape_vec(IxDyn(&dims), data)
            } else {
                return Err(RuntimeError::InferenceFailed(format!(
                    "Failed to extract output '{}': unsupported type (expected f32 or i64)",
                    name
                )));
            };
            let array = array.map_err(|e| {
                RuntimeError::InferenceFailed(format!("Failed to convert output '{}': {}", name, e))
            })?;
            result.insert(name.clone(), array);
        }

        Ok(result)
    }
}
