//! Runtime adapter - the boundary to the model execution engine.
//!
//! The engine itself is an opaque capability: it can load model bytes from a
//! path and build an execution context for a model on a chosen backend. This
//! module defines that capability ([`ModelRuntime`], [`ExecutionContext`]),
//! the bound pair produced from it ([`ModelRuntimeBinding`]), and the
//! content-addressed [`BindingCache`] that guarantees each distinct model
//! file is loaded once.
//!
//! With the `onnx` feature, [`onnx::OnnxRuntime`] implements the capability
//! on top of ONNX Runtime.

use ndarray::ArrayD;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

mod binding;
mod execution_provider;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use binding::{BindingCache, BindingLoader, PendingBinding};
pub use execution_provider::BackendKind;

/// Error type for runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("Failed to load model: {0}")]
    LoadFailed(String),

    #[error("Failed to create execution context: {0}")]
    ContextFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Model bytes read from disk, shared between a binding and its context.
#[derive(Clone)]
pub struct LoadedModel {
    path: PathBuf,
    bytes: Arc<[u8]>,
}

impl LoadedModel {
    pub fn new(path: impl Into<PathBuf>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads a model file into memory.
    pub fn read(path: &Path) -> RuntimeResult<Self> {
        if !path.exists() {
            return Err(RuntimeError::ModelNotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        Ok(Self::new(path, bytes))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("path", &self.path)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A model instantiated on a backend, ready to run.
pub trait ExecutionContext: Send {
    /// Backend the context was created on.
    fn backend(&self) -> BackendKind;

    /// Run inference with named f32 tensors.
    fn run(
        &mut self,
        inputs: HashMap<String, ArrayD<f32>>,
    ) -> RuntimeResult<HashMap<String, ArrayD<f32>>>;
}

/// The model execution capability supplied by the host.
pub trait ModelRuntime: Send + Sync {
    /// Name of the runtime (e.g. "onnxruntime").
    fn name(&self) -> &str;

    /// Load model bytes from `path`.
    fn load_model(&self, path: &Path) -> RuntimeResult<LoadedModel> {
        LoadedModel::read(path)
    }

    /// Build an execution context for `model` on `backend`.
    fn create_context(
        &self,
        model: &LoadedModel,
        backend: BackendKind,
    ) -> RuntimeResult<Box<dyn ExecutionContext>>;
}

/// A loaded model and its execution context, keyed by content hash.
///
/// Both halves are released together when the binding is dropped.
pub struct ModelRuntimeBinding {
    hash: String,
    model: LoadedModel,
    context: Box<dyn ExecutionContext>,
}

impl ModelRuntimeBinding {
    pub fn new(
        hash: impl Into<String>,
        model: LoadedModel,
        context: Box<dyn ExecutionContext>,
    ) -> Self {
        Self {
            hash: hash.into(),
            model,
            context,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn model(&self) -> &LoadedModel {
        &self.model
    }

    pub fn backend(&self) -> BackendKind {
        self.context.backend()
    }

    /// Runs the bound model.
    pub fn run(
        &mut self,
        inputs: HashMap<String, ArrayD<f32>>,
    ) -> RuntimeResult<HashMap<String, ArrayD<f32>>> {
        self.context.run(inputs)
    }
}

impl fmt::Debug for ModelRuntimeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRuntimeBinding")
            .field("hash", &self.hash)
            .field("model", &self.model)
            .field("backend", &self.backend())
            .finish()
    }
}
