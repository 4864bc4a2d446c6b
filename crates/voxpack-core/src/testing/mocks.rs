//! Mock implementations for testing.

use crate::language::ModuleLanguage;
use crate::runtime_adapter::{
    BackendKind, ExecutionContext, LoadedModel, ModelRuntime, RuntimeError, RuntimeResult,
};
use crate::streaming::{
    DataPacket, PacketMetadata, SessionError, SessionResult, SynthRequest, Synthesizer,
};
use ndarray::ArrayD;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A model runtime that reads real files but never runs a model.
///
/// Counts loads and context creations so tests can assert that shared
/// content hashes are bound once.
#[derive(Debug, Default)]
pub struct MockRuntime {
    outputs: HashMap<String, ArrayD<f32>>,
    fail_contexts: bool,
    loads: AtomicUsize,
    contexts: AtomicUsize,
    loaded_paths: Mutex<Vec<PathBuf>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every context returns `tensor` under `name` from `run`.
    pub fn with_output(mut self, name: impl Into<String>, tensor: ArrayD<f32>) -> Self {
        self.outputs.insert(name.into(), tensor);
        self
    }

    /// Makes every `create_context` call fail.
    pub fn failing_contexts(mut self) -> Self {
        self.fail_contexts = true;
        self
    }

    /// Number of `load_model` calls.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn context_count(&self) -> usize {
        self.contexts.load(Ordering::SeqCst)
    }

    pub fn loaded_paths(&self) -> Vec<PathBuf> {
        self.loaded_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ModelRuntime for MockRuntime {
    fn name(&self) -> &str {
        "MockRuntime"
    }

    fn load_model(&self, path: &Path) -> RuntimeResult<LoadedModel> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.loaded_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());
        LoadedModel::read(path)
    }

    fn create_context(
        &self,
        model: &LoadedModel,
        backend: BackendKind,
    ) -> RuntimeResult<Box<dyn ExecutionContext>> {
        if self.fail_contexts {
            return Err(RuntimeError::ContextFailed(format!(
                "mock refused {}",
                model.path().display()
            )));
        }
        self.contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockContext {
            backend,
            outputs: self.outputs.clone(),
            runs: 0,
        }))
    }
}

/// Execution context created by [`MockRuntime`].
#[derive(Debug)]
pub struct MockContext {
    backend: BackendKind,
    outputs: HashMap<String, ArrayD<f32>>,
    runs: usize,
}

impl MockContext {
    pub fn runs(&self) -> usize {
        self.runs
    }
}

impl ExecutionContext for MockContext {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn run(
        &mut self,
        _inputs: HashMap<String, ArrayD<f32>>,
    ) -> RuntimeResult<HashMap<String, ArrayD<f32>>> {
        self.runs += 1;
        Ok(self.outputs.clone())
    }
}

/// A synthesizer that emits silent packets of fixed sizes.
///
/// Each run yields one packet per entry of `chunks`; the last one is final.
/// Records the session ids it starts, in order.
#[derive(Debug)]
pub struct ScriptedSynthesizer {
    chunks: Vec<usize>,
    character_name: String,
    module_type: String,
    fail_on: Option<String>,
    started: Vec<String>,
    languages: Vec<Option<ModuleLanguage>>,
    released: Arc<AtomicBool>,
}

impl ScriptedSynthesizer {
    pub fn new(chunks: Vec<usize>) -> Self {
        Self {
            chunks,
            character_name: "Jenny".to_string(),
            module_type: "high".to_string(),
            fail_on: None,
            started: Vec::new(),
            languages: Vec::new(),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_character(
        mut self,
        character_name: impl Into<String>,
        module_type: impl Into<String>,
    ) -> Self {
        self.character_name = character_name.into();
        self.module_type = module_type.into();
        self
    }

    /// Runs whose input equals `input` fail on their first step.
    pub fn fail_on(&mut self, input: impl Into<String>) {
        self.fail_on = Some(input.into());
    }

    /// Session ids of every started run, in start order.
    pub fn started(&self) -> Vec<String> {
        self.started.clone()
    }

    /// Resolved language of every started run, in start order.
    pub fn languages(&self) -> Vec<Option<ModuleLanguage>> {
        self.languages.clone()
    }

    /// Set once `release` has been called.
    pub fn release_flag(&self) -> Arc<AtomicBool> {
        self.released.clone()
    }
}

impl Synthesizer for ScriptedSynthesizer {
    type Sample = f32;
    type Run = std::vec::IntoIter<SessionResult<DataPacket<f32>>>;

    fn start(&mut self, request: &SynthRequest) -> SessionResult<Self::Run> {
        self.started.push(request.session_id.clone());
        self.languages.push(request.language.clone());

        if self.fail_on.as_deref() == Some(request.input.as_str()) {
            let failure = Err(SessionError::Synthesis {
                session_id: request.session_id.clone(),
                message: "scripted failure".to_string(),
            });
            return Ok(vec![failure].into_iter());
        }

        let metadata = PacketMetadata::new(request.session_id.clone())
            .with_character(self.character_name.clone())
            .with_module_type(self.module_type.clone())
            .with_requested_indices([0]);
        let chunks = if self.chunks.is_empty() { vec![0] } else { self.chunks.clone() };
        let last = chunks.len() - 1;
        let packets = chunks
            .into_iter()
            .enumerate()
            .map(|(i, samples)| {
                let payload = vec![0.0; samples];
                Ok(if i == last {
                    DataPacket::final_packet(payload, metadata.clone())
                } else {
                    DataPacket::new(payload, metadata.clone())
                })
            })
            .collect::<Vec<_>>();
        Ok(packets.into_iter())
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
