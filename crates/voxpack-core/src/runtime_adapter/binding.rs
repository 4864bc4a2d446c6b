//! Content-addressed binding cache and the resumable loader that fills it.

use super::{BackendKind, ModelRuntime, ModelRuntimeBinding, RuntimeResult};
use crate::event_bus::{EventBus, PackEvent};
use crate::module::Module;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

/// One model file waiting to be bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBinding {
    pub module_id: String,
    /// Internal name of the file inside its module.
    pub name: String,
    pub hash: String,
    pub path: PathBuf,
    pub backend: BackendKind,
}

/// Lazy, finite sequence of binding steps.
///
/// Each call to `next` loads exactly one model and builds its execution
/// context, so a host loop can interleave other work between bindings. The
/// sequence cannot be restarted; after an error it is exhausted.
pub struct BindingLoader {
    runtime: Arc<dyn ModelRuntime>,
    pending: VecDeque<PendingBinding>,
}

impl BindingLoader {
    pub fn new(runtime: Arc<dyn ModelRuntime>, plan: Vec<PendingBinding>) -> Self {
        Self {
            runtime,
            pending: plan.into(),
        }
    }

    /// Bindings not yet produced.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// The next file that will be bound.
    pub fn peek(&self) -> Option<&PendingBinding> {
        self.pending.front()
    }

    fn bind(&self, item: &PendingBinding) -> RuntimeResult<ModelRuntimeBinding> {
        let model = self.runtime.load_model(&item.path)?;
        let context = self.runtime.create_context(&model, item.backend)?;
        log::debug!(
            "Bound {} ({}) from module {} on {}",
            item.name,
            item.hash,
            item.module_id,
            item.backend
        );
        Ok(ModelRuntimeBinding::new(item.hash.clone(), model, context))
    }
}

impl Iterator for BindingLoader {
    type Item = RuntimeResult<ModelRuntimeBinding>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.pending.pop_front()?;
        let result = self.bind(&item);
        if result.is_err() {
            self.pending.clear();
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.pending.len()))
    }
}

/// Process-wide map from content hash to runtime binding.
///
/// Tracks which modules use each hash so that unloading one module only
/// releases bindings nobody else needs.
pub struct BindingCache {
    runtime: Arc<dyn ModelRuntime>,
    bindings: HashMap<String, ModelRuntimeBinding>,
    users: HashMap<String, BTreeSet<String>>,
    events: EventBus,
}

impl BindingCache {
    pub fn new(runtime: Arc<dyn ModelRuntime>, events: EventBus) -> Self {
        Self {
            runtime,
            bindings: HashMap::new(),
            users: HashMap::new(),
            events,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ModelRuntime> {
        &self.runtime
    }

    /// Hashes that already have a binding.
    pub fn loaded_hashes(&self) -> HashSet<String> {
        self.bindings.keys().cloned().collect()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.bindings.contains_key(hash)
    }

    pub fn get(&self, hash: &str) -> Option<&ModelRuntimeBinding> {
        self.bindings.get(hash)
    }

    pub fn get_mut(&mut self, hash: &str) -> Option<&mut ModelRuntimeBinding> {
        self.bindings.get_mut(hash)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Module ids currently using `hash`.
    pub fn users_of(&self, hash: &str) -> Vec<String> {
        self.users
            .get(hash)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Records `module` as a user of all its hashes and returns a loader for
    /// the ones not bound yet.
    ///
    /// Feed every binding the loader yields to [`insert`](Self::insert).
    pub fn begin_module(&mut self, module: &Module, preferred: BackendKind) -> BindingLoader {
        for hash in module.all_file_hashes() {
            self.users
                .entry(hash)
                .or_default()
                .insert(module.module_id().to_string());
        }
        module.binding_loader(&self.loaded_hashes(), preferred, self.runtime.clone())
    }

    /// Stores a binding unless its hash is already bound.
    ///
    /// Returns `false` (and drops `binding`) when the hash was present.
    pub fn insert(&mut self, binding: ModelRuntimeBinding) -> bool {
        if self.bindings.contains_key(binding.hash()) {
            log::debug!("Binding {} already present, dropping duplicate", binding.hash());
            return false;
        }
        self.bindings.insert(binding.hash().to_string(), binding);
        true
    }

    /// Binds every model of `module` not already bound, in one step.
    ///
    /// Returns the hashes that were newly bound. On error the module is
    /// released again, so bindings created by this call do not linger.
    pub fn ensure_module(
        &mut self,
        module: &Module,
        preferred: BackendKind,
    ) -> RuntimeResult<Vec<String>> {
        if module.is_included_in(&self.loaded_hashes()) {
            self.begin_module(module, preferred);
            log::debug!("Module {} already fully bound", module.module_id());
            return Ok(Vec::new());
        }

        let loader = self.begin_module(module, preferred);
        let mut created = Vec::new();
        for step in loader {
            let binding = match step {
                Ok(binding) => binding,
                Err(err) => {
                    log::error!("Binding module {} failed: {}", module.module_id(), err);
                    self.release_module(module.module_id());
                    return Err(err);
                }
            };
            let hash = binding.hash().to_string();
            if self.insert(binding) {
                created.push(hash);
            }
        }
        self.announce_created(module.module_id(), &created);
        Ok(created)
    }

    pub(crate) fn announce_created(&self, module_id: &str, hashes: &[String]) {
        if hashes.is_empty() {
            return;
        }
        log::info!("Created {} bindings for module {}", hashes.len(), module_id);
        self.events.publish(PackEvent::BindingsCreated {
            module_id: module_id.to_string(),
            hashes: hashes.to_vec(),
        });
    }

    /// Drops `module_id` as a user and releases bindings left without users.
    ///
    /// Returns the released hashes.
    pub fn release_module(&mut self, module_id: &str) -> Vec<String> {
        let mut released = Vec::new();
        self.users.retain(|hash, users| {
            users.remove(module_id);
            if users.is_empty() {
                released.push(hash.clone());
                false
            } else {
                true
            }
        });
        released.retain(|hash| self.bindings.remove(hash).is_some());
        released.sort();

        if !released.is_empty() {
            log::info!("Released {} bindings of module {}", released.len(), module_id);
            self.events.publish(PackEvent::BindingsReleased {
                module_id: module_id.to_string(),
                hashes: released.clone(),
            });
        }
        released
    }

    /// Releases every binding.
    pub fn release_all(&mut self) {
        let count = self.bindings.len();
        self.bindings.clear();
        self.users.clear();
        if count > 0 {
            log::info!("Released all {} bindings", count);
        }
    }
}

impl std::fmt::Debug for BindingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingCache")
            .field("runtime", &self.runtime.name())
            .field("bindings", &self.bindings.len())
            .finish()
    }
}
