//! PackContext - explicit owner of the registry and the process-wide caches.
//!
//! Loading an actor walks the whole chain: manifest entry → [`ActorModule`]
//! → the language modules it needs → deduplicated runtime bindings → lookup
//! table registration. [`PackContext::begin_load_actor`] exposes that chain
//! as an [`ActorLoad`] iterator that yields after every binding and every
//! lookup-table batch, so a host loop can spread the work across frames.
//!
//! ```rust,ignore
//! let mut context = PackContext::new(EngineConfig::default(), runtime)?;
//! let mut load = context.begin_load_actor("Jenny", "high")?;
//! while let Some(step) = load.next() {
//!     step?;
//!     // yield to the host loop
//! }
//! ```

use crate::config::EngineConfig;
use crate::error::{VoxpackError, VoxpackResult};
use crate::event_bus::EventBus;
use crate::language::{best_match, ModuleLanguage};
use crate::lookup::{LookupCache, StaticTableLoader};
use crate::module::{ActorModule, LanguageModule, Module};
use crate::registry::{PackRegistry, RegistryError};
use crate::runtime_adapter::{BackendKind, BindingCache, BindingLoader, ModelRuntime};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Identifies a loaded actor: name plus lower-cased quality tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorKey {
    pub actor: String,
    pub quality: String,
}

impl ActorKey {
    pub fn new(actor: impl Into<String>, quality: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            quality: quality.into().to_lowercase(),
        }
    }
}

impl fmt::Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.actor, self.quality)
    }
}

/// An actor whose bindings and lookup tables are ready.
#[derive(Debug, Clone)]
pub struct LoadedActor {
    module: ActorModule,
    languages: Vec<ModuleLanguage>,
    language_modules: Vec<String>,
}

impl LoadedActor {
    pub fn module(&self) -> &ActorModule {
        &self.module
    }

    /// Installed languages the actor can speak.
    pub fn languages(&self) -> &[ModuleLanguage] {
        &self.languages
    }

    /// Ids of the language modules loaded for this actor.
    pub fn language_modules(&self) -> &[String] {
        &self.language_modules
    }
}

/// One unit of work completed by an [`ActorLoad`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStep {
    /// A model file was bound (or found bound by another module).
    Bound { module_id: String, hash: String },
    /// A batch of lookup-table lines was read.
    LookupBatch { hash: String, entries: usize },
    /// The actor is loaded.
    Completed { key: ActorKey },
}

/// Owner of the registry, binding cache and lookup cache.
pub struct PackContext {
    config: EngineConfig,
    events: EventBus,
    registry: PackRegistry,
    bindings: BindingCache,
    lookups: LookupCache,
    actors: BTreeMap<ActorKey, LoadedActor>,
    language_modules: HashMap<String, LanguageModule>,
    language_users: HashMap<String, BTreeSet<ActorKey>>,
}

impl PackContext {
    /// Opens the manifest named by `config`.
    pub fn new(config: EngineConfig, runtime: Arc<dyn ModelRuntime>) -> VoxpackResult<Self> {
        config.validate()?;
        let events = EventBus::new();
        let registry = PackRegistry::open(&config.manifest_path, events.clone())?;
        Ok(Self::with_registry(config, registry, runtime))
    }

    /// Uses an already built registry; its event bus becomes the context's.
    pub fn with_registry(
        config: EngineConfig,
        registry: PackRegistry,
        runtime: Arc<dyn ModelRuntime>,
    ) -> Self {
        let events = registry.events().clone();
        Self {
            bindings: BindingCache::new(runtime, events.clone()),
            lookups: LookupCache::new(events.clone()),
            config,
            events,
            registry,
            actors: BTreeMap::new(),
            language_modules: HashMap::new(),
            language_users: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &PackRegistry {
        &self.registry
    }

    /// Re-reads the manifest. Loaded actors stay loaded.
    pub fn refresh_registry(&mut self) -> VoxpackResult<()> {
        self.registry.refresh()?;
        Ok(())
    }

    pub fn bindings(&self) -> &BindingCache {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut BindingCache {
        &mut self.bindings
    }

    pub fn lookups(&self) -> &LookupCache {
        &self.lookups
    }

    pub fn actor(&self, actor: &str, quality: &str) -> Option<&LoadedActor> {
        self.actors.get(&ActorKey::new(actor, quality))
    }

    pub fn loaded_actors(&self) -> Vec<&ActorKey> {
        self.actors.keys().collect()
    }

    pub fn language_module(&self, module_id: &str) -> Option<&LanguageModule> {
        self.language_modules.get(module_id)
    }

    /// Loads an actor in one call.
    pub fn load_actor(&mut self, actor: &str, quality: &str) -> VoxpackResult<&LoadedActor> {
        let key = ActorKey::new(actor, quality);
        let mut load = self.begin_load_actor(actor, quality)?;
        for step in &mut load {
            step?;
        }
        drop(load);
        self.actors.get(&key).ok_or_else(|| {
            VoxpackError::Registry(RegistryError::ActorModuleNotFound {
                actor: actor.to_string(),
                quality: quality.to_string(),
            })
        })
    }

    /// Resolves and validates everything an actor needs, then returns an
    /// iterator that performs the bindings and lookup loads step by step.
    ///
    /// Structural errors (missing actor module, bad config, hash mismatch)
    /// surface here, before any model is loaded. Dropping the iterator before
    /// it completes rolls back what it loaded.
    pub fn begin_load_actor(&mut self, actor: &str, quality: &str) -> VoxpackResult<ActorLoad<'_>> {
        let key = ActorKey::new(actor, quality);
        let backend = self.config.backend;
        let batch_lines = self.config.lookup_batch_lines;

        if self.actors.contains_key(&key) {
            log::debug!("Actor {} already loaded", key);
            return Ok(ActorLoad::new(self, key, backend, batch_lines));
        }

        let entry = self.registry.require_actor_module_entry(actor, quality)?;
        let actor_module = ActorModule::load(&entry, actor)?;
        if self.config.verify_hashes {
            actor_module.module().verify_integrity()?;
        }
        let languages = self.registry.supported_languages(actor, quality);

        let mut language_module_ids = Vec::new();
        let mut new_language_modules = Vec::new();
        for entry in self.registry.language_modules_for_actor(actor, quality) {
            language_module_ids.push(entry.module_id().to_string());
            if self.language_modules.contains_key(entry.module_id()) {
                continue;
            }
            let module = LanguageModule::load(&entry)?;
            if self.config.verify_hashes {
                module.module().verify_integrity()?;
            }
            new_language_modules.push(module);
        }

        let mut tasks = VecDeque::new();
        tasks.push_back(LoadTask::Bind(actor_module.module().clone()));
        for module in &new_language_modules {
            tasks.push_back(LoadTask::Bind(module.module().clone()));
            if let Some(table) = module.lookup_table() {
                tasks.push_back(LoadTask::Lookup {
                    hash: table.hash.clone(),
                    path: table.path.clone(),
                    size_hint: module.lookup_table_size(),
                });
            }
        }

        log::info!(
            "Loading actor {} ({} language modules, {} new)",
            key,
            language_module_ids.len(),
            new_language_modules.len()
        );

        let mut load = ActorLoad::new(self, key, backend, batch_lines);
        load.tasks = tasks;
        load.pending = Some(PendingActor {
            module: actor_module,
            languages,
            language_module_ids,
            new_language_modules,
        });
        Ok(load)
    }

    /// Unloads an actor, releasing bindings and lookup tables nothing else
    /// uses. Returns `false` if the actor was not loaded.
    pub fn unload_actor(&mut self, actor: &str, quality: &str) -> bool {
        let key = ActorKey::new(actor, quality);
        let Some(loaded) = self.actors.remove(&key) else {
            return false;
        };

        let module_id = loaded.module.module_id();
        if !self.module_in_use(module_id) {
            self.bindings.release_module(module_id);
        }

        for language_id in &loaded.language_modules {
            let unused = match self.language_users.get_mut(language_id) {
                Some(users) => {
                    users.remove(&key);
                    users.is_empty()
                }
                None => false,
            };
            if unused {
                self.language_users.remove(language_id);
                self.unload_language_module(language_id);
            }
        }
        log::info!("Unloaded actor {}", key);
        true
    }

    /// Releases every binding and lookup table and forgets loaded actors.
    pub fn dispose(&mut self) {
        log::info!("Disposing pack context ({} actors)", self.actors.len());
        self.actors.clear();
        self.language_modules.clear();
        self.language_users.clear();
        self.bindings.release_all();
        self.lookups.reset();
    }

    /// Best installed language of a loaded actor for `language`/`dialect`.
    pub fn resolve_language(
        &self,
        actor: &str,
        quality: &str,
        language: &str,
        dialect: Option<&str>,
    ) -> VoxpackResult<ModuleLanguage> {
        let candidates = self
            .actor(actor, quality)
            .map(|loaded| loaded.languages.as_slice())
            .unwrap_or_default();
        Ok(best_match(candidates, language, dialect)?.clone())
    }

    /// Cached pronunciation of `word` from a language module's lookup table.
    pub fn lookup(&self, language_module: &str, word: &str) -> Option<&str> {
        let hash = &self.language_modules.get(language_module)?.lookup_table()?.hash;
        self.lookups.try_get(hash, word)
    }

    /// Remembers a pronunciation produced by the full phonemizer.
    pub fn memoize(&mut self, language_module: &str, word: &str, pronunciation: &str) -> bool {
        let Some(table) = self
            .language_modules
            .get(language_module)
            .and_then(|module| module.lookup_table())
        else {
            return false;
        };
        self.lookups.add_or_update(&table.hash, word, pronunciation)
    }

    fn module_in_use(&self, module_id: &str) -> bool {
        self.language_modules.contains_key(module_id)
            || self
                .actors
                .values()
                .any(|loaded| loaded.module.module_id() == module_id)
    }

    fn unload_language_module(&mut self, module_id: &str) {
        let Some(module) = self.language_modules.remove(module_id) else {
            return;
        };
        if !self.module_in_use(module_id) {
            self.bindings.release_module(module_id);
        }
        if let Some(table) = module.lookup_table() {
            let shared = self
                .language_modules
                .values()
                .any(|other| other.lookup_table().map(|t| &t.hash) == Some(&table.hash));
            if !shared {
                self.lookups.deregister(&table.hash);
            }
        }
    }
}

impl fmt::Debug for PackContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackContext")
            .field("manifest", &self.registry.manifest_path())
            .field("actors", &self.actors.keys().collect::<Vec<_>>())
            .field("bindings", &self.bindings.len())
            .field("lookup_tables", &self.lookups.len())
            .finish()
    }
}

struct PendingActor {
    module: ActorModule,
    languages: Vec<ModuleLanguage>,
    language_module_ids: Vec<String>,
    new_language_modules: Vec<LanguageModule>,
}

enum LoadTask {
    Bind(Module),
    Lookup {
        hash: String,
        path: PathBuf,
        size_hint: usize,
    },
}

enum ActiveTask {
    Bind {
        module_id: String,
        loader: BindingLoader,
        created: Vec<String>,
    },
    Lookup {
        hash: String,
        loader: StaticTableLoader,
    },
}

/// Incremental actor load started by [`PackContext::begin_load_actor`].
///
/// Finite and not restartable. After an error the load is rolled back and
/// the iterator ends.
pub struct ActorLoad<'a> {
    context: &'a mut PackContext,
    key: ActorKey,
    backend: BackendKind,
    batch_lines: usize,
    tasks: VecDeque<LoadTask>,
    active: Option<ActiveTask>,
    pending: Option<PendingActor>,
    begun_modules: Vec<String>,
    registered_tables: Vec<String>,
    done: bool,
}

impl<'a> ActorLoad<'a> {
    fn new(
        context: &'a mut PackContext,
        key: ActorKey,
        backend: BackendKind,
        batch_lines: usize,
    ) -> Self {
        Self {
            context,
            key,
            backend,
            batch_lines,
            tasks: VecDeque::new(),
            active: None,
            pending: None,
            begun_modules: Vec::new(),
            registered_tables: Vec::new(),
            done: false,
        }
    }

    pub fn key(&self) -> &ActorKey {
        &self.key
    }

    /// Tasks not yet started (bindings of one module count as one task).
    pub fn remaining_tasks(&self) -> usize {
        self.tasks.len()
    }

    fn step(&mut self) -> VoxpackResult<Option<LoadStep>> {
        loop {
            match self.active.take() {
                Some(ActiveTask::Bind {
                    module_id,
                    mut loader,
                    mut created,
                }) => match loader.next() {
                    Some(binding) => {
                        let binding = binding?;
                        let hash = binding.hash().to_string();
                        if self.context.bindings.insert(binding) {
                            created.push(hash.clone());
                        }
                        self.active = Some(ActiveTask::Bind {
                            module_id: module_id.clone(),
                            loader,
                            created,
                        });
                        return Ok(Some(LoadStep::Bound { module_id, hash }));
                    }
                    None => self.context.bindings.announce_created(&module_id, &created),
                },
                Some(ActiveTask::Lookup { hash, mut loader }) => match loader.next() {
                    Some(entries) => {
                        let entries = entries?;
                        self.active = Some(ActiveTask::Lookup {
                            hash: hash.clone(),
                            loader,
                        });
                        return Ok(Some(LoadStep::LookupBatch { hash, entries }));
                    }
                    None => {
                        if self.context.lookups.finish_incremental(&hash, loader)? {
                            self.registered_tables.push(hash);
                        }
                    }
                },
                None => match self.tasks.pop_front() {
                    Some(LoadTask::Bind(module)) => {
                        let loader = self.context.bindings.begin_module(&module, self.backend);
                        let module_id = module.module_id().to_string();
                        self.begun_modules.push(module_id.clone());
                        self.active = Some(ActiveTask::Bind {
                            module_id,
                            loader,
                            created: Vec::new(),
                        });
                    }
                    Some(LoadTask::Lookup {
                        hash,
                        path,
                        size_hint,
                    }) => {
                        if let Some(loader) =
                            self.context
                                .lookups
                                .register_incremental(&hash, &path, self.batch_lines)?
                        {
                            self.active = Some(ActiveTask::Lookup {
                                hash,
                                loader: loader.with_size_hint(size_hint),
                            });
                        }
                    }
                    None => return Ok(None),
                },
            }
        }
    }

    fn commit(&mut self) -> LoadStep {
        self.done = true;
        if let Some(pending) = self.pending.take() {
            let context = &mut *self.context;
            for module in pending.new_language_modules {
                context
                    .language_modules
                    .insert(module.module_id().to_string(), module);
            }
            for id in &pending.language_module_ids {
                context
                    .language_users
                    .entry(id.clone())
                    .or_default()
                    .insert(self.key.clone());
            }
            context.actors.insert(
                self.key.clone(),
                LoadedActor {
                    module: pending.module,
                    languages: pending.languages,
                    language_modules: pending.language_module_ids,
                },
            );
            log::info!(
                "Actor {} loaded ({} bindings, {} lookup tables in cache)",
                self.key,
                context.bindings.len(),
                context.lookups.len()
            );
        }
        LoadStep::Completed {
            key: self.key.clone(),
        }
    }

    fn rollback(&mut self) {
        self.done = true;
        self.tasks.clear();
        self.active = None;
        if self.pending.take().is_none() {
            return;
        }
        for module_id in std::mem::take(&mut self.begun_modules) {
            if !self.context.module_in_use(&module_id) {
                self.context.bindings.release_module(&module_id);
            }
        }
        for hash in std::mem::take(&mut self.registered_tables) {
            self.context.lookups.deregister(&hash);
        }
        log::warn!("Rolled back incomplete load of actor {}", self.key);
    }
}

impl Iterator for ActorLoad<'_> {
    type Item = VoxpackResult<LoadStep>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(step)) => Some(Ok(step)),
            Ok(None) => Some(Ok(self.commit())),
            Err(err) => {
                log::error!("Loading actor {} failed: {}", self.key, err);
                self.rollback();
                Some(Err(err))
            }
        }
    }
}

impl Drop for ActorLoad<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::PackEvent;
    use crate::testing::fixtures::{write_pack_install, PackInstall};
    use crate::testing::mocks::MockRuntime;
    use tempfile::TempDir;

    fn context(config: EngineConfig) -> (TempDir, PackInstall, Arc<MockRuntime>, PackContext) {
        let dir = TempDir::new().unwrap();
        let install = write_pack_install(dir.path()).unwrap();
        let runtime = Arc::new(MockRuntime::new());
        let config = config.with_manifest_path(&install.manifest_path);
        let context = PackContext::new(config, runtime.clone()).unwrap();
        (dir, install, runtime, context)
    }

    #[test]
    fn test_load_actor_full_chain() {
        let (_dir, install, runtime, mut context) = context(EngineConfig::default());
        let loaded = context.load_actor("Jenny", "High").unwrap();

        assert_eq!(loaded.module().module_id(), "jenny_high");
        assert_eq!(loaded.language_modules(), ["eng".to_string()]);
        assert_eq!(loaded.languages().len(), 1);
        assert_eq!(loaded.languages()[0].iso3166_1(), Some("GB"));

        // encoder, decoder, g2p
        assert_eq!(runtime.load_count(), 3);
        assert!(context.bindings().contains(&install.encoder_hash));
        assert!(context.lookups().contains(&install.lexicon_hash));
        assert_eq!(context.lookup("eng", "hello"), Some("həloʊ"));
    }

    #[test]
    fn test_second_quality_reuses_shared_encoder() {
        let (_dir, install, runtime, mut context) = context(EngineConfig::default());
        context.load_actor("Jenny", "high").unwrap();
        context.load_actor("Jenny", "low").unwrap();

        assert_eq!(runtime.load_count(), 4);
        assert_eq!(
            context.bindings().users_of(&install.encoder_hash),
            vec!["jenny_high", "jenny_low"]
        );

        assert!(context.unload_actor("Jenny", "high"));
        assert!(context.bindings().contains(&install.encoder_hash));
        assert!(!context.bindings().contains(&install.decoder_high_hash));
        assert!(context.language_module("eng").is_some());

        assert!(context.unload_actor("Jenny", "low"));
        assert!(context.bindings().is_empty());
        assert!(context.lookups().is_empty());
        assert!(!context.unload_actor("Jenny", "low"));
    }

    #[test]
    fn test_incremental_load_yields_per_binding_and_batch() {
        let config = EngineConfig::default().with_lookup_batch_lines(1);
        let (_dir, _install, runtime, mut context) = context(config);

        let mut load = context.begin_load_actor("Jenny", "high").unwrap();
        assert!(matches!(load.next(), Some(Ok(LoadStep::Bound { .. }))));
        assert_eq!(runtime.load_count(), 1);

        let steps: Vec<LoadStep> = load.map(|s| s.unwrap()).collect();
        let bound = steps.iter().filter(|s| matches!(s, LoadStep::Bound { .. })).count();
        let batches = steps
            .iter()
            .filter(|s| matches!(s, LoadStep::LookupBatch { .. }))
            .count();
        assert_eq!(bound, 2);
        // four lexicon lines, one per batch
        assert_eq!(batches, 4);
        assert!(matches!(steps.last(), Some(LoadStep::Completed { .. })));
        assert!(context.actor("Jenny", "high").is_some());
    }

    #[test]
    fn test_abandoned_load_rolls_back() {
        let (_dir, _install, _runtime, mut context) = context(EngineConfig::default());
        {
            let mut load = context.begin_load_actor("Jenny", "high").unwrap();
            load.next().unwrap().unwrap();
        }
        assert!(context.bindings().is_empty());
        assert!(context.actor("Jenny", "high").is_none());
        assert!(context.load_actor("Jenny", "high").is_ok());
    }

    #[test]
    fn test_failed_load_rolls_back() {
        let (_dir, install, runtime, mut context) = context(EngineConfig::default());
        let events = context.events().subscribe();
        let g2p = install.root.join("english/g2p.onnx");
        std::fs::remove_file(&g2p).unwrap();

        assert!(matches!(
            context.load_actor("Jenny", "high"),
            Err(VoxpackError::Runtime(_))
        ));
        // both actor models were bound before the g2p model failed
        assert_eq!(runtime.load_count(), 3);
        assert_eq!(runtime.loaded_paths().last(), Some(&g2p));
        assert!(context.bindings().is_empty());
        assert!(context.lookups().is_empty());
        assert!(context.actor("Jenny", "high").is_none());
        assert!(context.language_module("eng").is_none());
        let released: Vec<String> = events
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                PackEvent::BindingsReleased { module_id, .. } => Some(module_id),
                _ => None,
            })
            .collect();
        assert_eq!(released, vec!["jenny_high"]);

        std::fs::write(&g2p, crate::testing::fixtures::G2P_BYTES).unwrap();
        assert!(context.load_actor("Jenny", "high").is_ok());
    }

    #[test]
    fn test_oversized_lookup_table_size_loads() {
        let (_dir, install, _runtime, mut context) = context(EngineConfig::default());
        let config_path = install.root.join("english/config.json");
        let mut config: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&config_path).unwrap()).unwrap();
        config["modules"][0]["lookup_table_size"] = serde_json::json!(u64::MAX);
        std::fs::write(&config_path, config.to_string()).unwrap();

        context.load_actor("Jenny", "high").unwrap();
        assert_eq!(context.lookup("eng", "cat"), Some("kæt"));
    }

    #[test]
    fn test_unknown_actor_is_fatal() {
        let (_dir, _install, _runtime, mut context) = context(EngineConfig::default());
        assert!(matches!(
            context.load_actor("Nobody", "high"),
            Err(VoxpackError::Registry(_))
        ));
    }

    #[test]
    fn test_hash_verification() {
        let config = EngineConfig::default().with_verify_hashes(true);
        let (_dir, install, _runtime, mut context) = context(config);
        std::fs::write(install.root.join("jenny/decoder_high.onnx"), b"tampered").unwrap();

        assert!(matches!(
            context.load_actor("Jenny", "high"),
            Err(VoxpackError::Module(_))
        ));
        assert!(context.load_actor("Jenny", "low").is_ok());
    }

    #[test]
    fn test_resolve_language_and_memoize() {
        let (_dir, _install, _runtime, mut context) = context(EngineConfig::default());
        context.load_actor("Jenny", "high").unwrap();

        let language = context.resolve_language("Jenny", "high", "eng", Some("GB")).unwrap();
        assert_eq!(language.iso639_2(), "en");
        assert!(context.resolve_language("Tom", "high", "eng", None).is_err());

        assert_eq!(context.lookup("eng", "voxel"), None);
        assert!(context.memoize("eng", "voxel", "vɑksəl"));
        assert_eq!(context.lookup("eng", "voxel"), Some("vɑksəl"));
        assert_eq!(context.lookup("eng", "read"), Some("ɹiːd"));
    }

    #[test]
    fn test_dispose_releases_everything() {
        let (_dir, _install, _runtime, mut context) = context(EngineConfig::default());
        let events = context.events().subscribe();
        context.load_actor("Jenny", "high").unwrap();
        context.dispose();

        assert!(context.bindings().is_empty());
        assert!(context.lookups().is_empty());
        assert!(context.loaded_actors().is_empty());
        assert!(events
            .drain()
            .iter()
            .any(|e| matches!(e, PackEvent::BindingsCreated { .. })));
    }
}
