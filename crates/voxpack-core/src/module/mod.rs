//! Modules - the resource-and-metadata units inside packs.
//!
//! A [`Module`] holds what every module has: its id, where its config lives,
//! and a file table mapping internal names to on-disk paths and content
//! hashes. [`ActorModule`] and [`LanguageModule`] wrap a `Module` and add the
//! vocabularies and language data of their pack category.
//!
//! Model files are bound to the runtime by content hash, so a file shared by
//! several modules (for example an encoder used by every quality of an actor)
//! is loaded once. See [`Module::create_runtime_bindings`] and
//! [`crate::runtime_adapter::BindingCache`].

use crate::language::LanguageError;
use crate::registry::ModuleEntry;
use crate::runtime_adapter::{
    BackendKind, BindingLoader, ModelRuntime, ModelRuntimeBinding, PendingBinding, RuntimeResult,
};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

mod actor;
pub mod config;
mod language;
mod vocabulary;

pub use actor::ActorModule;
pub use config::{BoundaryTokens, LanguageRoute, ModuleRecord, PackConfig, PackType};
pub use language::{LanguageModule, LOOKUP_TABLE_FILE};
pub use vocabulary::{Decoded, Encoded, Vocabulary};

/// Internal-name marker of sub-models that always run on the CPU backend.
const PREPROCESSING_MARKER: &str = "preprocess";

/// Structural errors raised while building a module from its config.
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Module entry is empty")]
    EmptyEntry,

    #[error("Failed to read module config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse module config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Config {path} is a {found} pack, expected {expected}")]
    WrongPackType {
        path: PathBuf,
        expected: PackType,
        found: String,
    },

    #[error("Module '{module_id}' not found in {path}")]
    ModuleNotFound { module_id: String, path: PathBuf },

    #[error("Module '{module_id}': file '{name}' references unknown hash {hash}")]
    UnresolvedFile {
        module_id: String,
        name: String,
        hash: String,
    },

    #[error("Module '{module_id}' is missing its {kind} vocabulary")]
    MissingVocabulary { module_id: String, kind: &'static str },

    #[error("Module '{module_id}' does not declare a language")]
    MissingLanguage { module_id: String },

    #[error("Module '{module_id}': language {language} has invalid key {key}")]
    InvalidLanguageKey {
        module_id: String,
        language: String,
        key: i64,
    },

    #[error("Module '{module_id}' has no key for actor '{actor}'")]
    ActorNotFound { module_id: String, actor: String },

    #[error("Module '{module_id}': actor '{actor}' has invalid key {key}")]
    InvalidActorKey {
        module_id: String,
        actor: String,
        key: i64,
    },

    #[error("Module '{module_id}': {source}")]
    Language {
        module_id: String,
        #[source]
        source: LanguageError,
    },

    #[error("File '{name}' hash mismatch: expected {expected}, found {actual}")]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

/// Result type for module construction.
pub type ModuleResult<T> = Result<T, ModuleError>;

/// A file referenced by a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFile {
    pub path: PathBuf,
    pub hash: String,
}

/// Fields shared by actor and language modules.
#[derive(Debug, Clone)]
pub struct Module {
    module_id: String,
    config_path: PathBuf,
    version: String,
    directory: PathBuf,
    pack_type: PackType,
    file_table: BTreeMap<String, ModuleFile>,
    model_table: BTreeMap<String, String>,
}

impl Module {
    /// Reads the config behind `entry`, checks its pack type, and builds the
    /// file tables of the matching module section.
    ///
    /// Returns the module together with its raw section so the caller can
    /// parse the category-specific fields.
    pub fn load(entry: &ModuleEntry, expected: PackType) -> ModuleResult<(Self, ModuleRecord)> {
        if entry.is_empty() {
            return Err(ModuleError::EmptyEntry);
        }
        let config_path = entry.config_path().to_path_buf();
        let content = fs::read_to_string(&config_path).map_err(|source| ModuleError::Io {
            path: config_path.clone(),
            source,
        })?;
        let config: PackConfig =
            serde_json::from_str(&content).map_err(|source| ModuleError::Parse {
                path: config_path.clone(),
                source,
            })?;
        Self::from_config(entry, config, expected)
    }

    /// Builds a module from an already parsed config.
    pub fn from_config(
        entry: &ModuleEntry,
        mut config: PackConfig,
        expected: PackType,
    ) -> ModuleResult<(Self, ModuleRecord)> {
        let config_path = entry.config_path().to_path_buf();
        if !config.pack_type.eq_ignore_ascii_case(expected.tag()) {
            return Err(ModuleError::WrongPackType {
                path: config_path,
                expected,
                found: config.pack_type,
            });
        }

        let position = config
            .modules
            .iter()
            .position(|record| record.id == entry.module_id())
            .ok_or_else(|| ModuleError::ModuleNotFound {
                module_id: entry.module_id().to_string(),
                path: config_path.clone(),
            })?;
        let record = config.modules.swap_remove(position);

        let directory = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut file_table = BTreeMap::new();
        for (name, hash) in record.files.iter().chain(record.model_files.iter()) {
            let file_name = config.files.get(hash).ok_or_else(|| ModuleError::UnresolvedFile {
                module_id: record.id.clone(),
                name: name.clone(),
                hash: hash.clone(),
            })?;
            file_table.insert(
                name.clone(),
                ModuleFile {
                    path: directory.join(file_name),
                    hash: hash.clone(),
                },
            );
        }
        let model_table = record.model_files.clone();

        let module = Self {
            module_id: record.id.clone(),
            config_path,
            version: config.version,
            directory,
            pack_type: expected,
            file_table,
            model_table,
        };
        Ok((module, record))
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn pack_type(&self) -> PackType {
        self.pack_type
    }

    /// Internal name → (path, content hash) for every file.
    pub fn file_table(&self) -> &BTreeMap<String, ModuleFile> {
        &self.file_table
    }

    /// Internal name → content hash for model files.
    pub fn model_table(&self) -> &BTreeMap<String, String> {
        &self.model_table
    }

    pub fn file(&self, name: &str) -> Option<&ModuleFile> {
        self.file_table.get(name)
    }

    /// Every content hash this module needs bound.
    ///
    /// Only model files count. Auxiliary files such as the `lookup_table`
    /// are never bound; [`LookupCache`](crate::lookup::LookupCache) loads
    /// them by hash instead.
    pub fn all_file_hashes(&self) -> HashSet<String> {
        self.model_table.values().cloned().collect()
    }

    /// True iff every hash of [`all_file_hashes`](Self::all_file_hashes) is
    /// already in `hashes`.
    pub fn is_included_in(&self, hashes: &HashSet<String>) -> bool {
        self.model_table.values().all(|hash| hashes.contains(hash))
    }

    /// Whether a sub-model must stay on the CPU backend.
    pub fn is_preprocessing_model(name: &str) -> bool {
        name.to_lowercase().contains(PREPROCESSING_MARKER)
    }

    /// Work items for the model files not yet in `already_loaded`.
    ///
    /// Each distinct hash appears once, even when several internal names
    /// share it.
    pub fn binding_plan(
        &self,
        already_loaded: &HashSet<String>,
        preferred: BackendKind,
    ) -> Vec<PendingBinding> {
        let mut planned: HashSet<&str> = HashSet::new();
        let mut plan = Vec::new();
        for (name, hash) in &self.model_table {
            if already_loaded.contains(hash) || !planned.insert(hash.as_str()) {
                continue;
            }
            let Some(file) = self.file_table.get(name) else {
                continue;
            };
            let backend = if Self::is_preprocessing_model(name) {
                BackendKind::Cpu
            } else {
                preferred
            };
            plan.push(PendingBinding {
                module_id: self.module_id.clone(),
                name: name.clone(),
                hash: hash.clone(),
                path: file.path.clone(),
                backend,
            });
        }
        plan
    }

    /// Resumable loader over [`binding_plan`](Self::binding_plan); yields one
    /// binding per step.
    pub fn binding_loader(
        &self,
        already_loaded: &HashSet<String>,
        preferred: BackendKind,
        runtime: Arc<dyn ModelRuntime>,
    ) -> BindingLoader {
        BindingLoader::new(runtime, self.binding_plan(already_loaded, preferred))
    }

    /// Loads every model whose hash is not in `already_loaded`.
    ///
    /// Returns only the new bindings; the caller merges them into its map.
    pub fn create_runtime_bindings(
        &self,
        already_loaded: &HashSet<String>,
        preferred: BackendKind,
        runtime: Arc<dyn ModelRuntime>,
    ) -> RuntimeResult<HashMap<String, ModelRuntimeBinding>> {
        self.binding_loader(already_loaded, preferred, runtime)
            .map(|step| step.map(|binding| (binding.hash().to_string(), binding)))
            .collect()
    }

    /// Recomputes the SHA-256 of every file and compares it with the hash the
    /// config declares.
    pub fn verify_integrity(&self) -> ModuleResult<()> {
        for (name, file) in &self.file_table {
            let bytes = fs::read(&file.path).map_err(|source| ModuleError::Io {
                path: file.path.clone(),
                source,
            })?;
            let actual = format!("{:x}", Sha256::digest(&bytes));
            if !actual.eq_ignore_ascii_case(&file.hash) {
                return Err(ModuleError::HashMismatch {
                    name: name.clone(),
                    expected: file.hash.clone(),
                    actual,
                });
            }
        }
        log::debug!("Verified {} files of module {}", self.file_table.len(), self.module_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockRuntime;

    fn config() -> PackConfig {
        serde_json::from_str(
            r#"{
                "type": "ACTORPACK",
                "version": "2.0.1",
                "files": {"h_enc": "enc.onnx", "h_dec": "dec.onnx", "h_voice": "voice.bin"},
                "modules": [
                    {"id": "other", "sentisfiles": {"dec": "h_dec"}},
                    {"id": "jenny_high",
                     "files": {"voice": "h_voice"},
                     "sentisfiles": {"preprocess_encoder": "h_enc", "decoder": "h_dec", "decoder_alias": "h_dec"}}
                ]
            }"#,
        )
        .unwrap()
    }

    fn entry() -> ModuleEntry {
        ModuleEntry::new("jenny_high", "/packs/jenny/config.json")
    }

    #[test]
    fn test_builds_file_and_model_tables() {
        let (module, _) = Module::from_config(&entry(), config(), PackType::Actor).unwrap();
        assert_eq!(module.version(), "2.0.1");
        assert_eq!(module.file_table().len(), 4);
        assert_eq!(module.model_table().len(), 3);
        assert_eq!(
            module.file("voice").unwrap().path,
            PathBuf::from("/packs/jenny/voice.bin")
        );
        assert_eq!(
            module.all_file_hashes(),
            HashSet::from(["h_enc".to_string(), "h_dec".to_string()])
        );
        // auxiliary files are not bindable
        let models = HashSet::from(["h_enc".to_string(), "h_dec".to_string()]);
        assert!(module.is_included_in(&models));
    }

    #[test]
    fn test_wrong_pack_type() {
        let result = Module::from_config(&entry(), config(), PackType::Language);
        assert!(matches!(result, Err(ModuleError::WrongPackType { .. })));
    }

    #[test]
    fn test_missing_module_section() {
        let entry = ModuleEntry::new("nobody", "/packs/config.json");
        let result = Module::from_config(&entry, config(), PackType::Actor);
        assert!(matches!(result, Err(ModuleError::ModuleNotFound { .. })));
    }

    #[test]
    fn test_unresolved_hash() {
        let mut config = config();
        config.files.remove("h_voice");
        let result = Module::from_config(&entry(), config, PackType::Actor);
        assert!(matches!(result, Err(ModuleError::UnresolvedFile { .. })));
    }

    #[test]
    fn test_empty_entry() {
        let result = Module::load(&ModuleEntry::empty(), PackType::Actor);
        assert!(matches!(result, Err(ModuleError::EmptyEntry)));
    }

    #[test]
    fn test_plan_pins_preprocessing_to_cpu_and_dedups() {
        let (module, _) = Module::from_config(&entry(), config(), PackType::Actor).unwrap();
        let plan = module.binding_plan(&HashSet::new(), BackendKind::Gpu);

        assert_eq!(plan.len(), 2);
        let enc = plan.iter().find(|p| p.hash == "h_enc").unwrap();
        let dec = plan.iter().find(|p| p.hash == "h_dec").unwrap();
        assert_eq!(enc.backend, BackendKind::Cpu);
        assert_eq!(dec.backend, BackendKind::Gpu);
    }

    #[test]
    fn test_included_in() {
        let (module, _) = Module::from_config(&entry(), config(), PackType::Actor).unwrap();
        let mut loaded = HashSet::from(["h_dec".to_string()]);
        assert!(!module.is_included_in(&loaded));
        loaded.insert("h_enc".to_string());
        assert!(module.is_included_in(&loaded));
        assert!(module.binding_plan(&loaded, BackendKind::Cpu).is_empty());
    }

    #[test]
    fn test_shared_hash_is_not_bound_twice() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["enc.onnx", "dec.onnx", "voice.bin"] {
            fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }
        let entry = ModuleEntry::new("jenny_high", dir.path().join("config.json"));
        let (first, _) = Module::from_config(&entry, config(), PackType::Actor).unwrap();
        let entry = ModuleEntry::new("other", dir.path().join("config.json"));
        let (second, _) = Module::from_config(&entry, config(), PackType::Actor).unwrap();

        let runtime: Arc<dyn ModelRuntime> = Arc::new(MockRuntime::new());
        let created = first
            .create_runtime_bindings(&HashSet::new(), BackendKind::Cpu, runtime.clone())
            .unwrap();
        assert_eq!(created.len(), 2);

        let loaded: HashSet<String> = created.keys().cloned().collect();
        let again = second
            .create_runtime_bindings(&loaded, BackendKind::Cpu, runtime)
            .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_verify_integrity() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("lexicon.tsv"), b"hello\th@loU\n").unwrap();
        let good = format!("{:x}", Sha256::digest(b"hello\th@loU\n"));

        let mut config = PackConfig {
            pack_type: "LANGUAGEPACK".to_string(),
            ..Default::default()
        };
        config.files.insert(good.clone(), "lexicon.tsv".to_string());
        config.modules.push(ModuleRecord {
            id: "eng".to_string(),
            files: BTreeMap::from([("lookup_table".to_string(), good)]),
            ..Default::default()
        });
        let entry = ModuleEntry::new("eng", dir.path().join("config.json"));
        let (module, _) = Module::from_config(&entry, config.clone(), PackType::Language).unwrap();
        assert!(module.verify_integrity().is_ok());

        fs::write(dir.path().join("lexicon.tsv"), b"tampered").unwrap();
        assert!(matches!(
            module.verify_integrity(),
            Err(ModuleError::HashMismatch { .. })
        ));
    }
}
