//! PackRegistry - queryable view over the installed-pack manifest.

use super::manifest::{ActorPackRecord, Manifest};
use crate::event_bus::{EventBus, PackEvent};
use crate::language::{LanguageError, ModuleLanguage};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid language record in manifest: {0}")]
    InvalidLanguage(#[from] LanguageError),
    #[error("No actor module for '{actor}' with quality '{quality}'")]
    ActorModuleNotFound { actor: String, quality: String },
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Reference from the registry to a module's config file.
///
/// The default value is the "not found" sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ModuleEntry {
    module_id: String,
    config_path: PathBuf,
}

impl ModuleEntry {
    pub fn new(module_id: impl Into<String>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            module_id: module_id.into(),
            config_path: config_path.into(),
        }
    }

    /// The "not found" sentinel.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.module_id.is_empty()
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Single source of truth over the installed-pack manifest.
///
/// Every query is a read-only view over the last successfully parsed
/// manifest. [`refresh`](Self::refresh) re-reads the file and publishes
/// [`PackEvent::ManifestRefreshed`].
#[derive(Debug)]
pub struct PackRegistry {
    manifest_path: PathBuf,
    base_dir: PathBuf,
    manifest: Manifest,
    events: EventBus,
}

impl PackRegistry {
    /// Loads the manifest at `path`. Config paths in the manifest are
    /// resolved against the manifest's directory.
    pub fn open(path: impl AsRef<Path>, events: EventBus) -> RegistryResult<Self> {
        let manifest_path = path.as_ref().to_path_buf();
        let manifest = Self::read_manifest(&manifest_path)?;
        let base_dir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        log::info!(
            "Loaded pack manifest {} ({} actor modules, {} language modules)",
            manifest_path.display(),
            manifest.actor_packs.len(),
            manifest.language_packs.len()
        );

        Ok(Self {
            manifest_path,
            base_dir,
            manifest,
            events,
        })
    }

    /// Builds a registry from an already parsed manifest. `refresh` will read
    /// from `base_dir/manifest.json`.
    pub fn from_manifest(
        manifest: Manifest,
        base_dir: impl Into<PathBuf>,
        events: EventBus,
    ) -> Self {
        let base_dir = base_dir.into();
        Self {
            manifest_path: base_dir.join("manifest.json"),
            base_dir,
            manifest,
            events,
        }
    }

    fn read_manifest(path: &Path) -> RegistryResult<Manifest> {
        let content = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Manifest::from_json(&content).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Re-parses the manifest from disk.
    ///
    /// On failure the error is logged and returned, and the previous state
    /// stays in place.
    pub fn refresh(&mut self) -> RegistryResult<()> {
        match Self::read_manifest(&self.manifest_path) {
            Ok(manifest) => {
                self.manifest = manifest;
                log::info!("Refreshed pack manifest {}", self.manifest_path.display());
                self.events.publish(PackEvent::ManifestRefreshed {
                    actor_modules: self.manifest.actor_packs.len(),
                    language_modules: self.manifest.language_packs.len(),
                });
                Ok(())
            }
            Err(e) => {
                log::error!("Manifest refresh failed, keeping previous state: {}", e);
                Err(e)
            }
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn resolve(&self, jsonpath: &str) -> PathBuf {
        let path = Path::new(jsonpath);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn find_actor_record(&self, actor: &str, quality: &str) -> Option<(&String, &ActorPackRecord)> {
        self.manifest.actor_packs.iter().find(|(_, record)| {
            record.actors.iter().any(|a| a == actor) && record.quality.eq_ignore_ascii_case(quality)
        })
    }

    /// First module whose actor list contains `actor` with a matching quality,
    /// or the empty entry.
    pub fn actor_module_entry(&self, actor: &str, quality: &str) -> ModuleEntry {
        match self.find_actor_record(actor, quality) {
            Some((module_id, record)) => {
                ModuleEntry::new(module_id, self.resolve(&record.jsonpath))
            }
            None => ModuleEntry::empty(),
        }
    }

    /// Like [`actor_module_entry`](Self::actor_module_entry), but a miss is an error.
    pub fn require_actor_module_entry(
        &self,
        actor: &str,
        quality: &str,
    ) -> RegistryResult<ModuleEntry> {
        let entry = self.actor_module_entry(actor, quality);
        if entry.is_empty() {
            return Err(RegistryError::ActorModuleNotFound {
                actor: actor.to_string(),
                quality: quality.to_string(),
            });
        }
        Ok(entry)
    }

    /// Entry for the language module installed under `name` (module id or any
    /// language code), or the empty entry with a warning.
    pub fn language_module_entry(&self, name: &str) -> ModuleEntry {
        let by_id = self
            .manifest
            .language_packs
            .iter()
            .find(|(module_id, _)| module_id.eq_ignore_ascii_case(name));
        let found = by_id.or_else(|| {
            self.manifest
                .language_packs
                .iter()
                .find(|(_, record)| record.languages.iter().any(|l| l.matches_code(name)))
        });

        match found {
            Some((module_id, record)) => {
                ModuleEntry::new(module_id, self.resolve(&record.jsonpath))
            }
            None => {
                log::warn!("Language pack '{}' is not installed", name);
                ModuleEntry::empty()
            }
        }
    }

    pub fn is_language_installed(&self, code: &str) -> bool {
        let code = code.to_lowercase();
        self.manifest.available_language_codes().contains(&code)
    }

    /// Required language codes of the module that are also installed, in the
    /// module's declared order.
    fn installed_required_codes(&self, record: &ActorPackRecord) -> Vec<String> {
        let available = self.manifest.available_language_codes();
        let mut codes: Vec<String> = Vec::new();
        for required in &record.required_language_modules {
            let lowered = required.to_lowercase();
            if available.contains(&lowered) && !codes.contains(&lowered) {
                codes.push(lowered);
            }
        }
        codes
    }

    /// Languages an actor-quality module can actually be offered.
    ///
    /// The module's required language codes are intersected with the codes
    /// of installed language packs; each surviving code maps to the module's
    /// own dialect records, or to the language pack's records when the module
    /// declares none for that code.
    pub fn supported_languages(&self, actor: &str, quality: &str) -> Vec<ModuleLanguage> {
        let Some((_, record)) = self.find_actor_record(actor, quality) else {
            return Vec::new();
        };

        let mut languages: Vec<ModuleLanguage> = Vec::new();
        for code in self.installed_required_codes(record) {
            let declared: Vec<&ModuleLanguage> =
                record.languages.iter().filter(|l| l.matches_code(&code)).collect();
            let records: Vec<&ModuleLanguage> = if declared.is_empty() {
                self.manifest
                    .language_packs
                    .iter()
                    .filter(|(module_id, pack)| {
                        module_id.eq_ignore_ascii_case(&code)
                            || pack.languages.iter().any(|l| l.matches_code(&code))
                    })
                    .flat_map(|(_, pack)| pack.languages.iter())
                    .collect()
            } else {
                declared
            };
            for language in records {
                if !languages.contains(language) {
                    languages.push(language.clone());
                }
            }
        }
        languages
    }

    /// Entries of the installed language modules an actor-quality module needs.
    pub fn language_modules_for_actor(&self, actor: &str, quality: &str) -> Vec<ModuleEntry> {
        let Some((_, record)) = self.find_actor_record(actor, quality) else {
            return Vec::new();
        };
        let mut entries: Vec<ModuleEntry> = Vec::new();
        for code in self.installed_required_codes(record) {
            let entry = self.language_module_entry(&code);
            if !entry.is_empty() && !entries.contains(&entry) {
                entries.push(entry);
            }
        }
        entries
    }

    /// Language records carried by a language module.
    pub fn languages_for_module(&self, module_id: &str) -> Vec<ModuleLanguage> {
        self.manifest
            .language_packs
            .get(module_id)
            .map(|record| record.languages.clone())
            .unwrap_or_default()
    }

    /// Every actor name across all actor modules, sorted.
    pub fn actors(&self) -> Vec<String> {
        let mut actors: Vec<String> = self
            .manifest
            .actor_packs
            .values()
            .flat_map(|record| record.actors.iter().cloned())
            .collect();
        actors.sort();
        actors.dedup();
        actors
    }

    /// Quality tags available for an actor, sorted.
    pub fn module_types_for_actor(&self, actor: &str) -> Vec<String> {
        let mut qualities: Vec<String> = self
            .manifest
            .actor_packs
            .values()
            .filter(|record| record.actors.iter().any(|a| a == actor))
            .map(|record| record.quality.clone())
            .collect();
        qualities.sort();
        qualities.dedup();
        qualities
    }

    /// Required language codes that no installed language pack provides.
    pub fn missing_language_packs(&self) -> Vec<String> {
        let available = self.manifest.available_language_codes();
        let mut missing: Vec<String> = self
            .manifest
            .actor_packs
            .values()
            .flat_map(|record| record.required_language_modules.iter())
            .map(|code| code.to_lowercase())
            .filter(|code| !available.contains(code))
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    pub fn actor_pack_names(&self) -> Vec<String> {
        collect_names(self.manifest.actor_packs.values().map(|r| r.packname.as_str()))
    }

    pub fn language_pack_names(&self) -> Vec<String> {
        collect_names(self.manifest.language_packs.values().map(|r| r.packname.as_str()))
    }
}

fn collect_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut names: Vec<String> = names
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    names.sort();
    names.dedup();
    names
}
