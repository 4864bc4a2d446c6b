//! Actor modules: per-character voice models.

use super::{Encoded, Module, ModuleError, ModuleResult, PackType, Vocabulary};
use crate::language::ModuleLanguage;
use crate::registry::ModuleEntry;
use std::collections::BTreeMap;

/// Module of an actor pack, bound to one actor.
#[derive(Debug, Clone)]
pub struct ActorModule {
    module: Module,
    actor: String,
    actor_key: u32,
    chunk_length: usize,
    phoneme_vocabulary: Vocabulary,
    language_to_key: BTreeMap<ModuleLanguage, u32>,
    language_submodule_ids: BTreeMap<u32, String>,
}

impl ActorModule {
    /// Reads the actor module behind `entry` for `actor`.
    pub fn load(entry: &ModuleEntry, actor: &str) -> ModuleResult<Self> {
        let (module, record) = Module::load(entry, PackType::Actor)?;
        Self::from_parts(module, record, actor)
    }

    pub(crate) fn from_parts(
        module: Module,
        record: super::ModuleRecord,
        actor: &str,
    ) -> ModuleResult<Self> {
        let module_id = module.module_id().to_string();

        let phoneme_vocabulary = record
            .phoneme_vocabulary
            .filter(|vocabulary| !vocabulary.is_empty())
            .ok_or_else(|| ModuleError::MissingVocabulary {
                module_id: module_id.clone(),
                kind: "phoneme",
            })?;

        let mut language_to_key = BTreeMap::new();
        let mut language_submodule_ids = BTreeMap::new();
        for route in record.languages {
            route.language.validate().map_err(|source| ModuleError::Language {
                module_id: module_id.clone(),
                source,
            })?;
            let key = u32::try_from(route.key).map_err(|_| ModuleError::InvalidLanguageKey {
                module_id: module_id.clone(),
                language: route.language.to_string(),
                key: route.key,
            })?;
            if let Some(submodule) = route.submodule {
                language_submodule_ids.insert(key, submodule);
            }
            language_to_key.insert(route.language, key);
        }

        let raw_key = *record
            .actors
            .get(actor)
            .ok_or_else(|| ModuleError::ActorNotFound {
                module_id: module_id.clone(),
                actor: actor.to_string(),
            })?;
        let actor_key = u32::try_from(raw_key).map_err(|_| ModuleError::InvalidActorKey {
            module_id: module_id.clone(),
            actor: actor.to_string(),
            key: raw_key,
        })?;

        Ok(Self {
            module,
            actor: actor.to_string(),
            actor_key,
            chunk_length: record.chunk_length,
            phoneme_vocabulary,
            language_to_key,
            language_submodule_ids,
        })
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn module_id(&self) -> &str {
        self.module.module_id()
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn actor_key(&self) -> u32 {
        self.actor_key
    }

    pub fn chunk_length(&self) -> usize {
        self.chunk_length
    }

    pub fn phoneme_vocabulary(&self) -> &Vocabulary {
        &self.phoneme_vocabulary
    }

    pub fn languages(&self) -> impl Iterator<Item = &ModuleLanguage> {
        self.language_to_key.keys()
    }

    pub fn language_submodule_ids(&self) -> &BTreeMap<u32, String> {
        &self.language_submodule_ids
    }

    /// Key of `language` for this actor's model.
    ///
    /// Exact record match first, then any record with the same primary
    /// language code. Logs a warning and returns `None` otherwise.
    pub fn language_key(&self, language: &ModuleLanguage) -> Option<u32> {
        if let Some(key) = self.language_to_key.get(language) {
            return Some(*key);
        }
        let relaxed = self
            .language_to_key
            .iter()
            .find(|(candidate, _)| candidate.same_primary_language(language))
            .map(|(_, key)| *key);
        if relaxed.is_none() {
            log::warn!(
                "Module '{}' has no language key for {}",
                self.module_id(),
                language
            );
        }
        relaxed
    }

    /// Language module that phonemizes `language` for this actor.
    pub fn submodule_for(&self, language: &ModuleLanguage) -> Option<&str> {
        let key = self.language_key(language)?;
        self.language_submodule_ids.get(&key).map(String::as_str)
    }

    /// Encodes phoneme text into model ids, dropping unknown symbols.
    pub fn encode_phonemes(&self, text: &str) -> Encoded {
        let encoded = self.phoneme_vocabulary.encode_symbols(text);
        if !encoded.unmatched.is_empty() {
            log::warn!(
                "Module '{}': dropped unknown phonemes at {:?} in {:?}",
                self.module_id(),
                encoded.unmatched,
                text
            );
        }
        encoded
    }
}
