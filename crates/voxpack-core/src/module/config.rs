//! Serde types for a pack's module config file.
//!
//! ```json
//! {
//!   "type": "ACTORPACK",
//!   "version": "1.2.0",
//!   "files": {"9f2c...": "encoder.onnx", "77ab...": "decoder.onnx"},
//!   "modules": [{
//!     "id": "jenny_high",
//!     "sentisfiles": {"preprocess_encoder": "9f2c...", "decoder": "77ab..."},
//!     "chunk_length": 256,
//!     "phoneme_vocabulary": {"a": 1, "b": 2},
//!     "languages": [{"key": 0, "language": {"iso639_2": "en"}, "submodule": "eng_g2p"}],
//!     "actors": {"Jenny": 0}
//!   }]
//! }
//! ```

use super::vocabulary::Vocabulary;
use crate::language::ModuleLanguage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Pack category declared by the config's `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackType {
    Actor,
    Language,
}

impl PackType {
    pub fn tag(&self) -> &'static str {
        match self {
            PackType::Actor => "ACTORPACK",
            PackType::Language => "LANGUAGEPACK",
        }
    }
}

impl fmt::Display for PackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Whole config file of one pack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackConfig {
    #[serde(rename = "type")]
    pub pack_type: String,
    #[serde(default)]
    pub version: String,
    /// Content hash → file name, relative to the config's directory.
    #[serde(default)]
    pub files: HashMap<String, String>,
    #[serde(default)]
    pub modules: Vec<ModuleRecord>,
}

/// One module section of a pack config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub id: String,
    /// Auxiliary files (lookup tables, voices), name → content hash.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    /// Model files that get runtime bindings, name → content hash.
    #[serde(default, alias = "sentisfiles")]
    pub model_files: BTreeMap<String, String>,

    #[serde(default)]
    pub chunk_length: usize,
    #[serde(default)]
    pub phoneme_vocabulary: Option<Vocabulary>,
    #[serde(default)]
    pub grapheme_vocabulary: Option<Vocabulary>,
    #[serde(default)]
    pub boundary_tokens: Option<BoundaryTokens>,
    /// Actor modules: per-language keys and phonemizer routing.
    #[serde(default)]
    pub languages: Vec<LanguageRoute>,
    /// Actor modules: actor name → key.
    #[serde(default)]
    pub actors: BTreeMap<String, i64>,
    /// Language modules: the language served.
    #[serde(default)]
    pub language: Option<ModuleLanguage>,
    #[serde(default)]
    pub lookup_table_size: usize,
}

/// Language key of an actor module, with the language module that
/// phonemizes for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageRoute {
    pub key: i64,
    pub language: ModuleLanguage,
    #[serde(default)]
    pub submodule: Option<String>,
}

/// Start/end markers wrapped around grapheme input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryTokens {
    pub start: String,
    pub end: String,
}

impl Default for BoundaryTokens {
    fn default() -> Self {
        Self {
            start: "^".to_string(),
            end: "$".to_string(),
        }
    }
}
