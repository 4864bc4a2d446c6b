//! On-disk manifest of installed packs.
//!
//! ```json
//! {
//!   "actor_packs": {
//!     "jenny_high": {
//!       "actors": ["Jenny"],
//!       "quality": "high",
//!       "languages": [{"iso639_2": "en", "iso639_3": "eng", "iso3166_1": "GB"}],
//!       "required_language_modules": ["eng"],
//!       "jsonpath": "jenny/config.json",
//!       "packname": "jenny-pack"
//!     }
//!   },
//!   "language_packs": {
//!     "eng": {
//!       "languages": [{"iso639_2": "en", "iso639_3": "eng"}],
//!       "jsonpath": "english/config.json",
//!       "packname": "english-pack"
//!     }
//!   }
//! }
//! ```
//!
//! Both sections are optional. Sections are kept in `BTreeMap`s so "first
//! matching module" means first by module id, independent of file order.

use crate::language::{LanguageResult, ModuleLanguage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parsed manifest document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub actor_packs: BTreeMap<String, ActorPackRecord>,
    #[serde(default)]
    pub language_packs: BTreeMap<String, LanguagePackRecord>,
}

/// Manifest record for one actor-pack module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorPackRecord {
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub quality: String,
    /// Full dialect records the module can speak.
    #[serde(default)]
    pub languages: Vec<ModuleLanguage>,
    /// Language module codes the module needs installed to speak them.
    #[serde(default)]
    pub required_language_modules: Vec<String>,
    pub jsonpath: String,
    #[serde(default)]
    pub packname: String,
}

/// Manifest record for one language-pack module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguagePackRecord {
    #[serde(default)]
    pub languages: Vec<ModuleLanguage>,
    pub jsonpath: String,
    #[serde(default)]
    pub packname: String,
}

impl Manifest {
    /// Parses a manifest from JSON text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
    }

    /// Checks every language record in the document.
    pub fn validate(&self) -> LanguageResult<()> {
        let actor_languages = self.actor_packs.values().flat_map(|r| r.languages.iter());
        let pack_languages = self.language_packs.values().flat_map(|r| r.languages.iter());
        for language in actor_languages.chain(pack_languages) {
            language.validate()?;
        }
        Ok(())
    }

    /// Lower-cased codes under which installed language packs can be found.
    ///
    /// A language pack is addressable by its module id and by every code of
    /// every language record it carries.
    pub fn available_language_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = Vec::new();
        for (module_id, record) in &self.language_packs {
            codes.push(module_id.to_lowercase());
            for language in &record.languages {
                codes.push(language.iso639_2().to_lowercase());
                codes.extend(language.iso639_3().map(str::to_lowercase));
                codes.extend(language.glottocode().map(str::to_lowercase));
            }
        }
        codes.sort();
        codes.dedup();
        codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sections_are_empty() {
        let manifest = Manifest::from_json(r#"{"actor_packs": {}}"#).unwrap();
        assert!(manifest.language_packs.is_empty());

        let manifest = Manifest::from_json("   ").unwrap();
        assert_eq!(manifest, Manifest::default());
    }

    #[test]
    fn test_jsonpath_is_required() {
        let result = Manifest::from_json(r#"{"language_packs": {"eng": {"packname": "x"}}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_available_codes_cover_ids_and_records() {
        let manifest = Manifest::from_json(
            r#"{"language_packs": {"English_Base": {
                "languages": [{"iso639_2": "EN", "iso639_3": "eng", "glottocode": "stan1293"}],
                "jsonpath": "en.json"}}}"#,
        )
        .unwrap();
        assert_eq!(
            manifest.available_language_codes(),
            vec!["en", "eng", "english_base", "stan1293"]
        );
    }
}
