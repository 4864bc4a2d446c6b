//! Language and dialect identity plus best-match resolution.
//!
//! A [`ModuleLanguage`] identifies the language a module serves, down to an
//! optional region or custom dialect. Packs advertise these records in the
//! manifest and in their module configs; callers ask for "eng" or "sv" and
//! [`best_match`] picks the closest record that is actually installed.
//!
//! # Scoring
//!
//! | Field            | Language score | Dialect score |
//! |------------------|----------------|---------------|
//! | `custom_dialect` | 10             |               |
//! | `glottocode`     | 3              |               |
//! | `iso639_3`       | 2              |               |
//! | `iso639_2`       | 1              |               |
//! | `iso3166_2`      |                | 2             |
//! | `iso3166_1`      |                | 1             |
//!
//! Only the first matching field (in the order above) counts. All comparisons
//! are case-insensitive.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const CUSTOM_DIALECT_SCORE: u32 = 10;
const GLOTTOCODE_SCORE: u32 = 3;
const ISO639_3_SCORE: u32 = 2;
const ISO639_2_SCORE: u32 = 1;
const ISO3166_2_SCORE: u32 = 2;
const ISO3166_1_SCORE: u32 = 1;

/// Error type for language resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LanguageError {
    #[error("No candidate languages to match '{0}' against")]
    NoCandidates(String),
    #[error("Invalid language record: {0}")]
    InvalidRecord(String),
}

/// Result type for language resolution.
pub type LanguageResult<T> = Result<T, LanguageError>;

/// Language/dialect identity of a module.
///
/// Equality and hashing are structural over every field, so two records that
/// differ only in region are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleLanguage {
    iso639_2: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iso639_3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    glottocode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_dialect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iso3166_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iso3166_2: Option<String>,
}

impl ModuleLanguage {
    /// Creates a language identified only by its ISO 639-2 code.
    pub fn new(iso639_2: impl Into<String>) -> Self {
        Self {
            iso639_2: iso639_2.into(),
            iso639_3: None,
            glottocode: None,
            custom_dialect: None,
            iso3166_1: None,
            iso3166_2: None,
        }
    }

    pub fn with_iso639_3(mut self, code: impl Into<String>) -> Self {
        self.iso639_3 = Some(code.into());
        self
    }

    pub fn with_glottocode(mut self, code: impl Into<String>) -> Self {
        self.glottocode = Some(code.into());
        self
    }

    pub fn with_custom_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.custom_dialect = Some(dialect.into());
        self
    }

    pub fn with_iso3166_1(mut self, region: impl Into<String>) -> Self {
        self.iso3166_1 = Some(region.into());
        self
    }

    pub fn with_iso3166_2(mut self, subdivision: impl Into<String>) -> Self {
        self.iso3166_2 = Some(subdivision.into());
        self
    }

    /// Rejects records whose required primary code is blank.
    ///
    /// Deserialization cannot enforce this, so registry and module loaders
    /// call it on every record they read.
    pub fn validate(&self) -> LanguageResult<()> {
        if self.iso639_2.trim().is_empty() {
            return Err(LanguageError::InvalidRecord(format!(
                "missing iso639_2 code in {:?}",
                self
            )));
        }
        Ok(())
    }

    /// ISO 639-2 code, the primary language code.
    pub fn iso639_2(&self) -> &str {
        &self.iso639_2
    }

    pub fn iso639_3(&self) -> Option<&str> {
        self.iso639_3.as_deref()
    }

    pub fn glottocode(&self) -> Option<&str> {
        self.glottocode.as_deref()
    }

    pub fn custom_dialect(&self) -> Option<&str> {
        self.custom_dialect.as_deref()
    }

    pub fn iso3166_1(&self) -> Option<&str> {
        self.iso3166_1.as_deref()
    }

    pub fn iso3166_2(&self) -> Option<&str> {
        self.iso3166_2.as_deref()
    }

    /// Whether `code` names this language by any of its language codes.
    pub fn matches_code(&self, code: &str) -> bool {
        eq_ignore_case(Some(&self.iso639_2), code)
            || eq_ignore_case(self.iso639_3.as_deref(), code)
            || eq_ignore_case(self.glottocode.as_deref(), code)
    }

    /// Whether both records share the same primary language code.
    pub fn same_primary_language(&self, other: &ModuleLanguage) -> bool {
        self.iso639_2.eq_ignore_ascii_case(&other.iso639_2)
    }

    /// Score against a language query. Zero means no field matched.
    pub fn language_score(&self, query: &str) -> u32 {
        if eq_ignore_case(self.custom_dialect.as_deref(), query) {
            CUSTOM_DIALECT_SCORE
        } else if eq_ignore_case(self.glottocode.as_deref(), query) {
            GLOTTOCODE_SCORE
        } else if eq_ignore_case(self.iso639_3.as_deref(), query) {
            ISO639_3_SCORE
        } else if eq_ignore_case(Some(&self.iso639_2), query) {
            ISO639_2_SCORE
        } else {
            0
        }
    }

    /// Score against a dialect (region) query. Zero means no field matched.
    pub fn dialect_score(&self, query: &str) -> u32 {
        if eq_ignore_case(self.iso3166_2.as_deref(), query) {
            ISO3166_2_SCORE
        } else if eq_ignore_case(self.iso3166_1.as_deref(), query) {
            ISO3166_1_SCORE
        } else {
            0
        }
    }
}

impl fmt::Display for ModuleLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.iso639_3.as_deref().unwrap_or(&self.iso639_2))?;
        if let Some(region) = self.iso3166_2.as_deref().or(self.iso3166_1.as_deref()) {
            write!(f, "-{}", region)?;
        }
        if let Some(dialect) = &self.custom_dialect {
            write!(f, " ({})", dialect)?;
        }
        Ok(())
    }
}

fn eq_ignore_case(field: Option<&str>, query: &str) -> bool {
    field.is_some_and(|value| !value.is_empty() && value.eq_ignore_ascii_case(query))
}

/// Picks the candidate closest to `language`, optionally narrowed by `dialect`.
///
/// A strictly higher language score replaces the tie-set with that candidate;
/// an equal score appends to it. Without a dialect the first entry of the
/// tie-set wins. With a dialect the tie-set is re-scored on region and the
/// first candidate holding the highest dialect score wins. When nothing
/// matches at all the first candidate is returned.
pub fn best_match<'a>(
    candidates: &'a [ModuleLanguage],
    language: &str,
    dialect: Option<&str>,
) -> LanguageResult<&'a ModuleLanguage> {
    let first = candidates
        .first()
        .ok_or_else(|| LanguageError::NoCandidates(language.to_string()))?;

    let mut best_score = 0;
    let mut tied: Vec<&ModuleLanguage> = Vec::new();
    for candidate in candidates {
        let score = candidate.language_score(language);
        if score > best_score {
            best_score = score;
            tied.clear();
            tied.push(candidate);
        } else if score == best_score {
            tied.push(candidate);
        }
    }

    let Some(dialect) = dialect else {
        return Ok(tied.first().copied().unwrap_or(first));
    };

    let mut winner = tied.first().copied().unwrap_or(first);
    let mut best_dialect = 0;
    for candidate in tied {
        let score = candidate.dialect_score(dialect);
        if score > best_dialect {
            best_dialect = score;
            winner = candidate;
        }
    }
    Ok(winner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn en() -> ModuleLanguage {
        ModuleLanguage::new("en").with_iso639_3("eng")
    }

    fn en_gb() -> ModuleLanguage {
        ModuleLanguage::new("en")
            .with_iso639_3("eng")
            .with_iso3166_1("GB")
    }

    fn sv() -> ModuleLanguage {
        ModuleLanguage::new("sv").with_iso639_3("swe")
    }

    #[test]
    fn test_dialect_narrows_tied_languages() {
        let candidates = vec![en(), en_gb(), sv()];
        let result = best_match(&candidates, "eng", Some("GB")).unwrap();
        assert_eq!(result, &en_gb());
    }

    #[test]
    fn test_unmatched_query_falls_back_to_first() {
        let candidates = vec![en(), sv()];
        let result = best_match(&candidates, "fr", None).unwrap();
        assert_eq!(result, &en());
    }

    #[test]
    fn test_best_match_is_deterministic() {
        let candidates = vec![sv(), en_gb(), en()];
        let a = best_match(&candidates, "en", Some("US")).unwrap();
        let b = best_match(&candidates, "en", Some("US")).unwrap();
        assert_eq!(a, b);
        // No dialect hit: first of the tie-set
        assert_eq!(a, &en_gb());
    }

    #[test]
    fn test_custom_dialect_outscores_codes() {
        let scouse = ModuleLanguage::new("en")
            .with_iso639_3("eng")
            .with_custom_dialect("scouse");
        let candidates = vec![en(), scouse.clone()];
        assert_eq!(best_match(&candidates, "SCOUSE", None).unwrap(), &scouse);
    }

    #[test]
    fn test_higher_score_resets_tie_set() {
        let glotto = ModuleLanguage::new("sv").with_glottocode("swed1254");
        let candidates = vec![sv(), glotto.clone(), sv().with_iso3166_1("FI")];
        // The FI record was dropped from the tie-set, so the dialect cannot pick it
        let result = best_match(&candidates, "swed1254", Some("FI")).unwrap();
        assert_eq!(result, &glotto);
    }

    #[test]
    fn test_subdivision_beats_country() {
        let gb = en_gb();
        let scotland = en_gb().with_iso3166_2("GB-SCT");
        let candidates = vec![gb.clone(), scotland.clone()];
        assert_eq!(best_match(&candidates, "en", Some("gb-sct")).unwrap(), &scotland);
        assert_eq!(best_match(&candidates, "en", Some("GB")).unwrap(), &gb);
    }

    #[test]
    fn test_empty_candidates_is_an_error() {
        let result = best_match(&[], "eng", None);
        assert_eq!(result, Err(LanguageError::NoCandidates("eng".to_string())));
    }

    #[test]
    fn test_matches_code_is_case_insensitive() {
        let lang = en();
        assert!(lang.matches_code("ENG"));
        assert!(lang.matches_code("En"));
        assert!(!lang.matches_code("swe"));
    }

    #[test]
    fn test_deserialize_optional_fields() {
        let lang: ModuleLanguage =
            serde_json::from_str(r#"{"iso639_2": "sv", "iso3166_1": "FI"}"#).unwrap();
        assert_eq!(lang, ModuleLanguage::new("sv").with_iso3166_1("FI"));
        assert!(lang.validate().is_ok());
        assert!(ModuleLanguage::new(" ").validate().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(en_gb().to_string(), "eng-GB");
        assert_eq!(ModuleLanguage::new("sv").to_string(), "sv");
    }
}
