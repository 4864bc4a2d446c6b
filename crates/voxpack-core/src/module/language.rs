//! Language modules: phonemization resources for one language.

use super::{
    BoundaryTokens, Decoded, Encoded, Module, ModuleError, ModuleFile, ModuleRecord, ModuleResult,
    PackType, Vocabulary,
};
use crate::language::ModuleLanguage;
use crate::registry::ModuleEntry;

/// Internal file name of a language module's pronunciation table.
pub const LOOKUP_TABLE_FILE: &str = "lookup_table";

/// Module of a language pack.
#[derive(Debug, Clone)]
pub struct LanguageModule {
    module: Module,
    language: ModuleLanguage,
    grapheme_vocabulary: Vocabulary,
    phoneme_vocabulary: Vocabulary,
    boundary_tokens: BoundaryTokens,
    lookup_table_size: usize,
}

impl LanguageModule {
    /// Reads the language module behind `entry`.
    pub fn load(entry: &ModuleEntry) -> ModuleResult<Self> {
        let (module, record) = Module::load(entry, PackType::Language)?;
        Self::from_parts(module, record)
    }

    pub(crate) fn from_parts(module: Module, record: ModuleRecord) -> ModuleResult<Self> {
        let module_id = module.module_id().to_string();
        let require = |vocabulary: Option<Vocabulary>, kind: &'static str| {
            vocabulary
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ModuleError::MissingVocabulary {
                    module_id: module_id.clone(),
                    kind,
                })
        };
        let grapheme_vocabulary = require(record.grapheme_vocabulary, "grapheme")?;
        let phoneme_vocabulary = require(record.phoneme_vocabulary, "phoneme")?;

        let language = record.language.ok_or_else(|| ModuleError::MissingLanguage {
            module_id: module_id.clone(),
        })?;
        language.validate().map_err(|source| ModuleError::Language {
            module_id: module_id.clone(),
            source,
        })?;

        Ok(Self {
            module,
            language,
            grapheme_vocabulary,
            phoneme_vocabulary,
            boundary_tokens: record.boundary_tokens.unwrap_or_default(),
            lookup_table_size: record.lookup_table_size,
        })
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn module_id(&self) -> &str {
        self.module.module_id()
    }

    pub fn language(&self) -> &ModuleLanguage {
        &self.language
    }

    pub fn grapheme_vocabulary(&self) -> &Vocabulary {
        &self.grapheme_vocabulary
    }

    pub fn phoneme_vocabulary(&self) -> &Vocabulary {
        &self.phoneme_vocabulary
    }

    pub fn boundary_tokens(&self) -> &BoundaryTokens {
        &self.boundary_tokens
    }

    /// Declared number of entries in the pronunciation table.
    pub fn lookup_table_size(&self) -> usize {
        self.lookup_table_size
    }

    /// The pronunciation table file, if the module ships one.
    pub fn lookup_table(&self) -> Option<&ModuleFile> {
        self.module.file(LOOKUP_TABLE_FILE)
    }

    pub fn encode_graphemes(&self, text: &str) -> Encoded {
        let encoded = self.grapheme_vocabulary.encode_chars(text);
        self.warn_unmatched("graphemes", &encoded.unmatched, text);
        encoded
    }

    pub fn encode_phonemes(&self, text: &str) -> Encoded {
        let encoded = self.phoneme_vocabulary.encode_symbols(text);
        self.warn_unmatched("phonemes", &encoded.unmatched, text);
        encoded
    }

    pub fn decode_phonemes(&self, ids: &[i64]) -> Decoded {
        let decoded = self.phoneme_vocabulary.decode(ids);
        if !decoded.unmatched.is_empty() {
            log::warn!(
                "Module '{}': unknown phoneme ids at {:?}",
                self.module_id(),
                decoded.unmatched
            );
        }
        decoded
    }

    /// Wraps `text` in the vocabulary's start and end tokens.
    pub fn insert_string_boundaries(&self, text: &str) -> String {
        let BoundaryTokens { start, end } = &self.boundary_tokens;
        let mut bounded = String::with_capacity(start.len() + text.len() + end.len());
        bounded.push_str(start);
        bounded.push_str(text);
        bounded.push_str(end);
        bounded
    }

    fn warn_unmatched(&self, kind: &str, unmatched: &[usize], text: &str) {
        if !unmatched.is_empty() {
            log::warn!(
                "Module '{}': dropped unknown {} at {:?} in {:?}",
                self.module_id(),
                kind,
                unmatched,
                text
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::PackConfig;

    const CONFIG: &str = r#"{
        "type": "LANGUAGEPACK",
        "version": "1.0.0",
        "files": {"h_lex": "lexicon.tsv", "h_g2p": "g2p.onnx"},
        "modules": [{
            "id": "eng",
            "files": {"lookup_table": "h_lex"},
            "sentisfiles": {"g2p": "h_g2p"},
            "grapheme_vocabulary": {"^": 0, "$": 1, "c": 2, "a": 3, "t": 4},
            "phoneme_vocabulary": {"k": 10, "æ": 11, "t": 12, "tʃ": 13},
            "language": {"iso639_2": "en", "iso639_3": "eng"},
            "lookup_table_size": 2
        }]
    }"#;

    fn build(config: PackConfig) -> ModuleResult<LanguageModule> {
        let entry = ModuleEntry::new("eng", "/packs/eng/config.json");
        let (module, record) = Module::from_config(&entry, config, PackType::Language)?;
        LanguageModule::from_parts(module, record)
    }

    fn config() -> PackConfig {
        serde_json::from_str(CONFIG).unwrap()
    }

    #[test]
    fn test_builds_language_module() {
        let module = build(config()).unwrap();
        assert_eq!(module.language().iso639_3(), Some("eng"));
        assert_eq!(module.lookup_table_size(), 2);
        assert_eq!(module.lookup_table().unwrap().hash, "h_lex");
    }

    #[test]
    fn test_empty_vocabulary_is_structural_error() {
        let mut config = config();
        config.modules[0].grapheme_vocabulary = Some(Vocabulary::default());
        assert!(matches!(
            build(config),
            Err(ModuleError::MissingVocabulary { kind: "grapheme", .. })
        ));

        let mut config = self::config();
        config.modules[0].phoneme_vocabulary = None;
        assert!(matches!(
            build(config),
            Err(ModuleError::MissingVocabulary { kind: "phoneme", .. })
        ));
    }

    #[test]
    fn test_missing_language() {
        let mut config = config();
        config.modules[0].language = None;
        assert!(matches!(build(config), Err(ModuleError::MissingLanguage { .. })));
    }

    #[test]
    fn test_codecs() {
        let module = build(config()).unwrap();

        let bounded = module.insert_string_boundaries("cat");
        assert_eq!(bounded, "^cat$");
        assert_eq!(module.encode_graphemes(&bounded).ids, vec![0, 2, 3, 4, 1]);

        let encoded = module.encode_graphemes("cab");
        assert_eq!(encoded.ids, vec![2, 3]);
        assert_eq!(encoded.unmatched, vec![2]);

        assert_eq!(module.encode_phonemes("tʃ").ids, vec![13]);
        assert_eq!(module.encode_phonemes("kæt").ids, vec![10, 11, 12]);

        let decoded = module.decode_phonemes(&[10, 11, 7, 12]);
        assert_eq!(decoded.text, "kæt");
        assert_eq!(decoded.unmatched, vec![2]);
    }
}
