//! Symbol vocabularies and their drop-and-report codecs.
//!
//! Encoding never fails: symbols missing from the vocabulary are dropped and
//! their character positions reported in [`Encoded::unmatched`], so the
//! caller can log them and carry on with the rest of the input.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of encoding text through a vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoded {
    /// Token ids of the symbols that were found, in input order.
    pub ids: Vec<i64>,
    /// Character indices (not byte offsets) of dropped symbols.
    pub unmatched: Vec<usize>,
}

impl Encoded {
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }
}

/// Result of decoding token ids back into text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    /// Positions in the id sequence that had no symbol.
    pub unmatched: Vec<usize>,
}

/// Bidirectional symbol ↔ id map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, i64>", into = "HashMap<String, i64>")]
pub struct Vocabulary {
    symbols: HashMap<String, i64>,
    inverse: HashMap<i64, String>,
}

impl From<HashMap<String, i64>> for Vocabulary {
    fn from(symbols: HashMap<String, i64>) -> Self {
        // ids shared by several symbols decode to the smallest symbol
        let mut inverse: HashMap<i64, String> = HashMap::with_capacity(symbols.len());
        for (symbol, id) in &symbols {
            match inverse.get(id) {
                Some(kept) if kept <= symbol => {}
                _ => {
                    inverse.insert(*id, symbol.clone());
                }
            }
        }
        Self { symbols, inverse }
    }
}

impl From<Vocabulary> for HashMap<String, i64> {
    fn from(vocabulary: Vocabulary) -> Self {
        vocabulary.symbols
    }
}

impl<S: Into<String>> FromIterator<(S, i64)> for Vocabulary {
    fn from_iter<I: IntoIterator<Item = (S, i64)>>(iter: I) -> Self {
        let symbols: HashMap<String, i64> =
            iter.into_iter().map(|(s, id)| (s.into(), id)).collect();
        Self::from(symbols)
    }
}

impl Vocabulary {
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn id(&self, symbol: &str) -> Option<i64> {
        self.symbols.get(symbol).copied()
    }

    pub fn symbol(&self, id: i64) -> Option<&str> {
        self.inverse.get(&id).map(String::as_str)
    }

    /// Id → symbol view of the vocabulary.
    pub fn inverse(&self) -> &HashMap<i64, String> {
        &self.inverse
    }

    /// Encodes one symbol per character.
    pub fn encode_chars(&self, text: &str) -> Encoded {
        let mut encoded = Encoded::default();
        let mut buf = [0u8; 4];
        for (index, ch) in text.chars().enumerate() {
            let symbol: &str = ch.encode_utf8(&mut buf);
            match self.symbols.get(symbol) {
                Some(id) => encoded.ids.push(*id),
                None => encoded.unmatched.push(index),
            }
        }
        encoded
    }

    /// Encodes `text` as a single symbol when the vocabulary has it (for
    /// multi-character phoneme tokens), otherwise one symbol per character.
    pub fn encode_symbols(&self, text: &str) -> Encoded {
        match self.symbols.get(text) {
            Some(id) => Encoded {
                ids: vec![*id],
                unmatched: Vec::new(),
            },
            None => self.encode_chars(text),
        }
    }

    /// Concatenates the symbols for `ids`, skipping unknown ids.
    pub fn decode(&self, ids: &[i64]) -> Decoded {
        let mut decoded = Decoded::default();
        for (index, id) in ids.iter().enumerate() {
            match self.inverse.get(id) {
                Some(symbol) => decoded.text.push_str(symbol),
                None => decoded.unmatched.push(index),
            }
        }
        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phonemes() -> Vocabulary {
        [("h", 1), ("ə", 2), ("l", 3), ("oʊ", 4), ("o", 5), ("ʊ", 6)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_whole_string_wins_over_characters() {
        let vocab = phonemes();
        assert_eq!(vocab.encode_symbols("oʊ").ids, vec![4]);
        assert_eq!(vocab.encode_chars("oʊ").ids, vec![5, 6]);
    }

    #[test]
    fn test_unmatched_characters_are_dropped_and_reported() {
        let vocab = phonemes();
        let encoded = vocab.encode_symbols("hxəl!");
        assert_eq!(encoded.ids, vec![1, 2, 3]);
        assert_eq!(encoded.unmatched, vec![1, 4]);
        assert!(!encoded.is_complete());
    }

    #[test]
    fn test_indices_are_character_positions() {
        let vocab = phonemes();
        // "ə" is two bytes; the unknown "?" is still character 2
        let encoded = vocab.encode_chars("hə?");
        assert_eq!(encoded.unmatched, vec![2]);
    }

    #[test]
    fn test_decode_reports_unknown_ids() {
        let vocab = phonemes();
        let decoded = vocab.decode(&[1, 99, 4]);
        assert_eq!(decoded.text, "hoʊ");
        assert_eq!(decoded.unmatched, vec![1]);
    }

    #[test]
    fn test_deserialize_builds_inverse() {
        let vocab: Vocabulary = serde_json::from_str(r#"{"a": 1, "b": 2}"#).unwrap();
        assert_eq!(vocab.symbol(2), Some("b"));
        assert_eq!(vocab.id("a"), Some(1));
        assert_eq!(vocab.len(), 2);
    }

    #[test]
    fn test_shared_id_decodes_to_smallest_symbol() {
        let vocab: Vocabulary = [("ɹ", 7), ("r", 7), ("t", 8)].into_iter().collect();
        assert_eq!(vocab.symbol(7), Some("r"));
        assert_eq!(vocab.decode(&[7, 8]).text, "rt");
        assert_eq!(vocab.id("ɹ"), Some(7));
    }
}
