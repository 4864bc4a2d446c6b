//! On-disk pack installs for tests.
//!
//! [`write_pack_install`] lays out:
//!
//! ```text
//! manifest.json
//! jenny/config.json     ACTORPACK: jenny_high, jenny_low (shared encoder)
//! jenny/*.onnx
//! english/config.json   LANGUAGEPACK: eng (g2p model + lookup table)
//! english/g2p.onnx
//! english/lexicon.tsv
//! ```
//!
//! `jenny_high` requires the `eng` and `swe` language modules; only `eng` is
//! installed. File hashes are real SHA-256 digests.

use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const ENCODER_BYTES: &[u8] = b"shared encoder weights";
pub const DECODER_HIGH_BYTES: &[u8] = b"decoder weights (high)";
pub const DECODER_LOW_BYTES: &[u8] = b"decoder weights (low)";
pub const G2P_BYTES: &[u8] = b"english g2p weights";
pub const LEXICON: &str = "# word\tpronunciation\nhello\thəloʊ\nread\tɹiːd\ncat\tkæt\n";

/// Paths and hashes of a written install.
#[derive(Debug, Clone)]
pub struct PackInstall {
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub encoder_hash: String,
    pub decoder_high_hash: String,
    pub decoder_low_hash: String,
    pub g2p_hash: String,
    pub lexicon_hash: String,
}

/// Lower-case hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Writes the two-pack install under `root`.
pub fn write_pack_install(root: &Path) -> io::Result<PackInstall> {
    let install = PackInstall {
        root: root.to_path_buf(),
        manifest_path: root.join("manifest.json"),
        encoder_hash: sha256_hex(ENCODER_BYTES),
        decoder_high_hash: sha256_hex(DECODER_HIGH_BYTES),
        decoder_low_hash: sha256_hex(DECODER_LOW_BYTES),
        g2p_hash: sha256_hex(G2P_BYTES),
        lexicon_hash: sha256_hex(LEXICON.as_bytes()),
    };

    let jenny = root.join("jenny");
    let english = root.join("english");
    fs::create_dir_all(&jenny)?;
    fs::create_dir_all(&english)?;

    fs::write(jenny.join("encoder.onnx"), ENCODER_BYTES)?;
    fs::write(jenny.join("decoder_high.onnx"), DECODER_HIGH_BYTES)?;
    fs::write(jenny.join("decoder_low.onnx"), DECODER_LOW_BYTES)?;
    fs::write(english.join("g2p.onnx"), G2P_BYTES)?;
    fs::write(english.join("lexicon.tsv"), LEXICON)?;

    write_json(&install.manifest_path, &manifest())?;
    write_json(&jenny.join("config.json"), &actor_config(&install))?;
    write_json(&english.join("config.json"), &language_config(&install))?;
    Ok(install)
}

fn write_json(path: &Path, value: &serde_json::Value) -> io::Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    fs::write(path, text)
}

fn manifest() -> serde_json::Value {
    json!({
        "actor_packs": {
            "jenny_high": {
                "actors": ["Jenny"],
                "quality": "high",
                "languages": [
                    {"iso639_2": "en", "iso639_3": "eng", "iso3166_1": "GB"},
                    {"iso639_2": "sv", "iso639_3": "swe"}
                ],
                "required_language_modules": ["eng", "swe"],
                "jsonpath": "jenny/config.json",
                "packname": "jenny-pack"
            },
            "jenny_low": {
                "actors": ["Jenny"],
                "quality": "low",
                "required_language_modules": ["eng"],
                "jsonpath": "jenny/config.json",
                "packname": "jenny-pack"
            }
        },
        "language_packs": {
            "eng": {
                "languages": [{"iso639_2": "en", "iso639_3": "eng"}],
                "jsonpath": "english/config.json",
                "packname": "english-pack"
            }
        }
    })
}

fn actor_config(install: &PackInstall) -> serde_json::Value {
    let phonemes = json!({"h": 1, "ə": 2, "l": 3, "oʊ": 4, "k": 5, "æ": 6, "t": 7, "ɹ": 8, "iː": 9});
    let languages = json!([
        {"key": 0, "language": {"iso639_2": "en", "iso639_3": "eng", "iso3166_1": "GB"}, "submodule": "eng"},
        {"key": 1, "language": {"iso639_2": "sv", "iso639_3": "swe"}, "submodule": "swe"}
    ]);
    json!({
        "type": "ACTORPACK",
        "version": "1.0.0",
        "files": {
            install.encoder_hash.clone(): "encoder.onnx",
            install.decoder_high_hash.clone(): "decoder_high.onnx",
            install.decoder_low_hash.clone(): "decoder_low.onnx"
        },
        "modules": [
            {
                "id": "jenny_high",
                "sentisfiles": {
                    "preprocess_encoder": install.encoder_hash,
                    "decoder": install.decoder_high_hash
                },
                "chunk_length": 256,
                "phoneme_vocabulary": phonemes,
                "languages": languages,
                "actors": {"Jenny": 0}
            },
            {
                "id": "jenny_low",
                "sentisfiles": {
                    "preprocess_encoder": install.encoder_hash,
                    "decoder": install.decoder_low_hash
                },
                "chunk_length": 128,
                "phoneme_vocabulary": phonemes,
                "languages": languages,
                "actors": {"Jenny": 0}
            }
        ]
    })
}

fn language_config(install: &PackInstall) -> serde_json::Value {
    json!({
        "type": "LANGUAGEPACK",
        "version": "1.0.0",
        "files": {
            install.g2p_hash.clone(): "g2p.onnx",
            install.lexicon_hash.clone(): "lexicon.tsv"
        },
        "modules": [{
            "id": "eng",
            "files": {"lookup_table": install.lexicon_hash},
            "sentisfiles": {"g2p": install.g2p_hash},
            "grapheme_vocabulary": {"^": 0, "$": 1, "a": 2, "c": 3, "d": 4, "e": 5, "h": 6, "l": 7, "o": 8, "r": 9, "t": 10},
            "phoneme_vocabulary": {"h": 1, "ə": 2, "l": 3, "oʊ": 4, "k": 5, "æ": 6, "t": 7, "ɹ": 8, "iː": 9, "d": 10},
            "language": {"iso639_2": "en", "iso639_3": "eng"},
            "lookup_table_size": 3
        }]
    })
}
