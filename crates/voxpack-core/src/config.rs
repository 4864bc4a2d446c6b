//! Engine configuration.
//!
//! Loaded from JSON or YAML; every field is optional in the file.
//!
//! ```yaml
//! manifest_path: /opt/voices/manifest.json
//! sample_rate: 22050
//! buffer_secs: 0.25
//! backend: gpu
//! ```

use crate::runtime_adapter::BackendKind;
use crate::streaming::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings shared by the pack context and synthesis sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Installed-pack manifest.
    pub manifest_path: PathBuf,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Seconds of audio buffered before packets are delivered.
    pub buffer_secs: f32,
    /// Preferred backend for non-preprocessing models.
    pub backend: BackendKind,
    /// Lines read per lookup-table loading step.
    pub lookup_batch_lines: usize,
    /// Recompute SHA-256 of module files before binding.
    pub verify_hashes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            manifest_path: Self::default_manifest_path(),
            sample_rate: 24000,
            buffer_secs: 0.5,
            backend: BackendKind::Cpu,
            lookup_batch_lines: 4096,
            verify_hashes: false,
        }
    }
}

impl EngineConfig {
    /// `~/.voxpack/manifest.json`, or a relative path when there is no home
    /// directory.
    pub fn default_manifest_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".voxpack")
            .join("manifest.json")
    }

    /// Loads a config file; the extension picks the format.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        let config = match extension.as_deref() {
            Some("json") => Self::from_json_str(&content)?,
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        log::debug!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".to_string()));
        }
        if !(self.buffer_secs.is_finite() && self.buffer_secs > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "buffer_secs must be positive, got {}",
                self.buffer_secs
            )));
        }
        if self.lookup_batch_lines == 0 {
            return Err(ConfigError::Invalid(
                "lookup_batch_lines must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = path.into();
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_buffer_secs(mut self, buffer_secs: f32) -> Self {
        self.buffer_secs = buffer_secs;
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_lookup_batch_lines(mut self, lines: usize) -> Self {
        self.lookup_batch_lines = lines;
        self
    }

    pub fn with_verify_hashes(mut self, verify: bool) -> Self {
        self.verify_hashes = verify;
        self
    }

    /// Session defaults derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            sample_rate: self.sample_rate,
            buffer_secs: self.buffer_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 24000);
        assert_eq!(config.buffer_secs, 0.5);
        assert_eq!(config.backend, BackendKind::Cpu);
        assert!(config.manifest_path.ends_with(".voxpack/manifest.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let config = EngineConfig::from_yaml_str("sample_rate: 44100\nbackend: gpu\n").unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.backend, BackendKind::Gpu);
        assert_eq!(config.lookup_batch_lines, 4096);
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = TempDir::new().unwrap();
        let json = dir.path().join("engine.json");
        fs::write(&json, r#"{"buffer_secs": 0.25, "verify_hashes": true}"#).unwrap();
        let config = EngineConfig::from_file(&json).unwrap();
        assert_eq!(config.buffer_secs, 0.25);
        assert!(config.verify_hashes);

        let yml = dir.path().join("engine.yml");
        fs::write(&yml, "lookup_batch_lines: 8\n").unwrap();
        assert_eq!(EngineConfig::from_file(&yml).unwrap().lookup_batch_lines, 8);

        let toml = dir.path().join("engine.toml");
        fs::write(&toml, "").unwrap();
        assert!(matches!(
            EngineConfig::from_file(&toml),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_rejects_non_positive_values() {
        assert!(EngineConfig::from_json_str(r#"{"sample_rate": 0}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"buffer_secs": -1.0}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"lookup_batch_lines": 0}"#).is_err());
    }

    #[test]
    fn test_session_config() {
        let session = EngineConfig::default()
            .with_sample_rate(44100)
            .with_buffer_secs(0.5)
            .session_config();
        assert_eq!(session.sample_rate, 44100);
        assert_eq!(session.buffer_secs, 0.5);
    }
}
