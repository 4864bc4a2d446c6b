//! Backend selection for execution contexts.
//!
//! | Backend | Hardware | ONNX Runtime provider |
//! |---------|----------|-----------------------|
//! | `Cpu`   | CPU      | default               |
//! | `Gpu`   | GPU      | CUDA (falls back to CPU when unavailable) |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hardware backend an execution context is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// CPU execution (default, always available)
    #[default]
    Cpu,
    /// GPU execution
    Gpu,
}

impl BackendKind {
    /// Returns the name of this backend.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        }
    }

    /// Returns whether this backend requires specific hardware.
    pub fn requires_hardware(&self) -> bool {
        matches!(self, Self::Gpu)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" | "cuda" => Ok(Self::Gpu),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        assert_eq!("CPU".parse::<BackendKind>(), Ok(BackendKind::Cpu));
        assert_eq!("cuda".parse::<BackendKind>(), Ok(BackendKind::Gpu));
        assert!("tpu".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Gpu.to_string(), "gpu");
        assert_eq!(BackendKind::default(), BackendKind::Cpu);
    }

    #[test]
    fn test_serde_lowercase() {
        let backend: BackendKind = serde_json::from_str("\"gpu\"").unwrap();
        assert_eq!(backend, BackendKind::Gpu);
        assert!(backend.requires_hardware());
    }
}
