//! Unified error type for the voxpack-core public API.
//!
//! Subsystems keep their own error enums and convert to [`VoxpackError`]
//! at the [`PackContext`](crate::context::PackContext) boundary.
//!
//! ```text
//! VoxpackError
//! ├── Registry(RegistryError)   -- manifest IO/parse, actor module missing
//! ├── Module(ModuleError)       -- structural config errors
//! ├── Runtime(RuntimeError)     -- model load / context / inference
//! ├── Lookup(LookupError)       -- lookup table IO
//! ├── Session(SessionError)     -- synthesis runs
//! ├── Language(LanguageError)   -- language resolution
//! ├── Config(ConfigError)
//! └── Io(std::io::Error)
//! ```

use crate::config::ConfigError;
use crate::language::LanguageError;
use crate::lookup::LookupError;
use crate::module::ModuleError;
use crate::registry::RegistryError;
use crate::runtime_adapter::RuntimeError;
use crate::streaming::SessionError;
use thiserror::Error;

/// The canonical error type for voxpack-core.
#[derive(Error, Debug)]
pub enum VoxpackError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Language error: {0}")]
    Language(#[from] LanguageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using [`VoxpackError`].
pub type VoxpackResult<T> = Result<T, VoxpackError>;
