//! Testing utilities for voxpack-core.
//!
//! Mocks stand in for the model runtime and the synthesizer so registry,
//! binding and session logic can be exercised without real models. Fixtures
//! write a small but complete pack install to a directory.
//!
//! ```rust,ignore
//! use voxpack_core::testing::{fixtures, mocks};
//!
//! let dir = tempfile::TempDir::new()?;
//! let install = fixtures::write_pack_install(dir.path())?;
//! let runtime = std::sync::Arc::new(mocks::MockRuntime::new());
//! ```

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
