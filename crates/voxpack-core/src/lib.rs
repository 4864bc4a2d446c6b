//! Voxpack Core - pack registry, model binding and synthesis sessions for a
//! real-time speech-synthesis pipeline.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voxpack_core::prelude::*;
//!
//! let runtime = std::sync::Arc::new(voxpack_core::runtime_adapter::onnx::OnnxRuntime::new());
//! let mut context = PackContext::new(EngineConfig::default(), runtime)?;
//! let actor = context.load_actor("Jenny", "high")?;
//! let language = context.resolve_language("Jenny", "high", "eng", Some("GB"))?;
//! ```
//!
//! ## Module Organization
//!
//! ### Packs
//! - [`registry`] - installed-pack manifest and its queries
//! - [`module`] - actor and language modules parsed from pack configs
//! - [`language`] - language/dialect identity and best-match resolution
//!
//! ### Runtime
//! - [`runtime_adapter`] - model runtime capability and the binding cache
//! - [`lookup`] - two-tier pronunciation lookup cache
//! - [`streaming`] - synthesis session admission and buffered output
//!
//! ### Glue
//! - [`context`] - [`PackContext`](context::PackContext), the explicit owner of all of the above
//! - [`event_bus`] - change and completion notifications
//! - [`config`] - engine configuration

/// Common imports for voxpack-core users.
pub mod prelude;

/// Unified error types.
pub mod error;
pub use error::{VoxpackError, VoxpackResult};

/// Engine configuration (JSON/YAML)
pub mod config;

// ============================================================================
// Packs
// ============================================================================

pub mod language;
pub mod module;
pub mod registry;

// ============================================================================
// Runtime
// ============================================================================

pub mod lookup;
pub mod runtime_adapter;
pub mod streaming;

// ============================================================================
// Glue
// ============================================================================

pub mod context;
pub mod event_bus;

/// Mocks and fixtures for tests.
pub mod testing;
