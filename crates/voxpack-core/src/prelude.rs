//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use voxpack_core::prelude::*;
//!
//! let mut context = PackContext::new(EngineConfig::default(), runtime)?;
//! context.load_actor("Jenny", "high")?;
//! ```
//!
//! # What's Included
//!
//! - [`PackContext`], [`EngineConfig`] - top-level owner and its settings
//! - [`PackRegistry`], [`ModuleEntry`] - manifest queries
//! - [`ModuleLanguage`], [`best_match`] - language resolution
//! - [`SynthesisSession`], [`Synthesizer`], [`SynthRequest`], [`DataPacket`] - streaming
//! - [`VoxpackError`], [`VoxpackResult`] - unified errors

// ============================================================================
// Context & Configuration
// ============================================================================

pub use crate::config::EngineConfig;
pub use crate::context::{ActorKey, ActorLoad, LoadStep, LoadedActor, PackContext};
pub use crate::event_bus::{EventBus, PackEvent};

// ============================================================================
// Registry, Modules & Languages
// ============================================================================

pub use crate::language::{best_match, ModuleLanguage};
pub use crate::module::{ActorModule, LanguageModule, Module};
pub use crate::registry::{ModuleEntry, PackRegistry};

// ============================================================================
// Runtime & Lookup
// ============================================================================

pub use crate::lookup::{LookupCache, RuntimeLookupTable};
pub use crate::runtime_adapter::{BackendKind, BindingCache, ExecutionContext, ModelRuntime};

// ============================================================================
// Streaming
// ============================================================================

pub use crate::streaming::{
    DataPacket, PacketMetadata, SessionState, SynthRequest, SynthesisSession, Synthesizer,
};

// ============================================================================
// Error Types
// ============================================================================

pub use crate::error::{VoxpackError, VoxpackResult};
