//! Registry module - the installed-pack manifest and its queries.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`manifest`] | Serde types for the manifest document |
//! | `pack_registry` | [`PackRegistry`] queries, refresh and [`ModuleEntry`] |
//!
//! ```rust,no_run
//! use voxpack_core::event_bus::EventBus;
//! use voxpack_core::registry::PackRegistry;
//!
//! let registry = PackRegistry::open("/packs/manifest.json", EventBus::new())?;
//! let entry = registry.actor_module_entry("Jenny", "high");
//! let languages = registry.supported_languages("Jenny", "high");
//! # Ok::<(), voxpack_core::registry::RegistryError>(())
//! ```

pub mod manifest;
mod pack_registry;

pub use manifest::{ActorPackRecord, LanguagePackRecord, Manifest};
pub use pack_registry::{ModuleEntry, PackRegistry, RegistryError, RegistryResult};
