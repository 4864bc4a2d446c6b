//! End-to-end loading over an on-disk install.

use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;
use voxpack_core::event_bus::{EventBus, PackEvent};
use voxpack_core::module::{ActorModule, PackType};
use voxpack_core::prelude::*;
use voxpack_core::runtime_adapter::ModelRuntime;
use voxpack_core::testing::{write_pack_install, MockRuntime};

#[test]
fn shared_hash_is_bound_once_across_modules() {
    let dir = TempDir::new().unwrap();
    let install = write_pack_install(dir.path()).unwrap();
    let registry = PackRegistry::open(&install.manifest_path, EventBus::new()).unwrap();
    let runtime: Arc<dyn ModelRuntime> = Arc::new(MockRuntime::new());

    let high = ActorModule::load(&registry.actor_module_entry("Jenny", "high"), "Jenny").unwrap();
    let low = ActorModule::load(&registry.actor_module_entry("Jenny", "low"), "Jenny").unwrap();
    assert_eq!(high.module().pack_type(), PackType::Actor);

    let first = high
        .module()
        .create_runtime_bindings(&HashSet::new(), BackendKind::Gpu, runtime.clone())
        .unwrap();
    let loaded: HashSet<String> = first.keys().cloned().collect();
    assert!(loaded.contains(&install.encoder_hash));

    let second = low
        .module()
        .create_runtime_bindings(&loaded, BackendKind::Gpu, runtime)
        .unwrap();
    assert_eq!(second.len(), 1);
    assert!(!second.contains_key(&install.encoder_hash));
    assert!(second.contains_key(&install.decoder_low_hash));

    // encoder is a preprocessing model and stays on CPU
    assert_eq!(first[&install.encoder_hash].backend(), BackendKind::Cpu);
    assert_eq!(first[&install.decoder_high_hash].backend(), BackendKind::Gpu);
}

#[test]
fn supported_languages_only_lists_installed_requirements() {
    let dir = TempDir::new().unwrap();
    let install = write_pack_install(dir.path()).unwrap();
    let registry = PackRegistry::open(&install.manifest_path, EventBus::new()).unwrap();

    let languages = registry.supported_languages("Jenny", "high");
    assert_eq!(languages.len(), 1);
    assert_eq!(languages[0].iso639_3(), Some("eng"));
    assert!(languages.iter().all(|l| l.iso639_2() != "sv"));
    assert_eq!(registry.missing_language_packs(), vec!["swe"]);
}

#[test]
fn refresh_notifies_and_survives_bad_manifest() {
    let dir = TempDir::new().unwrap();
    let install = write_pack_install(dir.path()).unwrap();
    let events = EventBus::new();
    let subscription = events.subscribe();
    let mut registry = PackRegistry::open(&install.manifest_path, events).unwrap();

    registry.refresh().unwrap();
    assert!(matches!(
        subscription.try_recv(),
        Ok(PackEvent::ManifestRefreshed { actor_modules: 2, language_modules: 1 })
    ));

    std::fs::write(&install.manifest_path, "{ not json").unwrap();
    assert!(registry.refresh().is_err());
    assert_eq!(registry.actors(), vec!["Jenny"]);
    assert!(subscription.try_recv().is_err());
}

#[test]
fn context_loads_and_unloads_actor() {
    let dir = TempDir::new().unwrap();
    let install = write_pack_install(dir.path()).unwrap();
    let runtime = Arc::new(MockRuntime::new());
    let config = EngineConfig::default()
        .with_manifest_path(&install.manifest_path)
        .with_backend(BackendKind::Gpu);
    let mut context = PackContext::new(config, runtime.clone()).unwrap();

    let loaded = context.load_actor("Jenny", "high").unwrap();
    assert_eq!(loaded.module().actor_key(), 0);
    let en_gb = loaded.languages()[0].clone();
    assert_eq!(loaded.module().language_key(&en_gb), Some(0));
    assert_eq!(loaded.module().submodule_for(&en_gb), Some("eng"));

    let english = context.language_module("eng").unwrap();
    let bounded = english.insert_string_boundaries("cat");
    assert!(english.encode_graphemes(&bounded).is_complete());
    assert_eq!(context.lookup("eng", "cat"), Some("kæt"));

    // loading twice is a no-op
    context.load_actor("Jenny", "high").unwrap();
    assert_eq!(runtime.load_count(), 3);

    assert!(context.unload_actor("Jenny", "high"));
    assert!(context.bindings().is_empty());
    assert!(context.lookups().is_empty());
}
