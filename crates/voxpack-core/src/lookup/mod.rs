//! Two-tier pronunciation lookup cache.
//!
//! Each language module may ship a static word → pronunciation table. The
//! [`LookupCache`] keeps one [`RuntimeLookupTable`] per distinct table hash,
//! so modules that share a table file share one in-memory copy. A lookup miss
//! is not an error: it tells the caller to run the full phonemizer.

use crate::event_bus::{EventBus, PackEvent};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;
mod table;

pub use loader::StaticTableLoader;
pub use table::RuntimeLookupTable;

/// Error type for lookup-table loading.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Failed to read lookup table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for lookup-table loading.
pub type LookupResult<T> = Result<T, LookupError>;

/// Registry of lookup tables keyed by content hash.
#[derive(Debug, Default)]
pub struct LookupCache {
    tables: HashMap<String, RuntimeLookupTable>,
    events: EventBus,
}

impl LookupCache {
    pub fn new(events: EventBus) -> Self {
        Self {
            tables: HashMap::new(),
            events,
        }
    }

    /// Loads the table at `path` under `hash` in one step.
    ///
    /// Returns `Ok(false)` without touching the file when `hash` is already
    /// registered.
    pub fn register(&mut self, hash: &str, path: &Path, batch_lines: usize) -> LookupResult<bool> {
        match self.register_incremental(hash, path, batch_lines)? {
            Some(loader) => self.finish_incremental(hash, loader),
            None => Ok(false),
        }
    }

    /// Starts loading the table at `path` in line batches.
    ///
    /// Returns `None` when `hash` is already registered. Drive the loader,
    /// then hand it to [`finish_incremental`](Self::finish_incremental).
    pub fn register_incremental(
        &self,
        hash: &str,
        path: &Path,
        batch_lines: usize,
    ) -> LookupResult<Option<StaticTableLoader>> {
        if self.tables.contains_key(hash) {
            log::debug!("Lookup table {} already registered", hash);
            return Ok(None);
        }
        StaticTableLoader::open(path, batch_lines).map(Some)
    }

    /// Completes an incremental load and registers the table.
    ///
    /// Returns `Ok(false)` if another load registered `hash` in the meantime.
    pub fn finish_incremental(
        &mut self,
        hash: &str,
        loader: StaticTableLoader,
    ) -> LookupResult<bool> {
        let table = loader.into_table()?;
        Ok(self.insert(hash, table))
    }

    /// Registers an already built table. No-op if `hash` is present.
    pub fn insert(&mut self, hash: &str, table: RuntimeLookupTable) -> bool {
        if self.tables.contains_key(hash) {
            return false;
        }
        let entries = table.static_len();
        self.tables.insert(hash.to_string(), table);
        log::info!("Registered lookup table {} ({} entries)", hash, entries);
        self.events.publish(PackEvent::LookupTableRegistered {
            hash: hash.to_string(),
            entries,
        });
        true
    }

    /// Removes the table registered under `hash`.
    pub fn deregister(&mut self, hash: &str) -> bool {
        let removed = self.tables.remove(hash).is_some();
        if removed {
            log::debug!("Deregistered lookup table {}", hash);
            self.events.publish(PackEvent::LookupTableDeregistered {
                hash: hash.to_string(),
            });
        }
        removed
    }

    /// Drops every table.
    pub fn reset(&mut self) {
        if !self.tables.is_empty() {
            log::info!("Clearing {} lookup tables", self.tables.len());
        }
        self.tables.clear();
    }

    pub fn get(&self, hash: &str) -> Option<&RuntimeLookupTable> {
        self.tables.get(hash)
    }

    pub fn get_mut(&mut self, hash: &str) -> Option<&mut RuntimeLookupTable> {
        self.tables.get_mut(hash)
    }

    /// Looks `key` up in the table registered under `hash`.
    pub fn try_get(&self, hash: &str, key: &str) -> Option<&str> {
        self.tables.get(hash)?.try_get(key)
    }

    /// Records a runtime pronunciation. Returns `false` if `hash` is not
    /// registered.
    pub fn add_or_update(&mut self, hash: &str, key: &str, value: &str) -> bool {
        match self.tables.get_mut(hash) {
            Some(table) => {
                table.add_or_update(key, value);
                true
            }
            None => {
                log::warn!("Cannot memoize '{}': lookup table {} not registered", key, hash);
                false
            }
        }
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.tables.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn table_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("lexicon.tsv");
        fs::write(&path, "read\tɹiːd\nlive\tlɪv\n").unwrap();
        path
    }

    #[test]
    fn test_register_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = table_file(&dir);
        let mut cache = LookupCache::default();

        assert!(cache.register("h1", &path, 64).unwrap());
        cache.add_or_update("h1", "voxel", "vɑksəl");

        fs::remove_file(&path).unwrap();
        assert!(!cache.register("h1", &path, 64).unwrap());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.try_get("h1", "voxel"), Some("vɑksəl"));
    }

    #[test]
    fn test_lookup_precedence() {
        let dir = TempDir::new().unwrap();
        let mut cache = LookupCache::default();
        cache.register("h1", &table_file(&dir), 64).unwrap();

        cache.add_or_update("h1", "read", "ɹɛd");
        assert_eq!(cache.try_get("h1", "read"), Some("ɹiːd"));

        assert_eq!(cache.try_get("h1", "voxel"), None);
        cache.add_or_update("h1", "voxel", "vɑksəl");
        assert_eq!(cache.try_get("h1", "voxel"), Some("vɑksəl"));
    }

    #[test]
    fn test_incremental_registration() {
        let dir = TempDir::new().unwrap();
        let path = table_file(&dir);
        let events = EventBus::new();
        let subscription = events.subscribe();
        let mut cache = LookupCache::new(events);

        let mut loader = cache.register_incremental("h1", &path, 1).unwrap().unwrap();
        assert_eq!(loader.next().unwrap().unwrap(), 1);
        assert!(!cache.contains("h1"));

        assert!(cache.finish_incremental("h1", loader).unwrap());
        assert_eq!(cache.get("h1").unwrap().static_len(), 2);
        assert!(cache.register_incremental("h1", &path, 1).unwrap().is_none());

        assert_eq!(
            subscription.drain(),
            vec![PackEvent::LookupTableRegistered {
                hash: "h1".to_string(),
                entries: 2
            }]
        );
    }

    #[test]
    fn test_deregister_and_reset() {
        let dir = TempDir::new().unwrap();
        let path = table_file(&dir);
        let mut cache = LookupCache::default();
        cache.register("h1", &path, 64).unwrap();
        cache.register("h2", &path, 64).unwrap();

        assert!(cache.deregister("h1"));
        assert!(!cache.deregister("h1"));
        assert!(!cache.add_or_update("h1", "a", "b"));
        assert!(cache.contains("h2"));

        cache.reset();
        assert!(cache.is_empty());
    }
}
