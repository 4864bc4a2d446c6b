use std::collections::HashMap;

/// Two-tier pronunciation memo for one lookup-table file.
///
/// The static tier comes from the language pack and is fixed once loaded.
/// The dynamic tier collects entries learned at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeLookupTable {
    static_table: HashMap<String, String>,
    dynamic_table: HashMap<String, String>,
}

impl RuntimeLookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_static(static_table: HashMap<String, String>) -> Self {
        Self {
            static_table,
            dynamic_table: HashMap::new(),
        }
    }

    /// Static tier first, then dynamic. `None` means the key needs full
    /// phonemization.
    pub fn try_get(&self, key: &str) -> Option<&str> {
        self.static_table
            .get(key)
            .or_else(|| self.dynamic_table.get(key))
            .map(String::as_str)
    }

    /// Writes `key` to the dynamic tier.
    pub fn add_or_update(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.dynamic_table.insert(key.into(), value.into());
    }

    pub fn static_len(&self) -> usize {
        self.static_table.len()
    }

    pub fn dynamic_len(&self) -> usize {
        self.dynamic_table.len()
    }

    pub fn len(&self) -> usize {
        self.static_len() + self.dynamic_len()
    }

    pub fn is_empty(&self) -> bool {
        self.static_table.is_empty() && self.dynamic_table.is_empty()
    }

    /// Forgets everything learned at runtime.
    pub fn clear_dynamic(&mut self) {
        self.dynamic_table.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RuntimeLookupTable {
        RuntimeLookupTable::from_static(HashMap::from([(
            "read".to_string(),
            "ɹiːd".to_string(),
        )]))
    }

    #[test]
    fn test_static_tier_wins() {
        let mut table = table();
        table.add_or_update("read", "ɹɛd");
        assert_eq!(table.try_get("read"), Some("ɹiːd"));
        assert_eq!(table.dynamic_len(), 1);
    }

    #[test]
    fn test_dynamic_entry_visible() {
        let mut table = table();
        assert_eq!(table.try_get("voxel"), None);
        table.add_or_update("voxel", "vɑksəl");
        assert_eq!(table.try_get("voxel"), Some("vɑksəl"));

        table.add_or_update("voxel", "vɒksəl");
        assert_eq!(table.try_get("voxel"), Some("vɒksəl"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_clear_dynamic_keeps_static() {
        let mut table = table();
        table.add_or_update("voxel", "vɑksəl");
        table.clear_dynamic();
        assert_eq!(table.try_get("voxel"), None);
        assert_eq!(table.try_get("read"), Some("ɹiːd"));
    }
}
