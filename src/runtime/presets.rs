use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::snapshot::StateSnapshot;

/// Selector entry meaning "no preset": selecting it reapplies the current state.
pub const NO_PRESET: &str = "none";

/// Named snapshots, persisted as one JSON object.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetTable {
    entries: BTreeMap<String, StateSnapshot>,
}

impl PresetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores under the trimmed name; an empty name is rejected.
    pub fn insert(&mut self, name: &str, snapshot: StateSnapshot) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.entries.insert(name.to_string(), snapshot);
        true
    }

    pub fn get(&self, name: &str) -> Option<&StateSnapshot> {
        self.entries.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_trimmed() {
        let mut table = PresetTable::new();
        assert!(table.insert("  warm ", StateSnapshot::new()));
        assert!(!table.insert("   ", StateSnapshot::new()));
        assert_eq!(table.names(), vec!["warm"]);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let mut table = PresetTable::new();
        table.insert("a", StateSnapshot::new());
        assert_eq!(serde_json::to_string(&table).unwrap(), r#"{"a":{}}"#);
        let back: PresetTable = serde_json::from_str(r#"{"a":{}}"#).unwrap();
        assert_eq!(back, table);
    }
}
