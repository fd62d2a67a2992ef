//! Key/value persistence behind the controller (browser `localStorage` in the
//! host page; an in-memory map everywhere else).

use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RuntimeError;

pub const STATE_KEY: &str = "threeUniformGuiPluginState";
pub const PRESETS_KEY: &str = "threeUniformGuiPluginPresets";
pub const POSITION_KEY: &str = "threeUniformGuiPluginPosition";

pub trait Storage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
}

/// Clones share one map, so a test can keep a handle and inspect what the
/// controller wrote, or hand the same map to a second controller.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.borrow_mut().insert(key.to_string(), value);
    }
}

/// Reads and decodes a JSON record. Missing keys are `Ok(None)`.
pub fn load_json<T: DeserializeOwned>(
    storage: &dyn Storage,
    key: &str,
) -> Result<Option<T>, RuntimeError> {
    match storage.get(key) {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| RuntimeError::CorruptState {
                key: key.to_string(),
                source,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_entries() {
        let storage = MemoryStorage::new();
        let mut writer = storage.clone();
        writer.set(STATE_KEY, "{}".to_string());
        assert_eq!(storage.get(STATE_KEY).as_deref(), Some("{}"));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_load_json_reports_corruption() {
        let mut storage = MemoryStorage::new();
        assert!(load_json::<serde_json::Value>(&storage, STATE_KEY).unwrap().is_none());
        storage.set(STATE_KEY, "{oops".to_string());
        let err = load_json::<serde_json::Value>(&storage, STATE_KEY).unwrap_err();
        assert!(err.to_string().contains(STATE_KEY));
    }
}
