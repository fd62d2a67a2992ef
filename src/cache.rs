use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::transform::TransformOutcome;

/// In-memory transform results keyed by a hash of (file id, source).
///
/// Hot reload re-submits unchanged files constantly; a hit skips the parse.
/// Nothing touches the disk so the per-file pass stays free of I/O.
#[derive(Default)]
pub struct TransformCache {
    entries: Mutex<HashMap<String, TransformOutcome>>,
}

impl TransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_hash(file_id: &str, source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(file_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, file_id: &str, source: &str) -> Option<TransformOutcome> {
        let key = Self::compute_hash(file_id, source);
        let entries = self.entries.lock().ok()?;
        entries.get(&key).cloned()
    }

    pub fn set(&self, file_id: &str, source: &str, outcome: TransformOutcome) {
        let key = Self::compute_hash(file_id, source);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, outcome);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_depends_on_id_and_source() {
        let a = TransformCache::compute_hash("a.ts", "x");
        assert_eq!(a, TransformCache::compute_hash("a.ts", "x"));
        assert_ne!(a, TransformCache::compute_hash("b.ts", "x"));
        assert_ne!(a, TransformCache::compute_hash("a.ts", "y"));
    }

    #[test]
    fn test_get_after_set() {
        let cache = TransformCache::new();
        assert!(cache.get("a.ts", "x").is_none());
        cache.set("a.ts", "x", TransformOutcome::Unchanged);
        assert_eq!(cache.get("a.ts", "x"), Some(TransformOutcome::Unchanged));
        assert_eq!(cache.len(), 1);
    }
}
