//! StateSnapshot: the plain-data tree persisted, undone and stored as presets.
//!
//! ```json
//! { "expanded": true,
//!   "children": {
//!     "experience": { "expanded": true, "children": {
//!       "scale": 1.5, "tint": "{\"r\":1,\"g\":0,\"b\":0}",
//!       "offset": { "expanded": false, "children": { "x": 0, "y": 1, "z": 0 } } } } } }
//! ```
//!
//! Entries live under `children` so a parameter or file named `expanded`
//! cannot collide with the folder's own flag.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    Bool(bool),
    Number(f64),
    /// Colors, as a JSON `{r,g,b}` string.
    Text(String),
    Folder(FolderSnapshot),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FolderSnapshot {
    /// `None` leaves the folder's expansion as it is when applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
    #[serde(default, rename = "children")]
    pub entries: BTreeMap<String, SnapshotValue>,
}

/// The root folder of a snapshot.
pub type StateSnapshot = FolderSnapshot;

impl FolderSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&SnapshotValue> {
        self.entries.get(name)
    }

    pub fn folder(&self, name: &str) -> Option<&FolderSnapshot> {
        match self.entries.get(name) {
            Some(SnapshotValue::Folder(folder)) => Some(folder),
            _ => None,
        }
    }

    /// Nested folder, created on demand. A non-folder entry under the same
    /// name is replaced.
    pub fn folder_mut(&mut self, name: &str) -> &mut FolderSnapshot {
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| SnapshotValue::Folder(FolderSnapshot::default()));
        if !matches!(entry, SnapshotValue::Folder(_)) {
            *entry = SnapshotValue::Folder(FolderSnapshot::default());
        }
        match entry {
            SnapshotValue::Folder(folder) => folder,
            _ => unreachable!("entry was just made a folder"),
        }
    }

    pub fn insert(&mut self, name: &str, value: SnapshotValue) {
        self.entries.insert(name.to_string(), value);
    }

    /// Looks up `group / name [/ component]`.
    pub fn lookup(&self, group: &str, name: &str, component: Option<&str>) -> Option<&SnapshotValue> {
        let group = self.folder(group)?;
        match component {
            Some(axis) => group.folder(name)?.get(axis),
            None => group.get(name),
        }
    }

    /// Sets `group / name [/ component]` unless a value is already there.
    pub fn insert_missing(
        &mut self,
        group: &str,
        name: &str,
        component: Option<&str>,
        value: SnapshotValue,
    ) {
        let group = self.folder_mut(group);
        let (folder, key) = match component {
            Some(axis) => (group.folder_mut(name), axis),
            None => (group, name),
        };
        folder.entries.entry(key.to_string()).or_insert(value);
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_snapshot() {
        let json = r#"{"expanded":true,"children":{"experience":{"expanded":false,"children":{
            "scale":1.5,"on":true,"tint":"{\"r\":1,\"g\":0,\"b\":0}",
            "offset":{"children":{"x":0,"y":1}}}}}}"#;
        let snapshot = StateSnapshot::from_json(json).unwrap();
        assert_eq!(snapshot.expanded, Some(true));
        let group = snapshot.folder("experience").unwrap();
        assert_eq!(group.expanded, Some(false));
        assert_eq!(group.get("scale"), Some(&SnapshotValue::Number(1.5)));
        assert_eq!(group.get("on"), Some(&SnapshotValue::Bool(true)));
        assert_eq!(
            group.get("tint"),
            Some(&SnapshotValue::Text(r#"{"r":1,"g":0,"b":0}"#.to_string()))
        );
        assert_eq!(
            snapshot.lookup("experience", "offset", Some("y")),
            Some(&SnapshotValue::Number(1.0))
        );
        assert_eq!(group.folder("offset").unwrap().expanded, None);
    }

    #[test]
    fn test_json_round_trip() {
        let mut snapshot = StateSnapshot::new();
        snapshot.expanded = Some(true);
        snapshot.insert_missing("g", "a", None, SnapshotValue::Number(2.0));
        snapshot.insert_missing("g", "v", Some("x"), SnapshotValue::Number(3.0));
        let back = StateSnapshot::from_json(&snapshot.to_json()).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_insert_missing_keeps_existing() {
        let mut snapshot = StateSnapshot::new();
        snapshot.insert_missing("g", "a", None, SnapshotValue::Number(1.0));
        snapshot.insert_missing("g", "a", None, SnapshotValue::Number(9.0));
        assert_eq!(snapshot.lookup("g", "a", None), Some(&SnapshotValue::Number(1.0)));
    }

    #[test]
    fn test_entry_named_expanded_keeps_its_own_slot() {
        let mut snapshot = StateSnapshot::new();
        snapshot.expanded = Some(true);
        snapshot.folder_mut("expanded").expanded = Some(false);
        snapshot.insert_missing("expanded", "expanded", None, SnapshotValue::Number(2.5));

        let json = snapshot.to_json();
        assert_eq!(
            json,
            r#"{"expanded":true,"children":{"expanded":{"expanded":false,"children":{"expanded":2.5}}}}"#
        );
        let back = StateSnapshot::from_json(&json).unwrap();
        assert_eq!(back.lookup("expanded", "expanded", None), Some(&SnapshotValue::Number(2.5)));
        assert_eq!(back.folder("expanded").unwrap().expanded, Some(false));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(StateSnapshot::from_json("{not json").is_err());
    }
}
