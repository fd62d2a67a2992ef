//! The widget tree and the binding registry it doubles as.
//!
//! ```text
//! Pane (root, "Shader Uniforms")
//!  └─ ControlGroup  one per instrumented file
//!      ├─ Control    boolean / number / color          key (group, name)
//!      └─ SubFolder  vector or texture                 key (group, name)
//!          └─ Control  one per axis (or file input)    key (group, name, axis)
//! ```

use super::snapshot::{FolderSnapshot, SnapshotValue, StateSnapshot};
use super::value::BindingTarget;
use super::widgets::{dispose_logged, Widget};
use crate::discovery::RESERVED_PRESETS_GROUP;

pub const PANE_TITLE: &str = "Shader Uniforms";

/// Registry key of a binding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingKey {
    pub group: String,
    pub name: String,
    pub component: Option<String>,
}

impl BindingKey {
    pub fn new(group: &str, name: &str) -> Self {
        BindingKey {
            group: group.to_string(),
            name: name.to_string(),
            component: None,
        }
    }

    pub fn component(group: &str, name: &str, axis: &str) -> Self {
        BindingKey {
            group: group.to_string(),
            name: name.to_string(),
            component: Some(axis.to_string()),
        }
    }

    /// The label shown next to the control.
    pub fn label(&self) -> &str {
        self.component.as_deref().unwrap_or(&self.name)
    }
}

impl std::fmt::Display for BindingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.component {
            Some(axis) => write!(f, "{}/{}.{}", self.group, self.name, axis),
            None => write!(f, "{}/{}", self.group, self.name),
        }
    }
}

pub struct Control {
    pub key: BindingKey,
    pub target: BindingTarget,
    widget: Box<dyn Widget>,
}

impl Control {
    pub fn new(key: BindingKey, target: BindingTarget, widget: Box<dyn Widget>) -> Self {
        Control { key, target, widget }
    }

    fn apply(&mut self, snapshot: &FolderSnapshot) -> bool {
        match snapshot.get(self.key.label()) {
            Some(value) if self.target.write(value) => {
                self.widget.refresh();
                true
            }
            _ => false,
        }
    }

    pub fn dispose(mut self) {
        let label = self.key.to_string();
        dispose_logged(self.widget.as_mut(), &label);
    }
}

/// Folder holding the per-axis controls of a vector, or a texture picker.
pub struct SubFolder {
    pub key: BindingKey,
    pub expanded: bool,
    widget: Box<dyn Widget>,
    controls: Vec<Control>,
}

impl SubFolder {
    pub fn new(key: BindingKey, widget: Box<dyn Widget>) -> Self {
        SubFolder {
            key,
            expanded: true,
            widget,
            controls: Vec::new(),
        }
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn dispose(mut self) {
        for control in self.controls.drain(..) {
            control.dispose();
        }
        let label = self.key.to_string();
        dispose_logged(self.widget.as_mut(), &label);
    }
}

enum Item {
    Control(Control),
    Folder(SubFolder),
}

/// A top-level item of a group and the file that registered it.
struct Entry {
    owner: String,
    item: Item,
}

impl Entry {
    fn key(&self) -> &BindingKey {
        match &self.item {
            Item::Control(c) => &c.key,
            Item::Folder(f) => &f.key,
        }
    }

    fn dispose(self) {
        match self.item {
            Item::Control(c) => c.dispose(),
            Item::Folder(f) => f.dispose(),
        }
    }
}

/// One file's folder. Several files may share a group name; each entry
/// remembers which file registered it.
pub struct ControlGroup {
    pub name: String,
    pub expanded: bool,
    /// File whose bindings are being registered now.
    pub owner: String,
    widget: Box<dyn Widget>,
    entries: Vec<Entry>,
}

impl ControlGroup {
    pub fn new(name: &str, owner: &str, widget: Box<dyn Widget>) -> Self {
        ControlGroup {
            name: name.to_string(),
            expanded: true,
            owner: owner.to_string(),
            widget,
            entries: Vec::new(),
        }
    }

    fn push(&mut self, item: Item) {
        self.entries.push(Entry {
            owner: self.owner.clone(),
            item,
        });
    }

    /// Disposes every entry registered by `owner`.
    fn release(&mut self, owner: &str) {
        let (released, kept): (Vec<Entry>, Vec<Entry>) =
            self.entries.drain(..).partition(|e| e.owner == owner);
        self.entries = kept;
        for entry in released {
            entry.dispose();
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .map(|e| match &e.item {
                Item::Control(_) => 1,
                Item::Folder(f) => 1 + f.controls.len(),
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn folder_mut(&mut self, name: &str) -> Option<&mut SubFolder> {
        self.entries.iter_mut().find_map(|e| match &mut e.item {
            Item::Folder(f) if f.key.name == name => Some(f),
            _ => None,
        })
    }

    fn serialize(&self) -> FolderSnapshot {
        let mut out = FolderSnapshot {
            expanded: Some(self.expanded),
            ..FolderSnapshot::default()
        };
        for entry in &self.entries {
            match &entry.item {
                Item::Control(c) => {
                    if let Some(value) = c.target.read() {
                        out.insert(c.key.label(), value);
                    }
                }
                Item::Folder(f) => {
                    let mut nested = FolderSnapshot {
                        expanded: Some(f.expanded),
                        ..FolderSnapshot::default()
                    };
                    for c in &f.controls {
                        if let Some(value) = c.target.read() {
                            nested.insert(c.key.label(), value);
                        }
                    }
                    out.insert(&f.key.name, SnapshotValue::Folder(nested));
                }
            }
        }
        out
    }

    fn apply(&mut self, snapshot: &FolderSnapshot) -> bool {
        if let Some(expanded) = snapshot.expanded {
            if self.expanded != expanded {
                self.expanded = expanded;
                self.widget.refresh();
            }
        }
        let mut changed = false;
        for entry in &mut self.entries {
            match &mut entry.item {
                Item::Control(c) => changed |= c.apply(snapshot),
                Item::Folder(f) => {
                    let Some(nested) = snapshot.folder(&f.key.name) else {
                        continue;
                    };
                    if let Some(expanded) = nested.expanded {
                        f.expanded = expanded;
                    }
                    for c in &mut f.controls {
                        changed |= c.apply(nested);
                    }
                }
            }
        }
        changed
    }
}

pub struct Pane {
    pub expanded: bool,
    groups: Vec<ControlGroup>,
}

impl Default for Pane {
    fn default() -> Self {
        Pane {
            expanded: true,
            groups: Vec::new(),
        }
    }
}

impl Pane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g.name == name)
    }

    pub fn group(&self, name: &str) -> Option<&ControlGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.name.clone()).collect()
    }

    /// Makes `owner` the file registering into group `name`, creating the
    /// group (and its widget, through `make_widget`) when it does not exist
    /// yet. A file claiming a group again disposes only the bindings it
    /// registered before; bindings of other files sharing the name stay, and
    /// the group keeps its position and expansion.
    pub fn claim_group(
        &mut self,
        name: &str,
        owner: &str,
        make_widget: impl FnOnce() -> Box<dyn Widget>,
    ) {
        match self.groups.iter_mut().find(|g| g.name == name) {
            Some(group) => {
                group.release(owner);
                group.owner = owner.to_string();
            }
            None => self.groups.push(ControlGroup::new(name, owner, make_widget())),
        }
    }

    /// Records a folder the user opened or closed in the widget itself.
    /// `folder` is `None` for the group's own folder.
    pub fn set_expanded(&mut self, group: &str, folder: Option<&str>, expanded: bool) -> bool {
        let Some(group) = self.groups.iter_mut().find(|g| g.name == group) else {
            return false;
        };
        match folder {
            None => group.expanded = expanded,
            Some(name) => match group.folder_mut(name) {
                Some(f) => f.expanded = expanded,
                None => return false,
            },
        }
        true
    }

    /// Total number of registered bindings.
    pub fn binding_count(&self) -> usize {
        self.groups.iter().map(|g| g.len()).sum()
    }

    pub fn contains(&self, key: &BindingKey) -> bool {
        let Some(group) = self.group(&key.group) else {
            return false;
        };
        group.entries.iter().any(|e| match &e.item {
            Item::Control(c) => &c.key == key,
            Item::Folder(f) => &f.key == key || f.controls.iter().any(|c| &c.key == key),
        })
    }

    /// Adds a top-level control or a control inside its folder. Returns the
    /// control back when there is nowhere to put it.
    pub fn store_control(&mut self, control: Control) -> Result<(), Control> {
        let Some(group) = self.groups.iter_mut().find(|g| g.name == control.key.group) else {
            return Err(control);
        };
        if control.key.component.is_some() {
            return match group.folder_mut(&control.key.name) {
                Some(folder) => {
                    folder.controls.push(control);
                    Ok(())
                }
                None => Err(control),
            };
        }
        group.push(Item::Control(control));
        Ok(())
    }

    pub fn store_folder(&mut self, folder: SubFolder) -> Result<(), SubFolder> {
        match self.groups.iter_mut().find(|g| g.name == folder.key.group) {
            Some(group) => {
                group.push(Item::Folder(folder));
                Ok(())
            }
            None => Err(folder),
        }
    }

    /// Removes and disposes the binding under `key`. A folder takes its
    /// components with it. Missing keys are a no-op; returns whether anything
    /// was removed.
    pub fn dispose_binding(&mut self, key: &BindingKey) -> bool {
        let Some(group) = self.groups.iter_mut().find(|g| g.name == key.group) else {
            return false;
        };

        if key.component.is_some() {
            let Some(folder) = group.folder_mut(&key.name) else {
                return false;
            };
            return match folder.controls.iter().position(|c| &c.key == key) {
                Some(index) => {
                    folder.controls.remove(index).dispose();
                    true
                }
                None => false,
            };
        }

        match group.entries.iter().position(|e| e.key() == key) {
            Some(index) => {
                group.entries.remove(index).dispose();
                true
            }
            None => false,
        }
    }

    pub fn target(&self, key: &BindingKey) -> Option<&BindingTarget> {
        let group = self.group(&key.group)?;
        group.entries.iter().find_map(|e| match &e.item {
            Item::Control(c) if &c.key == key => Some(&c.target),
            Item::Folder(f) if f.key.name == key.name => f
                .controls
                .iter()
                .find(|c| &c.key == key)
                .map(|c| &c.target),
            _ => None,
        })
    }

    pub fn serialize(&self) -> StateSnapshot {
        let mut root = StateSnapshot {
            expanded: Some(self.expanded),
            ..StateSnapshot::default()
        };
        for group in &self.groups {
            if group.name == RESERVED_PRESETS_GROUP {
                continue;
            }
            root.insert(&group.name, SnapshotValue::Folder(group.serialize()));
        }
        root
    }

    /// Writes every value present in `snapshot` into the tree and restores the
    /// expansion flags it carries. Returns whether any live value changed.
    pub fn apply(&mut self, snapshot: &StateSnapshot) -> bool {
        if let Some(expanded) = snapshot.expanded {
            self.expanded = expanded;
        }
        let mut changed = false;
        for group in &mut self.groups {
            if group.name == RESERVED_PRESETS_GROUP {
                continue;
            }
            if let Some(folder) = snapshot.folder(&group.name) {
                changed |= group.apply(folder);
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ParamKind;
    use crate::runtime::value::{LiveValue, ParamValue};
    use crate::runtime::widgets::{ControlSpec, ControlView, HeadlessWidgets, WidgetFactory};

    fn pane_with_vector(factory: &mut HeadlessWidgets) -> (Pane, LiveValue) {
        let mut pane = Pane::new();
        pane.claim_group("g", "/src/g.ts", || factory.create(&ControlSpec::folder("g", true)));
        let live = LiveValue::new(ParamValue::Vector(vec![1.0, 2.0]));
        let folder_key = BindingKey::new("g", "v");
        pane.store_folder(SubFolder::new(
            folder_key,
            factory.create(&ControlSpec::folder("v", true)),
        ))
        .ok()
        .unwrap();
        for (i, axis) in ["x", "y"].iter().enumerate() {
            let key = BindingKey::component("g", "v", axis);
            let target = BindingTarget::component(ParamKind::Vector2, live.clone(), i);
            let widget = factory.create(&ControlSpec::new(axis, ControlView::Checkbox));
            pane.store_control(Control::new(key, target, widget)).ok().unwrap();
        }
        (pane, live)
    }

    #[test]
    fn test_disposing_folder_takes_components() {
        let mut factory = HeadlessWidgets::new();
        let (mut pane, _) = pane_with_vector(&mut factory);
        assert_eq!(pane.binding_count(), 3);
        assert!(pane.dispose_binding(&BindingKey::component("g", "v", "x")));
        assert_eq!(pane.binding_count(), 2);
        assert!(pane.dispose_binding(&BindingKey::new("g", "v")));
        assert_eq!(pane.binding_count(), 0);
        assert!(!pane.dispose_binding(&BindingKey::new("g", "v")));
        // group widget only
        assert_eq!(factory.stats().live(), 1);
    }

    #[test]
    fn test_serialize_vector_components() {
        let mut factory = HeadlessWidgets::new();
        let (pane, _) = pane_with_vector(&mut factory);
        let snapshot = pane.serialize();
        assert_eq!(snapshot.lookup("g", "v", Some("y")), Some(&SnapshotValue::Number(2.0)));
        assert_eq!(snapshot.folder("g").unwrap().folder("v").unwrap().expanded, Some(true));
    }

    #[test]
    fn test_apply_leaves_missing_entries_and_flags() {
        let mut factory = HeadlessWidgets::new();
        let (mut pane, live) = pane_with_vector(&mut factory);
        let mut snapshot = StateSnapshot::new();
        snapshot.insert_missing("g", "v", Some("x"), SnapshotValue::Number(7.0));
        assert!(pane.apply(&snapshot));
        assert_eq!(live.get(), ParamValue::Vector(vec![7.0, 2.0]));
        assert!(pane.expanded);
        assert!(!pane.apply(&snapshot));

        snapshot.expanded = Some(false);
        pane.apply(&snapshot);
        assert!(!pane.expanded);
    }

    #[test]
    fn test_reclaiming_group_disposes_own_bindings() {
        let mut factory = HeadlessWidgets::new();
        let (mut pane, _) = pane_with_vector(&mut factory);
        pane.claim_group("g", "/src/g.ts", || panic!("group already exists"));
        assert_eq!(pane.binding_count(), 0);
        assert_eq!(factory.stats().live(), 1);
        assert_eq!(pane.group_names(), vec!["g"]);
    }

    #[test]
    fn test_other_owner_keeps_existing_bindings() {
        let mut factory = HeadlessWidgets::new();
        let (mut pane, live) = pane_with_vector(&mut factory);
        pane.claim_group("g", "/src/other/g.ts", || panic!("group already exists"));
        let key = BindingKey::new("g", "flag");
        let widget = factory.create(&ControlSpec::new("flag", ControlView::Checkbox));
        let target = BindingTarget::whole(ParamKind::Boolean, live);
        pane.store_control(Control::new(key.clone(), target, widget)).ok().unwrap();
        assert_eq!(pane.binding_count(), 4);

        pane.claim_group("g", "/src/g.ts", || panic!("group already exists"));
        assert_eq!(pane.binding_count(), 1);
        assert!(pane.contains(&key));
    }
}
