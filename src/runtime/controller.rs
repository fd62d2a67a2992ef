//! The page-wide runtime controller.
//!
//! Owns the widget tree, the binding registry, the undo/redo stacks, the
//! debounced persistence timer, presets and drag state. Every mutation comes in
//! through one of the public operations; the `restoring` flag marks
//! programmatic restores so they never become history entries.

use std::collections::BTreeMap;
use std::rc::Rc;

use super::clock::{Clock, Deadline};
use super::drag::{DragOutcome, DragTracker, PanelPosition};
use super::history::History;
use super::pane::{BindingKey, Control, Pane, SubFolder, PANE_TITLE};
use super::presets::{PresetTable, NO_PRESET};
use super::snapshot::{SnapshotValue, StateSnapshot};
use super::storage::{load_json, Storage, POSITION_KEY, PRESETS_KEY, STATE_KEY};
use super::value::{BindingTarget, LiveValue, ParamValue};
use super::widgets::{dispose_logged, ControlSpec, ControlView, Widget, WidgetFactory};
use crate::classify::ParamKind;
use crate::config::RuntimeOptions;
use crate::directive::RangeDirective;
use crate::discovery::{ParameterDeclaration, RESERVED_PRESETS_GROUP};

/// Component label of the file picker inside a texture folder.
pub const TEXTURE_INPUT: &str = "file";

pub struct Controller {
    options: RuntimeOptions,
    storage: Box<dyn Storage>,
    widgets: Box<dyn WidgetFactory>,
    clock: Rc<dyn Clock>,

    pane: Pane,
    chrome: Vec<(String, Box<dyn Widget>)>,

    /// Code-declared values, first capture wins.
    initial: BTreeMap<BindingKey, SnapshotValue>,
    /// Snapshot loaded from storage at startup, used to seed new bindings.
    seed: Option<StateSnapshot>,
    current: StateSnapshot,
    history: History,
    presets: PresetTable,
    selected_preset: String,

    restoring: bool,
    save_timer: Deadline,
    reapply_timer: Deadline,

    drag: DragTracker,
    position: Option<PanelPosition>,
}

impl Controller {
    pub fn new(
        options: RuntimeOptions,
        storage: Box<dyn Storage>,
        widgets: Box<dyn WidgetFactory>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let mut seed = None;
        let mut current = StateSnapshot::new();
        if options.persistent {
            match load_json::<StateSnapshot>(storage.as_ref(), STATE_KEY) {
                Ok(Some(state)) => {
                    current = state.clone();
                    seed = Some(state);
                }
                Ok(None) => {}
                Err(e) => log::error!("[tsl-uniform-gui] {}; using live values instead", e),
            }
        }

        let presets = match load_json::<PresetTable>(storage.as_ref(), PRESETS_KEY) {
            Ok(table) => table.unwrap_or_default(),
            Err(e) => {
                log::error!("[tsl-uniform-gui] {}", e);
                PresetTable::new()
            }
        };

        let mut position = None;
        if options.draggable && options.persistent {
            match load_json::<PanelPosition>(storage.as_ref(), POSITION_KEY) {
                Ok(p) => position = p,
                Err(e) => log::error!("[tsl-uniform-gui] {}", e),
            }
        }

        let mut controller = Controller {
            options,
            storage,
            widgets,
            clock,
            pane: Pane::new(),
            chrome: Vec::new(),
            initial: BTreeMap::new(),
            seed,
            current,
            history: History::new(),
            presets,
            selected_preset: String::new(),
            restoring: false,
            save_timer: Deadline::default(),
            reapply_timer: Deadline::default(),
            drag: DragTracker::new(),
            position,
        };
        controller.setup_chrome();
        controller
    }

    fn setup_chrome(&mut self) {
        let root = self.widgets.create(&ControlSpec::folder(PANE_TITLE, true));
        self.chrome.push((PANE_TITLE.to_string(), root));
        let buttons = self
            .widgets
            .create(&ControlSpec::new("History", ControlView::HistoryButtons));
        self.chrome.push(("History".to_string(), buttons));
        if self.options.presets {
            self.rebuild_preset_picker();
        }
        if let Some(p) = self.position {
            self.widgets.move_panel(p.left, p.top);
        }
        self.refresh_history();
    }

    fn rebuild_preset_picker(&mut self) {
        if let Some(index) = self.chrome.iter().position(|(l, _)| l == RESERVED_PRESETS_GROUP) {
            let (label, mut widget) = self.chrome.remove(index);
            dispose_logged(widget.as_mut(), &label);
        }
        let mut names = vec![NO_PRESET.to_string()];
        names.extend(self.presets.names());
        let picker = self.widgets.create(&ControlSpec::new(
            RESERVED_PRESETS_GROUP,
            ControlView::PresetPicker { names },
        ));
        self.chrome.push((RESERVED_PRESETS_GROUP.to_string(), picker));
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REGISTRY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Creates the group for a file, or, when `owner` evaluates again,
    /// disposes the bindings it registered last time. Bindings other files
    /// registered under the same group name are kept.
    pub fn ensure_group(&mut self, name: &str, owner: &str) {
        let widgets = &mut self.widgets;
        self.pane.claim_group(name, owner, || {
            widgets.create(&ControlSpec::folder(name, true))
        });
    }

    /// A block running without its bootstrap still needs a group; it is
    /// owned by its own name.
    fn group(&mut self, name: &str) {
        if !self.pane.has_group(name) {
            self.ensure_group(name, name);
        }
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.pane.has_group(name)
    }

    pub fn capture_initial_value(&mut self, key: &BindingKey, value: SnapshotValue) {
        self.initial.entry(key.clone()).or_insert(value);
    }

    pub fn initial_value(&self, key: &BindingKey) -> Option<&SnapshotValue> {
        self.initial.get(key)
    }

    /// Value persisted for `key` at startup, if any.
    pub fn seed_value(&self, key: &BindingKey) -> Option<SnapshotValue> {
        self.seed
            .as_ref()?
            .lookup(&key.group, &key.name, key.component.as_deref())
            .cloned()
    }

    /// Records a live value in the current snapshot so the first edit has
    /// something to undo back to.
    pub fn capture_baseline(&mut self, key: &BindingKey, value: SnapshotValue) {
        self.current
            .insert_missing(&key.group, &key.name, key.component.as_deref(), value);
    }

    pub fn store_binding(&mut self, key: BindingKey, target: BindingTarget, widget: Box<dyn Widget>) {
        if let Err(control) = self.pane.store_control(Control::new(key, target, widget)) {
            log::warn!("[tsl-uniform-gui] no place for binding {}", control.key);
            control.dispose();
        }
    }

    pub fn store_folder(&mut self, key: BindingKey, widget: Box<dyn Widget>) {
        if let Err(folder) = self.pane.store_folder(SubFolder::new(key, widget)) {
            log::warn!("[tsl-uniform-gui] no place for folder {}", folder.key);
            folder.dispose();
        }
    }

    /// Missing keys are a no-op; widget failures are logged.
    pub fn dispose_binding(&mut self, key: &BindingKey) {
        self.pane.dispose_binding(key);
    }

    pub fn binding_count(&self) -> usize {
        self.pane.binding_count()
    }

    pub fn contains_binding(&self, key: &BindingKey) -> bool {
        self.pane.contains(key)
    }

    /// Creates the control for a whole value, or for one axis when `key`
    /// names a vector component, and stores it. The folder of a vector must already
    /// be stored; a missing group is created.
    pub fn bind_control(
        &mut self,
        key: BindingKey,
        kind: ParamKind,
        live: LiveValue,
        range: RangeDirective,
    ) {
        let axis = key.component.as_deref().filter(|_| kind.is_vector());
        let target = match axis {
            Some(axis) => match kind.axes().iter().position(|a| *a == axis) {
                Some(index) => BindingTarget::component(kind, live, index),
                None => {
                    log::warn!("[tsl-uniform-gui] {} has no axis {}", kind.as_str(), axis);
                    return;
                }
            },
            None => BindingTarget::whole(kind, live),
        };
        self.group(&key.group);
        let view = match kind {
            ParamKind::Boolean => ControlView::Checkbox,
            ParamKind::Color => ControlView::ColorPicker,
            ParamKind::Texture => ControlView::FileInput,
            _ => ControlView::Slider(range),
        };
        let spec = ControlSpec::new(key.label(), view).for_key(key.clone());
        let widget = self.widgets.create(&spec);
        self.store_binding(key, target, widget);
    }

    /// Creates and stores the folder of a vector or texture.
    pub fn open_folder(&mut self, key: BindingKey) {
        self.group(&key.group);
        let spec = ControlSpec::folder(&key.name, true).for_key(key.clone());
        let widget = self.widgets.create(&spec);
        self.store_folder(key, widget);
    }

    /// The file picker of a texture, inside the texture's folder.
    pub fn bind_file_input(&mut self, folder: &BindingKey, live: LiveValue) {
        let key = BindingKey::component(&folder.group, &folder.name, TEXTURE_INPUT);
        self.bind_control(key, ParamKind::Texture, live, RangeDirective::default());
    }

    /// Registers one discovered declaration against its live value, in the
    /// same order a generated block does.
    pub fn register(&mut self, decl: &ParameterDeclaration, live: &LiveValue) {
        if !decl.kind.has_control() {
            return;
        }
        let range = decl.directive.range_or_default();
        let key = BindingKey::new(&decl.group, &decl.name);

        match decl.kind {
            ParamKind::Boolean | ParamKind::Number | ParamKind::Color => {
                self.dispose_binding(&key);
                self.seed_target(&key, &BindingTarget::whole(decl.kind, live.clone()));
                self.bind_control(key, decl.kind, live.clone(), range);
            }
            ParamKind::Vector2 | ParamKind::Vector3 | ParamKind::Vector4 => {
                for axis in decl.kind.axes() {
                    self.dispose_binding(&BindingKey::component(&decl.group, &decl.name, axis));
                }
                self.dispose_binding(&key);
                self.open_folder(key);
                for (index, axis) in decl.kind.axes().iter().enumerate() {
                    let axis_key = BindingKey::component(&decl.group, &decl.name, axis);
                    let target = BindingTarget::component(decl.kind, live.clone(), index);
                    self.seed_target(&axis_key, &target);
                    self.bind_control(axis_key, decl.kind, live.clone(), range);
                }
            }
            ParamKind::Texture => {
                self.dispose_binding(&key);
                self.open_folder(key.clone());
                self.bind_file_input(&key, live.clone());
            }
            ParamKind::Matrix3 | ParamKind::Matrix4 => {}
        }
    }

    /// capture initial -> seed from storage, else record a baseline.
    fn seed_target(&mut self, key: &BindingKey, target: &BindingTarget) {
        let Some(code_value) = target.read() else {
            return;
        };
        self.capture_initial_value(key, code_value.clone());
        match self.seed_value(key) {
            Some(seed) => {
                target.write(&seed);
            }
            None => self.capture_baseline(key, code_value),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATE
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn serialize_state(&self) -> StateSnapshot {
        self.pane.serialize()
    }

    /// Applies a snapshot under the reentrancy guard. Entries absent from the
    /// snapshot are left alone.
    pub fn apply_state(&mut self, snapshot: &StateSnapshot) {
        self.while_restoring(|c| {
            if c.pane.apply(snapshot) {
                c.save();
            }
        });
    }

    fn while_restoring<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let was = self.restoring;
        self.restoring = true;
        let out = f(self);
        self.restoring = was;
        out
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    pub fn current_state(&self) -> &StateSnapshot {
        &self.current
    }

    /// A user edit in snapshot encoding (colors as their JSON triplet,
    /// textures as the URL of the picked image).
    pub fn edit_value(&mut self, key: &BindingKey, value: &SnapshotValue) -> bool {
        let decoded = self.pane.target(key).and_then(|target| target.decode(value));
        match decoded {
            Some(value) => self.edit(key, value),
            None => {
                log::warn!("[tsl-uniform-gui] ignoring edit of {} with {:?}", key, value);
                false
            }
        }
    }

    /// The user opened or closed a folder; saved like any other change.
    pub fn set_expanded(&mut self, group: &str, folder: Option<&str>, expanded: bool) {
        if self.pane.set_expanded(group, folder, expanded) {
            self.save();
        }
    }

    /// A user edit coming from the widget bound to `key`.
    pub fn edit(&mut self, key: &BindingKey, value: ParamValue) -> bool {
        let changed = match self.pane.target(key) {
            Some(target) => target.edit(value),
            None => {
                log::warn!("[tsl-uniform-gui] edit for unknown binding {}", key);
                return false;
            }
        };
        if changed {
            self.save();
        }
        changed
    }

    /// The single persistence entry point, wired to every change event.
    pub fn save(&mut self) {
        self.save_timer.cancel();
        if self.restoring {
            let snapshot = self.serialize_state();
            self.persist_state(&snapshot);
            return;
        }
        let at = self.clock.now_ms() + self.options.debounce_ms;
        self.save_timer.schedule(at);
    }

    pub fn has_pending_save(&self) -> bool {
        self.save_timer.is_pending()
    }

    fn flush_save(&mut self) {
        let snapshot = self.serialize_state();
        let previous = std::mem::replace(&mut self.current, snapshot);
        if !previous.is_empty() {
            self.history.push_undo(previous);
        }
        self.refresh_history();
        let current = self.current.clone();
        self.persist_state(&current);
    }

    fn persist_state(&mut self, snapshot: &StateSnapshot) {
        if self.options.persistent {
            self.storage.set(STATE_KEY, snapshot.to_json());
        }
    }

    /// When `poll` next has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        match (self.save_timer.at(), self.reapply_timer.at()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Runs whatever timers are due.
    pub fn poll(&mut self) {
        let now = self.clock.now_ms();
        if self.save_timer.fire(now) {
            self.flush_save();
        }
        if self.reapply_timer.fire(now) {
            self.reapply_persisted();
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HISTORY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.history.pop_undo() else {
            self.refresh_history();
            return false;
        };
        let before = self.serialize_state();
        self.apply_state(&previous);
        self.history.push_redo(before);
        self.refresh_history();
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.history.pop_redo() else {
            self.refresh_history();
            return false;
        };
        let before = self.serialize_state();
        self.apply_state(&next);
        self.history.push_undo(before);
        self.refresh_history();
        true
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    fn refresh_history(&mut self) {
        self.widgets
            .history_changed(self.history.can_undo(), self.history.can_redo());
    }

    /// Back to the values declared in code.
    pub fn reset(&mut self) {
        let mut snapshot = StateSnapshot::new();
        for (key, value) in &self.initial {
            snapshot.insert_missing(&key.group, &key.name, key.component.as_deref(), value.clone());
        }
        self.apply_state(&snapshot);
    }

    pub fn copy_configs(&self) -> String {
        self.serialize_state().to_json()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PRESETS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn create_preset(&mut self, name: &str) -> bool {
        if !self.presets.insert(name, self.serialize_state()) {
            return false;
        }
        match serde_json::to_string(&self.presets) {
            Ok(json) => self.storage.set(PRESETS_KEY, json),
            Err(e) => log::error!("[tsl-uniform-gui] failed to store presets: {}", e),
        }
        if self.options.presets {
            self.rebuild_preset_picker();
        }
        true
    }

    /// `""` or `"none"` reapplies the current state; unknown names are ignored.
    pub fn select_preset(&mut self, name: &str) {
        let name = name.trim();
        self.selected_preset = name.to_string();
        let snapshot = if name.is_empty() || name == NO_PRESET {
            Some(self.current.clone())
        } else {
            self.presets.get(name).cloned()
        };
        match snapshot {
            Some(snapshot) => self.apply_state(&snapshot),
            None => log::warn!("[tsl-uniform-gui] unknown preset {}", name),
        }
    }

    pub fn preset_names(&self) -> Vec<String> {
        self.presets.names()
    }

    pub fn selected_preset(&self) -> &str {
        &self.selected_preset
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HOT RELOAD
    // ═══════════════════════════════════════════════════════════════════════════

    /// Called after the bundler swapped a module; reapplies the persisted
    /// snapshot once the re-evaluated bindings have registered.
    pub fn on_hot_reload(&mut self) {
        let at = self.clock.now_ms() + self.options.reapply_delay_ms;
        self.reapply_timer.schedule(at);
    }

    fn reapply_persisted(&mut self) {
        let persisted = if self.options.persistent {
            match load_json::<StateSnapshot>(self.storage.as_ref(), STATE_KEY) {
                Ok(state) => state,
                Err(e) => {
                    log::error!("[tsl-uniform-gui] {}", e);
                    None
                }
            }
        } else {
            None
        };
        let snapshot = persisted.unwrap_or_else(|| self.current.clone());
        self.apply_state(&snapshot);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DRAG
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn panel_position(&self) -> Option<PanelPosition> {
        self.position
    }

    pub fn is_expanded(&self) -> bool {
        self.pane.expanded
    }

    pub fn pointer_down(&mut self, x: f64, y: f64) {
        if !self.options.draggable {
            return;
        }
        let origin = self.position.unwrap_or_default();
        self.drag.pointer_down(x, y, origin);
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) {
        if let Some(p) = self.drag.pointer_move(x, y) {
            self.widgets.move_panel(p.left, p.top);
        }
    }

    pub fn pointer_up(&mut self, x: f64, y: f64) {
        match self.drag.pointer_up(x, y) {
            DragOutcome::Idle => {}
            DragOutcome::Click => self.pane.expanded = !self.pane.expanded,
            DragOutcome::Moved(p) => {
                self.position = Some(p);
                self.widgets.move_panel(p.left, p.top);
                if self.options.persistent {
                    match serde_json::to_string(&p) {
                        Ok(json) => self.storage.set(POSITION_KEY, json),
                        Err(e) => log::error!("[tsl-uniform-gui] failed to store position: {}", e),
                    }
                }
            }
        }
    }
}
