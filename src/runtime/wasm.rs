//! `wasm-bindgen` exports of the runtime.
//!
//! Instrumented modules import `uniformGui` from the runtime package and call
//! the methods of the [`UniformGui`] it returns. Those methods are the whole
//! contract between generated code and the controller; every one of them
//! forwards to [`Controller`] on the page-wide slot.
//!
//! The widget library stays in JS. The page hands it over once with
//! `setWidgetHost(host)`, where `host.create(spec)` returns a handle with
//! `dispose()` and `refresh()`, and `historyChanged(canUndo, canRedo)` /
//! `movePanel(left, top)` are optional. User edits come back through
//! `edit`, `setFolderExpanded` and the pointer methods. Without a host the
//! panel runs headless.
//!
//! Only compiled on `wasm32` with the `wasm` feature.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_sys::{Array, Function, Object, Reflect, JSON};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use super::clock::Clock;
use super::controller::Controller;
use super::pane::BindingKey;
use super::snapshot::SnapshotValue;
use super::storage::Storage;
use super::value::{LiveValue, ParamValue, Rgb, ValueSync};
use super::widgets::{ControlSpec, ControlView, HeadlessWidgets, Widget, WidgetFactory};
use super::try_with_controller;
use crate::classify::ParamKind;
use crate::config::RuntimeOptions;
use crate::directive::RangeDirective;
use crate::error::WidgetError;

thread_local! {
    static WIDGET_HOST: RefCell<Option<JsValue>> = const { RefCell::new(None) };
    /// Deadline a `setTimeout` is already armed for.
    static ARMED: Cell<Option<u64>> = const { Cell::new(None) };
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONSOLE
// ═══════════════════════════════════════════════════════════════════════════════

fn console_error(msg: &str) {
    web_sys::console::error_1(&JsValue::from_str(msg));
}

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let msg = JsValue::from_str(&record.args().to_string());
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&msg),
            log::Level::Warn => web_sys::console::warn_1(&msg),
            _ => web_sys::console::log_1(&msg),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

fn install_hooks() {
    use std::sync::Once;

    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(log::LevelFilter::Info);
        }
        std::panic::set_hook(Box::new(|info| {
            let msg = match info.location() {
                Some(loc) => format!(
                    "[tsl-uniform-gui] panic at {}:{}:{}: {info}",
                    loc.file(),
                    loc.line(),
                    loc.column()
                ),
                None => format!("[tsl-uniform-gui] panic: {info}"),
            };
            console_error(&msg);
        }));
    });
}

// ═══════════════════════════════════════════════════════════════════════════════
// JS HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn set_js(obj: &JsValue, key: &str, value: JsValue) {
    let _ = Reflect::set(obj, &JsValue::from_str(key), &value);
}

fn get_js(obj: &JsValue, key: &str) -> Option<JsValue> {
    Reflect::get(obj, &JsValue::from_str(key))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

/// Calls `target[name](...args)`. A missing method is `Ok(None)`.
fn call_method(target: &JsValue, name: &str, args: &[JsValue]) -> Result<Option<JsValue>, JsValue> {
    let Some(method) = get_js(target, name).and_then(|m| m.dyn_into::<Function>().ok()) else {
        return Ok(None);
    };
    let list = args.iter().collect::<Array>();
    Reflect::apply(&method, target, &list).map(Some)
}

fn describe(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

/// `JSON.stringify` followed by serde, for plain option objects.
fn from_js_json<T: serde::de::DeserializeOwned>(value: &JsValue) -> Option<T> {
    if value.is_undefined() || value.is_null() {
        return None;
    }
    let json: String = JSON::stringify(value).ok()?.into();
    match serde_json::from_str(&json) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            log::warn!("[tsl-uniform-gui] ignoring malformed {}: {}", json, e);
            None
        }
    }
}

fn snapshot_to_js(value: &SnapshotValue) -> JsValue {
    match value {
        SnapshotValue::Bool(b) => JsValue::from_bool(*b),
        SnapshotValue::Number(n) => JsValue::from_f64(*n),
        SnapshotValue::Text(t) => JsValue::from_str(t),
        SnapshotValue::Folder(_) => JsValue::UNDEFINED,
    }
}

fn snapshot_from_js(value: &JsValue) -> Option<SnapshotValue> {
    if let Some(b) = value.as_bool() {
        return Some(SnapshotValue::Bool(b));
    }
    if let Some(n) = value.as_f64() {
        return Some(SnapshotValue::Number(n));
    }
    value.as_string().map(SnapshotValue::Text)
}

fn binding_key(group: &str, name: &str, component: Option<String>) -> BindingKey {
    match component {
        Some(axis) => BindingKey::component(group, name, &axis),
        None => BindingKey::new(group, name),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOST SERVICES
// ═══════════════════════════════════════════════════════════════════════════════

/// `window.localStorage`; unavailable storage (private mode, sandboxed
/// frames) reads as empty and drops writes.
struct LocalStorage;

impl LocalStorage {
    fn area() -> Option<web_sys::Storage> {
        web_sys::window()?.local_storage().ok().flatten()
    }
}

impl Storage for LocalStorage {
    fn get(&self, key: &str) -> Option<String> {
        Self::area()?.get_item(key).ok().flatten()
    }

    fn set(&mut self, key: &str, value: String) {
        let Some(area) = Self::area() else {
            log::warn!("[tsl-uniform-gui] localStorage unavailable; {} not saved", key);
            return;
        };
        if let Err(e) = area.set_item(key, &value) {
            log::warn!("[tsl-uniform-gui] failed to save {}: {}", key, describe(&e));
        }
    }
}

struct DateClock;

impl Clock for DateClock {
    fn now_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }
}

/// Forwards widget requests to the host set with `setWidgetHost`.
#[derive(Default)]
struct HostWidgets {
    headless: HeadlessWidgets,
}

impl HostWidgets {
    fn host() -> Option<JsValue> {
        WIDGET_HOST.with(|h| h.borrow().clone())
    }
}

fn spec_to_js(spec: &ControlSpec) -> JsValue {
    let obj: JsValue = Object::new().into();
    set_js(&obj, "label", JsValue::from_str(&spec.label));
    let view = match &spec.view {
        ControlView::Checkbox => "checkbox",
        ControlView::Slider(range) => {
            if let Some(min) = range.min {
                set_js(&obj, "min", JsValue::from_f64(min));
            }
            if let Some(max) = range.max {
                set_js(&obj, "max", JsValue::from_f64(max));
            }
            set_js(&obj, "step", JsValue::from_f64(range.step));
            "slider"
        }
        ControlView::ColorPicker => "color",
        ControlView::FileInput => "file-input",
        ControlView::Folder { expanded } => {
            set_js(&obj, "expanded", JsValue::from_bool(*expanded));
            "folder"
        }
        ControlView::HistoryButtons => "history",
        ControlView::PresetPicker { names } => {
            let list = names.iter().map(|n| JsValue::from_str(n)).collect::<Array>();
            set_js(&obj, "names", list.into());
            "presets"
        }
    };
    set_js(&obj, "view", JsValue::from_str(view));
    if let Some(key) = &spec.key {
        set_js(&obj, "group", JsValue::from_str(&key.group));
        set_js(&obj, "name", JsValue::from_str(&key.name));
        let component = key.component.as_deref().map_or(JsValue::NULL, JsValue::from_str);
        set_js(&obj, "component", component);
    }
    obj
}

struct HostWidget {
    handle: JsValue,
}

impl Widget for HostWidget {
    fn dispose(&mut self) -> Result<(), WidgetError> {
        call_method(&self.handle, "dispose", &[])
            .map(|_| ())
            .map_err(|e| WidgetError(describe(&e)))
    }

    fn refresh(&mut self) {
        if let Err(e) = call_method(&self.handle, "refresh", &[]) {
            log::warn!("[tsl-uniform-gui] refresh failed: {}", describe(&e));
        }
    }
}

impl WidgetFactory for HostWidgets {
    fn create(&mut self, spec: &ControlSpec) -> Box<dyn Widget> {
        let Some(host) = Self::host() else {
            return self.headless.create(spec);
        };
        match call_method(&host, "create", &[spec_to_js(spec)]) {
            Ok(Some(handle)) => Box::new(HostWidget { handle }),
            Ok(None) => self.headless.create(spec),
            Err(e) => {
                log::error!("[tsl-uniform-gui] could not create {}: {}", spec.label, describe(&e));
                self.headless.create(spec)
            }
        }
    }

    fn history_changed(&mut self, can_undo: bool, can_redo: bool) {
        if let Some(host) = Self::host() {
            let args = [JsValue::from_bool(can_undo), JsValue::from_bool(can_redo)];
            if let Err(e) = call_method(&host, "historyChanged", &args) {
                log::warn!("[tsl-uniform-gui] historyChanged failed: {}", describe(&e));
            }
        }
    }

    fn move_panel(&mut self, left: f64, top: f64) {
        if let Some(host) = Self::host() {
            let args = [JsValue::from_f64(left), JsValue::from_f64(top)];
            if let Err(e) = call_method(&host, "movePanel", &args) {
                log::warn!("[tsl-uniform-gui] movePanel failed: {}", describe(&e));
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// UNIFORMS
// ═══════════════════════════════════════════════════════════════════════════════

/// The `value` of a uniform object in the page, read and written in place so
/// shaders see every change.
struct UniformSync {
    uniform: JsValue,
    kind: ParamKind,
}

impl ValueSync for UniformSync {
    fn pull(&self) -> Option<ParamValue> {
        let value = get_js(&self.uniform, "value")?;
        match self.kind {
            ParamKind::Boolean => value.as_bool().map(ParamValue::Bool),
            ParamKind::Number => value.as_f64().map(ParamValue::Number),
            ParamKind::Color => {
                let channel = |c: &str| get_js(&value, c).and_then(|v| v.as_f64());
                Some(ParamValue::Color(Rgb::new(
                    channel("r")?,
                    channel("g")?,
                    channel("b")?,
                )))
            }
            ParamKind::Vector2 | ParamKind::Vector3 | ParamKind::Vector4 => self
                .kind
                .axes()
                .iter()
                .map(|axis| get_js(&value, axis).and_then(|v| v.as_f64()))
                .collect::<Option<Vec<f64>>>()
                .map(ParamValue::Vector),
            ParamKind::Matrix3 | ParamKind::Matrix4 | ParamKind::Texture => None,
        }
    }

    fn push(&self, value: &ParamValue) {
        match value {
            ParamValue::Bool(b) => set_js(&self.uniform, "value", JsValue::from_bool(*b)),
            ParamValue::Number(n) => set_js(&self.uniform, "value", JsValue::from_f64(*n)),
            ParamValue::Color(rgb) => {
                if let Some(target) = get_js(&self.uniform, "value") {
                    set_js(&target, "r", JsValue::from_f64(rgb.r));
                    set_js(&target, "g", JsValue::from_f64(rgb.g));
                    set_js(&target, "b", JsValue::from_f64(rgb.b));
                }
            }
            ParamValue::Vector(components) => {
                if let Some(target) = get_js(&self.uniform, "value") {
                    for (axis, n) in self.kind.axes().iter().zip(components) {
                        set_js(&target, axis, JsValue::from_f64(*n));
                    }
                }
            }
            ParamValue::Matrix(_) | ParamValue::Texture(_) => {}
        }
    }
}

/// Value used until the uniform can be read.
fn placeholder(kind: ParamKind) -> ParamValue {
    match kind {
        ParamKind::Boolean => ParamValue::Bool(false),
        ParamKind::Number => ParamValue::Number(0.0),
        ParamKind::Color => ParamValue::Color(Rgb::new(1.0, 1.0, 1.0)),
        ParamKind::Vector2 | ParamKind::Vector3 | ParamKind::Vector4 => {
            ParamValue::Vector(vec![0.0; kind.axes().len()])
        }
        ParamKind::Matrix3 => ParamValue::Matrix(vec![0.0; 9]),
        ParamKind::Matrix4 => ParamValue::Matrix(vec![0.0; 16]),
        ParamKind::Texture => ParamValue::Texture(None),
    }
}

/// Hands a picked image URL to the generated loader callback.
struct TextureLoad {
    load: Function,
}

impl ValueSync for TextureLoad {
    fn pull(&self) -> Option<ParamValue> {
        None
    }

    fn push(&self, value: &ParamValue) {
        if let ParamValue::Texture(Some(url)) = value {
            if let Err(e) = self.load.call1(&JsValue::NULL, &JsValue::from_str(url)) {
                log::error!("[tsl-uniform-gui] texture load failed: {}", describe(&e));
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TIMERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Arms a `setTimeout` for the controller's next deadline unless an earlier
/// one is already armed.
fn arm_timer(deadline: Option<u64>) {
    let Some(at) = deadline else {
        return;
    };
    if ARMED.with(|a| a.get()).is_some_and(|armed| armed <= at) {
        return;
    }
    let Some(window) = web_sys::window() else {
        return;
    };
    let delay = at.saturating_sub(DateClock.now_ms()).min(i32::MAX as u64) as i32;
    let callback = Closure::once_into_js(move || {
        ARMED.with(|a| {
            if a.get() == Some(at) {
                a.set(None);
            }
        });
        let next = try_with_controller(uninitialized, |c| {
            c.poll();
            c.next_deadline()
        });
        arm_timer(next.flatten());
    });
    let armed = window.set_timeout_with_callback_and_timeout_and_arguments_0(
        callback.unchecked_ref::<Function>(),
        delay,
    );
    match armed {
        Ok(_) => ARMED.with(|a| a.set(Some(at))),
        Err(e) => log::error!("[tsl-uniform-gui] setTimeout failed: {}", describe(&e)),
    }
}

fn build_controller(options: RuntimeOptions) -> Controller {
    Controller::new(
        options,
        Box::new(LocalStorage),
        Box::<HostWidgets>::default(),
        Rc::new(DateClock),
    )
}

/// Timers only fire after some module built the controller.
fn uninitialized() -> Controller {
    build_controller(RuntimeOptions::default())
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Registers the JS widget library. Call before the first instrumented
/// module runs.
#[wasm_bindgen(js_name = setWidgetHost)]
pub fn set_widget_host(host: JsValue) {
    install_hooks();
    WIDGET_HOST.with(|h| *h.borrow_mut() = Some(host));
}

/// The page controller, created on first use with these options; later
/// calls share it and their options are ignored.
#[wasm_bindgen(js_name = uniformGui)]
pub fn uniform_gui(options: JsValue) -> UniformGui {
    install_hooks();
    UniformGui {
        options: from_js_json(&options).unwrap_or_default(),
    }
}

#[wasm_bindgen]
pub struct UniformGui {
    options: RuntimeOptions,
}

impl UniformGui {
    /// Runs `f` on the controller and re-arms the timer. A call made while
    /// the controller is busy (a host callback firing synchronously) is
    /// dropped with a warning.
    fn run<R: Default>(&self, f: impl FnOnce(&mut Controller) -> R) -> R {
        let options = self.options.clone();
        let out = try_with_controller(
            || build_controller(options),
            |c| {
                let out = f(c);
                (out, c.next_deadline())
            },
        );
        match out {
            Some((out, deadline)) => {
                arm_timer(deadline);
                out
            }
            None => {
                log::warn!("[tsl-uniform-gui] reentrant call ignored");
                R::default()
            }
        }
    }
}

#[wasm_bindgen]
impl UniformGui {
    // Generated code

    #[wasm_bindgen(js_name = ensureGroup)]
    pub fn ensure_group(&self, group: String, owner: String) {
        self.run(|c| c.ensure_group(&group, &owner));
    }

    #[wasm_bindgen(js_name = disposeBinding)]
    pub fn dispose_binding(&self, group: String, name: String, component: Option<String>) {
        let key = binding_key(&group, &name, component);
        self.run(|c| c.dispose_binding(&key));
    }

    #[wasm_bindgen(js_name = captureInitialValue)]
    pub fn capture_initial_value(&self, group: String, name: String, component: Option<String>, value: JsValue) {
        let key = binding_key(&group, &name, component);
        if let Some(value) = snapshot_from_js(&value) {
            self.run(|c| c.capture_initial_value(&key, value));
        }
    }

    /// The persisted value for the binding, or `undefined`.
    #[wasm_bindgen(js_name = seedValue)]
    pub fn seed_value(&self, group: String, name: String, component: Option<String>) -> JsValue {
        let key = binding_key(&group, &name, component);
        self.run(|c| c.seed_value(&key))
            .map_or(JsValue::UNDEFINED, |v| snapshot_to_js(&v))
    }

    #[wasm_bindgen(js_name = captureBaseline)]
    pub fn capture_baseline(&self, group: String, name: String, component: Option<String>, value: JsValue) {
        let key = binding_key(&group, &name, component);
        if let Some(value) = snapshot_from_js(&value) {
            self.run(|c| c.capture_baseline(&key, value));
        }
    }

    /// Binds a control to `uniform.value` (or one axis of it).
    #[wasm_bindgen(js_name = storeBinding)]
    pub fn store_binding(
        &self,
        group: String,
        name: String,
        component: Option<String>,
        kind: String,
        uniform: JsValue,
        range: JsValue,
    ) {
        let Ok(kind) = serde_json::from_value::<ParamKind>(serde_json::Value::String(kind.clone())) else {
            log::warn!("[tsl-uniform-gui] unknown kind {} for {}", kind, name);
            return;
        };
        let key = binding_key(&group, &name, component);
        let range = from_js_json::<RangeDirective>(&range).unwrap_or_default();
        let live = LiveValue::synced(placeholder(kind), Rc::new(UniformSync { uniform, kind }));
        self.run(|c| c.bind_control(key, kind, live, range));
    }

    #[wasm_bindgen(js_name = storeFolder)]
    pub fn store_folder(&self, group: String, name: String) {
        self.run(|c| c.open_folder(BindingKey::new(&group, &name)));
    }

    /// File picker for a texture; `load(url)` swaps the uniform's texture.
    #[wasm_bindgen(js_name = storeTexture)]
    pub fn store_texture(&self, group: String, name: String, load: Function) {
        let folder = BindingKey::new(&group, &name);
        let live = LiveValue::synced(ParamValue::Texture(None), Rc::new(TextureLoad { load }));
        self.run(|c| c.bind_file_input(&folder, live));
    }

    #[wasm_bindgen(js_name = onHotReload)]
    pub fn on_hot_reload(&self) {
        self.run(|c| c.on_hot_reload());
    }

    // Widget host

    /// A user edit. Colors come as their JSON triplet, textures as an image
    /// URL on the `"file"` component.
    pub fn edit(&self, group: String, name: String, component: Option<String>, value: JsValue) -> bool {
        let key = binding_key(&group, &name, component);
        let Some(value) = snapshot_from_js(&value) else {
            return false;
        };
        self.run(|c| c.edit_value(&key, &value))
    }

    #[wasm_bindgen(js_name = setFolderExpanded)]
    pub fn set_folder_expanded(&self, group: String, folder: Option<String>, expanded: bool) {
        self.run(|c| c.set_expanded(&group, folder.as_deref(), expanded));
    }

    pub fn save(&self) {
        self.run(|c| c.save());
    }

    pub fn undo(&self) -> bool {
        self.run(|c| c.undo())
    }

    pub fn redo(&self) -> bool {
        self.run(|c| c.redo())
    }

    pub fn reset(&self) {
        self.run(|c| c.reset());
    }

    /// The current state as JSON, for the clipboard.
    #[wasm_bindgen(js_name = copyConfigs)]
    pub fn copy_configs(&self) -> String {
        self.run(|c| c.copy_configs())
    }

    #[wasm_bindgen(js_name = createPreset)]
    pub fn create_preset(&self, name: String) -> bool {
        self.run(|c| c.create_preset(&name))
    }

    #[wasm_bindgen(js_name = selectPreset)]
    pub fn select_preset(&self, name: String) {
        self.run(|c| c.select_preset(&name));
    }

    #[wasm_bindgen(js_name = presetNames)]
    pub fn preset_names(&self) -> Array {
        self.run(|c| c.preset_names())
            .iter()
            .map(|n| JsValue::from_str(n))
            .collect()
    }

    #[wasm_bindgen(js_name = pointerDown)]
    pub fn pointer_down(&self, x: f64, y: f64) {
        self.run(|c| c.pointer_down(x, y));
    }

    #[wasm_bindgen(js_name = pointerMove)]
    pub fn pointer_move(&self, x: f64, y: f64) {
        self.run(|c| c.pointer_move(x, y));
    }

    #[wasm_bindgen(js_name = pointerUp)]
    pub fn pointer_up(&self, x: f64, y: f64) {
        self.run(|c| c.pointer_up(x, y));
    }

    pub fn poll(&self) {
        self.run(|c| c.poll());
    }
}
