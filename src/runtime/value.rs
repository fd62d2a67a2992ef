//! Live parameter values and their snapshot encoding.
//!
//! The kind of a value is fixed by static analysis ([`ParamKind`]); nothing
//! here inspects a value to guess how to serialize it.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

use super::snapshot::SnapshotValue;
use crate::classify::ParamKind;

/// Linear RGB triplet, components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Rgb { r, g, b }
    }

    /// `{"r":1,"g":0,"b":0}`: key order fixed, whole numbers without a fraction.
    pub fn to_json(&self) -> String {
        format!(
            "{{\"r\":{},\"g\":{},\"b\":{}}}",
            json_number(self.r),
            json_number(self.g),
            json_number(self.b)
        )
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Formats a number the way a JS engine would put it in JSON.
pub fn json_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{}", value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(|n| n.to_string())
            .unwrap_or_else(|| "null".to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Color(Rgb),
    Vector(Vec<f64>),
    Matrix(Vec<f64>),
    /// URL of the loaded texture, if any.
    Texture(Option<String>),
}

/// Mirror of a value owned outside Rust, such as a uniform object on the page.
pub trait ValueSync {
    /// The host's current value, if it can be read back.
    fn pull(&self) -> Option<ParamValue>;
    fn push(&self, value: &ParamValue);
}

/// The mutable `value` field a consumer reads every frame. Cloning shares it.
///
/// A live value built with [`LiveValue::synced`] re-reads its host on every
/// `get` and writes every `set` through to it.
#[derive(Clone)]
pub struct LiveValue {
    cell: Rc<RefCell<ParamValue>>,
    sync: Option<Rc<dyn ValueSync>>,
}

impl std::fmt::Debug for LiveValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveValue")
            .field("value", &*self.cell.borrow())
            .field("synced", &self.sync.is_some())
            .finish()
    }
}

impl LiveValue {
    pub fn new(value: ParamValue) -> Self {
        LiveValue {
            cell: Rc::new(RefCell::new(value)),
            sync: None,
        }
    }

    /// Backed by `sync`; `fallback` is used until the host yields a value.
    pub fn synced(fallback: ParamValue, sync: Rc<dyn ValueSync>) -> Self {
        let initial = sync.pull().unwrap_or(fallback);
        LiveValue {
            cell: Rc::new(RefCell::new(initial)),
            sync: Some(sync),
        }
    }

    pub fn get(&self) -> ParamValue {
        if let Some(pulled) = self.sync.as_ref().and_then(|s| s.pull()) {
            *self.cell.borrow_mut() = pulled;
        }
        self.cell.borrow().clone()
    }

    pub fn set(&self, value: ParamValue) {
        if let Some(sync) = &self.sync {
            sync.push(&value);
        }
        *self.cell.borrow_mut() = value;
    }

    pub fn component(&self, index: usize) -> Option<f64> {
        match self.get() {
            ParamValue::Vector(v) => v.get(index).copied(),
            _ => None,
        }
    }

    pub fn set_component(&self, index: usize, value: f64) -> bool {
        let ParamValue::Vector(mut v) = self.get() else {
            return false;
        };
        match v.get_mut(index) {
            Some(slot) => {
                *slot = value;
                self.set(ParamValue::Vector(v));
                true
            }
            None => false,
        }
    }
}

/// What one control reads and writes: a whole value or one vector component.
#[derive(Debug, Clone)]
pub struct BindingTarget {
    pub kind: ParamKind,
    pub value: LiveValue,
    pub component: Option<usize>,
}

impl BindingTarget {
    pub fn whole(kind: ParamKind, value: LiveValue) -> Self {
        BindingTarget {
            kind,
            value,
            component: None,
        }
    }

    pub fn component(kind: ParamKind, value: LiveValue, index: usize) -> Self {
        BindingTarget {
            kind,
            value,
            component: Some(index),
        }
    }

    /// Snapshot encoding of the current value; textures have none.
    pub fn read(&self) -> Option<SnapshotValue> {
        if let Some(index) = self.component {
            return self.value.component(index).map(SnapshotValue::Number);
        }
        match self.value.get() {
            ParamValue::Bool(b) => Some(SnapshotValue::Bool(b)),
            ParamValue::Number(n) => Some(SnapshotValue::Number(n)),
            ParamValue::Color(rgb) => Some(SnapshotValue::Text(rgb.to_json())),
            ParamValue::Vector(_) | ParamValue::Matrix(_) | ParamValue::Texture(_) => None,
        }
    }

    /// The live value a snapshot entry stands for, or `None` when its shape
    /// does not fit this target. A texture takes the URL of the image to load.
    pub fn decode(&self, snapshot: &SnapshotValue) -> Option<ParamValue> {
        if self.component.is_some() {
            return match snapshot {
                SnapshotValue::Number(n) => Some(ParamValue::Number(*n)),
                _ => None,
            };
        }
        match (self.kind, snapshot) {
            (ParamKind::Boolean, SnapshotValue::Bool(b)) => Some(ParamValue::Bool(*b)),
            (ParamKind::Number, SnapshotValue::Number(n)) => Some(ParamValue::Number(*n)),
            (ParamKind::Color, SnapshotValue::Text(json)) => match Rgb::from_json(json) {
                Ok(rgb) => Some(ParamValue::Color(rgb)),
                Err(e) => {
                    log::warn!("[tsl-uniform-gui] unreadable color {}: {}", json, e);
                    None
                }
            },
            (ParamKind::Texture, SnapshotValue::Text(url)) => {
                Some(ParamValue::Texture(Some(url.clone())))
            }
            _ => None,
        }
    }

    /// Writes a snapshot value back; returns whether the live value changed.
    /// Values of the wrong shape are ignored.
    pub fn write(&self, snapshot: &SnapshotValue) -> bool {
        if self.kind == ParamKind::Texture {
            return false;
        }
        let Some(next) = self.decode(snapshot) else {
            return false;
        };
        if let (Some(index), ParamValue::Number(n)) = (self.component, &next) {
            return self.value.component(index) != Some(*n) && self.value.set_component(index, *n);
        }
        if self.value.get() == next {
            return false;
        }
        self.value.set(next);
        true
    }

    /// Applies a user edit from the widget.
    pub fn edit(&self, value: ParamValue) -> bool {
        if let Some(index) = self.component {
            return match value {
                ParamValue::Number(n) => self.value.set_component(index, n),
                _ => false,
            };
        }
        if self.value.get() == value {
            return false;
        }
        self.value.set(value);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_json_is_plain_and_stable() {
        let red = Rgb::new(1.0, 0.0, 0.0);
        assert_eq!(red.to_json(), r#"{"r":1,"g":0,"b":0}"#);
        assert_eq!(Rgb::from_json(&red.to_json()).unwrap(), red);
        assert_eq!(Rgb::new(0.5, 0.25, 0.0).to_json(), r#"{"r":0.5,"g":0.25,"b":0}"#);
    }

    #[test]
    fn test_component_target() {
        let live = LiveValue::new(ParamValue::Vector(vec![1.0, 2.0, 3.0]));
        let y = BindingTarget::component(ParamKind::Vector3, live.clone(), 1);
        assert_eq!(y.read(), Some(SnapshotValue::Number(2.0)));
        assert!(y.write(&SnapshotValue::Number(5.0)));
        assert!(!y.write(&SnapshotValue::Number(5.0)));
        assert_eq!(live.get(), ParamValue::Vector(vec![1.0, 5.0, 3.0]));
    }

    #[test]
    fn test_wrong_shape_is_ignored() {
        let live = LiveValue::new(ParamValue::Bool(true));
        let target = BindingTarget::whole(ParamKind::Boolean, live.clone());
        assert!(!target.write(&SnapshotValue::Number(0.0)));
        assert_eq!(live.get(), ParamValue::Bool(true));
    }

    /// Stands in for a uniform object owned by the page.
    #[derive(Default)]
    struct HostUniform {
        value: RefCell<Option<ParamValue>>,
        pushes: std::cell::Cell<usize>,
    }

    impl ValueSync for HostUniform {
        fn pull(&self) -> Option<ParamValue> {
            self.value.borrow().clone()
        }

        fn push(&self, value: &ParamValue) {
            *self.value.borrow_mut() = Some(value.clone());
            self.pushes.set(self.pushes.get() + 1);
        }
    }

    #[test]
    fn test_synced_value_follows_the_host() {
        let host = Rc::new(HostUniform::default());
        *host.value.borrow_mut() = Some(ParamValue::Vector(vec![1.0, 2.0]));
        let live = LiveValue::synced(ParamValue::Vector(vec![0.0, 0.0]), host.clone());
        assert_eq!(live.get(), ParamValue::Vector(vec![1.0, 2.0]));

        // changed on the page behind our back
        *host.value.borrow_mut() = Some(ParamValue::Vector(vec![3.0, 2.0]));
        let x = BindingTarget::component(ParamKind::Vector2, live.clone(), 0);
        assert_eq!(x.read(), Some(SnapshotValue::Number(3.0)));

        let y = BindingTarget::component(ParamKind::Vector2, live, 1);
        assert!(y.write(&SnapshotValue::Number(8.0)));
        assert_eq!(*host.value.borrow(), Some(ParamValue::Vector(vec![3.0, 8.0])));
        assert_eq!(host.pushes.get(), 1);
    }

    #[test]
    fn test_texture_decodes_url_but_never_restores() {
        let live = LiveValue::new(ParamValue::Texture(None));
        let target = BindingTarget::whole(ParamKind::Texture, live.clone());
        let url = SnapshotValue::Text("blob:2".to_string());
        assert_eq!(
            target.decode(&url),
            Some(ParamValue::Texture(Some("blob:2".to_string())))
        );
        assert!(!target.write(&url));
        assert_eq!(live.get(), ParamValue::Texture(None));
    }

    #[test]
    fn test_texture_has_no_snapshot() {
        let live = LiveValue::new(ParamValue::Texture(Some("blob:1".into())));
        assert!(BindingTarget::whole(ParamKind::Texture, live).read().is_none());
    }
}
