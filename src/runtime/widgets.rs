//! The seam to the external widget library.
//!
//! The controller decides what exists and where; a [`WidgetFactory`] turns each
//! decision into a concrete control and hands back something disposable.
//! [`HeadlessWidgets`] is the no-op implementation used off-browser and in tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::pane::BindingKey;
use crate::directive::RangeDirective;
use crate::error::WidgetError;

#[derive(Debug, Clone, PartialEq)]
pub enum ControlView {
    Checkbox,
    Slider(RangeDirective),
    ColorPicker,
    /// Image file picker feeding a texture.
    FileInput,
    Folder { expanded: bool },
    /// Undo/redo/reset/copy row.
    HistoryButtons,
    /// Preset name field, save button and selector.
    PresetPicker { names: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlSpec {
    pub label: String,
    pub view: ControlView,
    /// The binding a user edit on this control goes to; `None` for chrome
    /// and group folders.
    pub key: Option<BindingKey>,
}

impl ControlSpec {
    pub fn new(label: &str, view: ControlView) -> Self {
        ControlSpec {
            label: label.to_string(),
            view,
            key: None,
        }
    }

    pub fn for_key(mut self, key: BindingKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn folder(label: &str, expanded: bool) -> Self {
        Self::new(label, ControlView::Folder { expanded })
    }
}

pub trait Widget {
    fn dispose(&mut self) -> Result<(), WidgetError>;

    /// Re-reads the bound value after a programmatic change.
    fn refresh(&mut self) {}
}

pub trait WidgetFactory {
    fn create(&mut self, spec: &ControlSpec) -> Box<dyn Widget>;

    /// Enables/disables the undo and redo buttons.
    fn history_changed(&mut self, _can_undo: bool, _can_redo: bool) {}

    /// Moves the panel root to an absolute page position.
    fn move_panel(&mut self, _left: f64, _top: f64) {}
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct WidgetStats {
    pub created: usize,
    pub disposed: usize,
    pub failed_disposals: usize,
    pub refreshed: usize,
    pub labels: Vec<String>,
    pub history: (bool, bool),
    pub panel_position: Option<(f64, f64)>,
}

impl WidgetStats {
    pub fn live(&self) -> usize {
        self.created - self.disposed
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeadlessWidgets {
    stats: Rc<RefCell<WidgetStats>>,
    fail_dispose: Rc<Cell<bool>>,
}

impl HeadlessWidgets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> WidgetStats {
        self.stats.borrow().clone()
    }

    /// Makes every subsequent `dispose` fail, the way a half-torn-down DOM does.
    pub fn fail_disposals(&self, fail: bool) {
        self.fail_dispose.set(fail);
    }
}

struct HeadlessWidget {
    stats: Rc<RefCell<WidgetStats>>,
    fail_dispose: Rc<Cell<bool>>,
    disposed: bool,
}

impl Widget for HeadlessWidget {
    fn dispose(&mut self) -> Result<(), WidgetError> {
        if self.fail_dispose.get() {
            self.stats.borrow_mut().failed_disposals += 1;
            return Err(WidgetError("element already detached".to_string()));
        }
        if !self.disposed {
            self.disposed = true;
            self.stats.borrow_mut().disposed += 1;
        }
        Ok(())
    }

    fn refresh(&mut self) {
        self.stats.borrow_mut().refreshed += 1;
    }
}

impl WidgetFactory for HeadlessWidgets {
    fn create(&mut self, spec: &ControlSpec) -> Box<dyn Widget> {
        let mut stats = self.stats.borrow_mut();
        stats.created += 1;
        stats.labels.push(spec.label.clone());
        Box::new(HeadlessWidget {
            stats: self.stats.clone(),
            fail_dispose: self.fail_dispose.clone(),
            disposed: false,
        })
    }

    fn history_changed(&mut self, can_undo: bool, can_redo: bool) {
        self.stats.borrow_mut().history = (can_undo, can_redo);
    }

    fn move_panel(&mut self, left: f64, top: f64) {
        self.stats.borrow_mut().panel_position = Some((left, top));
    }
}

/// Disposes a widget, logging instead of propagating a failure.
pub fn dispose_logged(widget: &mut dyn Widget, label: &str) {
    if let Err(e) = widget.dispose() {
        log::error!("[tsl-uniform-gui] failed to dispose {}: {}", label, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_counts() {
        let mut factory = HeadlessWidgets::new();
        let mut a = factory.create(&ControlSpec::new("a", ControlView::Checkbox));
        let _b = factory.create(&ControlSpec::folder("b", true));
        a.dispose().unwrap();
        a.dispose().unwrap();
        let stats = factory.stats();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.disposed, 1);
        assert_eq!(stats.live(), 1);
        assert_eq!(stats.labels, vec!["a", "b"]);
    }

    #[test]
    fn test_failing_dispose() {
        let mut factory = HeadlessWidgets::new();
        let mut w = factory.create(&ControlSpec::new("a", ControlView::Checkbox));
        factory.fail_disposals(true);
        assert!(w.dispose().is_err());
        dispose_logged(w.as_mut(), "a");
        assert_eq!(factory.stats().failed_disposals, 2);
    }
}
