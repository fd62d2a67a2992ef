//! Runtime controller: the one panel every instrumented file registers into.
//!
//! Generated code reaches it through a single accessor. On the Rust side that
//! is [`with_controller`], a lazily initialised per-thread slot; the host is
//! single-threaded so one thread means one page. In the browser the `wasm`
//! module exports the same controller to JS as `uniformGui`.

pub mod clock;
pub mod controller;
pub mod drag;
pub mod history;
pub mod pane;
pub mod presets;
pub mod snapshot;
pub mod storage;
pub mod value;
pub mod widgets;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub mod wasm;

use std::cell::RefCell;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::Controller;
pub use drag::PanelPosition;
pub use pane::BindingKey;
pub use snapshot::{FolderSnapshot, SnapshotValue, StateSnapshot};
pub use storage::{MemoryStorage, Storage};
pub use value::{LiveValue, ParamValue, Rgb};
pub use widgets::{HeadlessWidgets, Widget, WidgetFactory};

thread_local! {
    static CONTROLLER: RefCell<Option<Controller>> = const { RefCell::new(None) };
}

/// Runs `f` against the page controller, building it with `init` on first use.
///
/// `init` is ignored once the controller exists. Calling `with_controller`
/// again from inside `f` panics.
pub fn with_controller<R>(
    init: impl FnOnce() -> Controller,
    f: impl FnOnce(&mut Controller) -> R,
) -> R {
    CONTROLLER.with(|slot| {
        let mut slot = slot.borrow_mut();
        let controller = slot.get_or_insert_with(init);
        f(controller)
    })
}

/// Like [`with_controller`], but returns `None` instead of panicking when the
/// controller is already borrowed further up the stack (a widget callback
/// firing while the controller is creating or refreshing that widget).
pub fn try_with_controller<R>(
    init: impl FnOnce() -> Controller,
    f: impl FnOnce(&mut Controller) -> R,
) -> Option<R> {
    CONTROLLER.with(|slot| {
        let mut slot = slot.try_borrow_mut().ok()?;
        let controller = slot.get_or_insert_with(init);
        Some(f(controller))
    })
}

pub fn controller_initialized() -> bool {
    CONTROLLER.with(|slot| slot.borrow().is_some())
}

/// Drops the controller, as a full page reload would.
pub fn reset_controller() {
    CONTROLLER.with(|slot| {
        slot.borrow_mut().take();
    });
}
