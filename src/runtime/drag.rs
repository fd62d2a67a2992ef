//! Pointer tracking for dragging the panel by its title bar.
//!
//! A press that never moves past [`DRAG_THRESHOLD_PX`] is a click (the host
//! toggles the panel); anything further relocates it.

use serde::{Deserialize, Serialize};

pub const DRAG_THRESHOLD_PX: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PanelPosition {
    pub left: f64,
    pub top: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragOutcome {
    /// No press was in progress.
    Idle,
    Click,
    Moved(PanelPosition),
}

#[derive(Debug, Clone, Copy)]
struct Press {
    x: f64,
    y: f64,
    origin: PanelPosition,
    dragging: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DragTracker {
    press: Option<Press>,
}

impl DragTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pressed(&self) -> bool {
        self.press.is_some()
    }

    pub fn pointer_down(&mut self, x: f64, y: f64, origin: PanelPosition) {
        self.press = Some(Press {
            x,
            y,
            origin,
            dragging: false,
        });
    }

    /// New panel position while dragging, `None` below the threshold.
    pub fn pointer_move(&mut self, x: f64, y: f64) -> Option<PanelPosition> {
        let press = self.press.as_mut()?;
        let (dx, dy) = (x - press.x, y - press.y);
        if !press.dragging && dx.abs() <= DRAG_THRESHOLD_PX && dy.abs() <= DRAG_THRESHOLD_PX {
            return None;
        }
        press.dragging = true;
        Some(PanelPosition {
            left: press.origin.left + dx,
            top: press.origin.top + dy,
        })
    }

    pub fn pointer_up(&mut self, x: f64, y: f64) -> DragOutcome {
        let moved = self.pointer_move(x, y);
        match self.press.take() {
            None => DragOutcome::Idle,
            Some(press) if press.dragging => DragOutcome::Moved(moved.unwrap_or(press.origin)),
            Some(_) => DragOutcome::Click,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_motion_is_a_click() {
        let mut drag = DragTracker::new();
        drag.pointer_down(10.0, 10.0, PanelPosition::default());
        assert_eq!(drag.pointer_move(12.0, 11.0), None);
        assert_eq!(drag.pointer_up(13.0, 10.0), DragOutcome::Click);
        assert!(!drag.is_pressed());
    }

    #[test]
    fn test_drag_offsets_from_origin() {
        let mut drag = DragTracker::new();
        let origin = PanelPosition { left: 100.0, top: 20.0 };
        drag.pointer_down(110.0, 25.0, origin);
        assert_eq!(
            drag.pointer_move(150.0, 35.0),
            Some(PanelPosition { left: 140.0, top: 30.0 })
        );
        // back inside the threshold still counts once dragging started
        assert_eq!(
            drag.pointer_up(111.0, 25.0),
            DragOutcome::Moved(PanelPosition { left: 101.0, top: 20.0 })
        );
    }

    #[test]
    fn test_release_without_press() {
        assert_eq!(DragTracker::new().pointer_up(0.0, 0.0), DragOutcome::Idle);
    }
}
