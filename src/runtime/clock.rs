//! Millisecond clock used for the save debounce and the hot-reload reapply.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Wall clock, counted from construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-advanced clock; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// A one-shot timer held as a deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<u64>);

impl Deadline {
    /// Replaces any pending deadline.
    pub fn schedule(&mut self, at: u64) {
        self.0 = Some(at);
    }

    pub fn cancel(&mut self) {
        self.0 = None;
    }

    pub fn is_pending(&self) -> bool {
        self.0.is_some()
    }

    pub fn at(&self) -> Option<u64> {
        self.0
    }

    /// True once, when `now` has reached the deadline.
    pub fn fire(&mut self, now: u64) -> bool {
        match self.0 {
            Some(at) if now >= at => {
                self.0 = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_fires_once() {
        let clock = ManualClock::new();
        let mut d = Deadline::default();
        d.schedule(clock.now_ms() + 500);
        clock.advance(499);
        assert!(!d.fire(clock.now_ms()));
        clock.advance(1);
        assert!(d.fire(clock.now_ms()));
        assert!(!d.fire(clock.now_ms()));
    }

    #[test]
    fn test_reschedule_pushes_back() {
        let mut d = Deadline::default();
        d.schedule(500);
        d.schedule(800);
        assert!(!d.fire(600));
        assert!(d.fire(800));
    }
}
