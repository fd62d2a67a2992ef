use super::snapshot::StateSnapshot;

/// Undo and redo stacks of whole-panel snapshots.
#[derive(Debug, Default, Clone)]
pub struct History {
    undo: Vec<StateSnapshot>,
    redo: Vec<StateSnapshot>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_undo(&mut self, snapshot: StateSnapshot) {
        self.undo.push(snapshot);
    }

    pub fn push_redo(&mut self, snapshot: StateSnapshot) {
        self.redo.push(snapshot);
    }

    pub fn pop_undo(&mut self) -> Option<StateSnapshot> {
        self.undo.pop()
    }

    pub fn pop_redo(&mut self) -> Option<StateSnapshot> {
        self.redo.pop()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    pub fn peek_redo(&self) -> Option<&StateSnapshot> {
        self.redo.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::snapshot::SnapshotValue;

    #[test]
    fn test_lifo() {
        let mut h = History::new();
        let mut a = StateSnapshot::new();
        a.insert("a", SnapshotValue::Number(1.0));
        let mut b = StateSnapshot::new();
        b.insert("b", SnapshotValue::Number(2.0));
        h.push_undo(a.clone());
        h.push_undo(b.clone());
        assert_eq!(h.pop_undo(), Some(b));
        assert_eq!(h.pop_undo(), Some(a));
        assert!(!h.can_undo());
        assert!(!h.can_redo());
    }
}
