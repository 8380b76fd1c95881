//! Bounded undo/redo stacks.

use std::collections::VecDeque;

/// Undo and redo stacks of snapshots, each capped at `depth` entries.
///
/// Pushing past the cap silently drops the oldest entry. Recording a new
/// undo entry discards the redo stack.
#[derive(Debug, Clone)]
pub struct UndoHistory<T> {
    undo: VecDeque<T>,
    redo: VecDeque<T>,
    depth: usize,
}

impl<T> UndoHistory<T> {
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            undo: VecDeque::with_capacity(depth),
            redo: VecDeque::with_capacity(depth),
            depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Record the state from before a mutation.
    pub fn record(&mut self, snapshot: T) {
        self.push_undo(snapshot);
        self.redo.clear();
    }

    /// Replace `current` with the most recent undo entry, keeping the
    /// replaced state for redo. Returns `false` when there is nothing to undo.
    pub fn undo(&mut self, current: &mut T) -> bool {
        let Some(previous) = self.pop_undo() else {
            return false;
        };
        let replaced = std::mem::replace(current, previous);
        self.push_redo(replaced);
        true
    }

    /// Mirror of [`UndoHistory::undo`].
    pub fn redo(&mut self, current: &mut T) -> bool {
        let Some(next) = self.pop_redo() else {
            return false;
        };
        let replaced = std::mem::replace(current, next);
        self.push_undo(replaced);
        true
    }

    pub fn pop_undo(&mut self) -> Option<T> {
        self.undo.pop_back()
    }

    pub fn pop_redo(&mut self) -> Option<T> {
        self.redo.pop_back()
    }

    /// Push onto the undo stack without touching the redo stack.
    pub fn push_undo(&mut self, item: T) {
        Self::push_bounded(&mut self.undo, item, self.depth);
    }

    pub fn push_redo(&mut self, item: T) {
        Self::push_bounded(&mut self.redo, item, self.depth);
    }

    /// Most recent undo entry matching `pred`, with its distance from the top.
    pub fn find_undo_mut(&mut self, pred: impl Fn(&T) -> bool) -> Option<(usize, &mut T)> {
        self.undo.iter_mut().rev().enumerate().find(|(_, e)| pred(e))
    }

    /// Most recent redo entry matching `pred`, with its distance from the top.
    pub fn find_redo_mut(&mut self, pred: impl Fn(&T) -> bool) -> Option<(usize, &mut T)> {
        self.redo.iter_mut().rev().enumerate().find(|(_, e)| pred(e))
    }

    pub fn retain(&mut self, keep: impl Fn(&T) -> bool) {
        self.undo.retain(|e| keep(e));
        self.redo.retain(|e| keep(e));
    }

    pub fn clear_redo(&mut self) {
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    fn push_bounded(stack: &mut VecDeque<T>, item: T, depth: usize) {
        if stack.len() == depth {
            stack.pop_front();
        }
        stack.push_back(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undo_redo_cycle() {
        let mut h = UndoHistory::new(3);
        let mut state = 0;

        for next in 1..=2 {
            h.record(state);
            state = next;
        }

        assert!(h.undo(&mut state));
        assert_eq!(state, 1);
        assert!(h.undo(&mut state));
        assert_eq!(state, 0);
        assert!(!h.undo(&mut state));
        assert_eq!(state, 0);

        assert!(h.redo(&mut state));
        assert_eq!(state, 1);
        assert!(h.redo(&mut state));
        assert_eq!(state, 2);
        assert!(!h.redo(&mut state));
    }

    #[test]
    fn test_oldest_evicted() {
        let mut h = UndoHistory::new(2);
        h.record(1);
        h.record(2);
        h.record(3);
        assert_eq!(h.undo_len(), 2);

        let mut state = 4;
        assert!(h.undo(&mut state));
        assert_eq!(state, 3);
        assert!(h.undo(&mut state));
        assert_eq!(state, 2);
        assert!(!h.undo(&mut state));
    }

    #[test]
    fn test_record_clears_redo() {
        let mut h = UndoHistory::new(4);
        h.record(0);
        let mut state = 1;
        assert!(h.undo(&mut state));
        assert!(h.can_redo());
        h.record(0);
        assert!(!h.can_redo());
    }

    #[test]
    fn test_find_newest_first() {
        let mut h = UndoHistory::new(4);
        h.record(1);
        h.record(2);
        h.record(3);
        let (depth, entry) = h.find_undo_mut(|&e| e < 3).unwrap();
        assert_eq!((depth, *entry), (1, 2));
        *entry = 0;
        h.retain(|&e| e != 0);
        assert_eq!(h.undo_len(), 2);
        assert!(h.find_redo_mut(|_| true).is_none());
    }

    #[test]
    fn test_zero_depth_clamped() {
        let mut h = UndoHistory::new(0);
        assert_eq!(h.depth(), 1);
        h.record('a');
        h.record('b');
        assert_eq!(h.undo_len(), 1);
    }
}
