//! Snapshot undo/redo history.
//!
//! Each checkpoint stores a full copy of the annotation set as it was before
//! a mutation. Undo swaps the live set with the newest checkpoint and keeps
//! the live set for redo.

use std::collections::VecDeque;

use crate::constants::HISTORY_LIMIT;

/// Bounded two-stack undo history over cloneable snapshots.
///
/// ```
/// use candy_annotate::HistoryStack;
///
/// let mut history: HistoryStack<Vec<u32>> = HistoryStack::new(50);
///
/// // Before making a change, checkpoint the current state
/// let mut live = vec![1];
/// history.checkpoint(live.clone());
/// live.push(2);
///
/// // Undo returns the previous state
/// if let Some(previous) = history.undo(live) {
///     assert_eq!(previous, vec![1]);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HistoryStack<T: Clone> {
    /// States that can be restored by undo (oldest first)
    undo_stack: VecDeque<T>,
    /// States that can be restored by redo (newest last)
    redo_stack: Vec<T>,
    /// Maximum number of undo entries
    max_history: usize,
}

impl<T: Clone> Default for HistoryStack<T> {
    fn default() -> Self {
        Self::new(HISTORY_LIMIT)
    }
}

impl<T: Clone> HistoryStack<T> {
    /// Create a history with the given depth.
    pub fn new(max_history: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_history: max_history.max(1),
        }
    }

    /// Record the state before a mutation.
    ///
    /// Discards any redo entries and evicts the oldest entry when full.
    pub fn checkpoint(&mut self, state: T) {
        self.undo_stack.push_back(state);
        self.redo_stack.clear();

        while self.undo_stack.len() > self.max_history {
            self.undo_stack.pop_front();
            log::trace!("History: evicted oldest checkpoint");
        }
        log::debug!(
            "📝 Undo: pushed checkpoint ({} undo entries)",
            self.undo_stack.len()
        );
    }

    /// Restore the newest checkpoint, or `None` if there is nothing to undo.
    ///
    /// `current` is kept so it can be restored by redo.
    pub fn undo(&mut self, current: T) -> Option<T> {
        let previous = self.undo_stack.pop_back()?;
        self.redo_stack.push(current);
        log::debug!(
            "⏪ Undo ({} undo / {} redo)",
            self.undo_stack.len(),
            self.redo_stack.len()
        );
        Some(previous)
    }

    /// Re-apply the newest undone state, or `None` if there is nothing to redo.
    pub fn redo(&mut self, current: T) -> Option<T> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push_back(current);
        log::debug!(
            "⏩ Redo ({} undo / {} redo)",
            self.undo_stack.len(),
            self.redo_stack.len()
        );
        Some(next)
    }

    /// Forget everything (called on image load).
    pub fn reset(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of undo steps available.
    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of redo steps available.
    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Configured depth.
    pub fn max_history(&self) -> usize {
        self.max_history
    }
}
