//! # Undo/Redo Stack
//!
//! Bounded history of committed batches.
//!
//! ## Design
//!
//! - Each batch records its captured actions and their inverses
//! - Undo applies the inverses and moves the batch to the redo stack
//! - Redo reapplies the captured actions
//! - New batches clear the redo stack
//! - The oldest batch is evicted silently once the depth limit is reached

use crate::actions::{serialize_actions, EditAction};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tandem_model::{NodeId, PlainValue, SerializeError};

pub const DEFAULT_HISTORY_DEPTH: usize = 100;

/// Lifecycle of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchState {
    /// Staged, not yet applied
    Pending,
    /// Applied in memory, not yet on disk
    Applied,
    /// Written to storage
    Persisted,
    /// Applied in memory but the write failed
    PersistFailed,
    /// Reverted by undo
    Undone,
}

/// A group of actions undone and redone together
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Sequence number, unique within a log
    pub id: u64,

    /// Tree version this batch produced
    pub version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Captured actions in application order
    pub actions: Vec<EditAction>,

    /// Inverses in undo order
    pub inverses: Vec<EditAction>,

    pub state: BatchState,
}

impl HistoryEntry {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Nodes affected by this batch, deduplicated in first-seen order
    pub fn touched(&self) -> Vec<NodeId> {
        let mut touched: Vec<NodeId> = Vec::new();
        for id in self.actions.iter().flat_map(EditAction::touched) {
            if !touched.contains(&id) {
                touched.push(id);
            }
        }
        touched
    }

    /// Actions as a plain history payload
    pub fn payload(&self) -> Result<PlainValue, SerializeError> {
        serialize_actions(&self.actions)
    }
}

#[derive(Debug)]
pub struct UndoStack {
    /// Applied batches (most recent last)
    undo_stack: VecDeque<HistoryEntry>,

    /// Undone batches (most recent last)
    redo_stack: Vec<HistoryEntry>,

    max_levels: usize,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::with_max_levels(DEFAULT_HISTORY_DEPTH)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_levels: max_levels.max(1),
        }
    }

    /// Record a newly committed batch
    pub fn push(&mut self, entry: HistoryEntry) {
        self.push_undo(entry);
        self.redo_stack.clear();
    }

    /// Record a batch without touching the redo stack (used by redo)
    pub(crate) fn push_undo(&mut self, entry: HistoryEntry) {
        self.undo_stack.push_back(entry);
        while self.undo_stack.len() > self.max_levels {
            self.undo_stack.pop_front();
        }
    }

    pub(crate) fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.undo_stack.pop_back()
    }

    pub(crate) fn push_redo(&mut self, entry: HistoryEntry) {
        self.redo_stack.push(entry);
    }

    pub(crate) fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.redo_stack.pop()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().and_then(|e| e.description.as_deref())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().and_then(|e| e.description.as_deref())
    }

    /// Most recently committed batch still on the undo stack
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.undo_stack.back()
    }

    /// Applied batches, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.undo_stack.iter()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// A write of `version` covers every applied batch up to it, since the
    /// whole tree is persisted.
    pub fn mark_persisted(&mut self, version: u64) {
        for entry in self.undo_stack.iter_mut() {
            if entry.version <= version && entry.state != BatchState::Undone {
                entry.state = BatchState::Persisted;
            }
        }
    }

    pub fn mark_persist_failed(&mut self, version: u64) {
        for entry in self.undo_stack.iter_mut() {
            if entry.version == version && entry.state == BatchState::Applied {
                entry.state = BatchState::PersistFailed;
            }
        }
    }

    /// Applied batches as a plain history payload, oldest first
    pub fn to_payload(&self) -> Result<PlainValue, SerializeError> {
        Ok(serde_json::to_value(self.undo_stack.iter().collect::<Vec<_>>())?)
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tandem_model::ValueKey;

    fn entry(id: u64) -> HistoryEntry {
        HistoryEntry {
            id,
            version: id,
            description: Some(format!("batch {}", id)),
            actions: vec![EditAction::set("n", ValueKey::metadata("k"), Some(json!(id)))],
            inverses: vec![EditAction::set("n", ValueKey::metadata("k"), None)],
            state: BatchState::Applied,
        }
    }

    #[test]
    fn test_bounded_depth_evicts_oldest() {
        let mut stack = UndoStack::with_max_levels(3);
        for id in 1..=5 {
            stack.push(entry(id));
        }

        assert_eq!(stack.undo_levels(), 3);
        let ids: Vec<u64> = stack.entries().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn test_push_clears_redo() {
        let mut stack = UndoStack::new();
        stack.push(entry(1));
        let undone = stack.pop_undo().unwrap();
        stack.push_redo(undone);
        assert!(stack.can_redo());
        assert_eq!(stack.redo_description(), Some("batch 1"));

        stack.push(entry(2));
        assert!(!stack.can_redo());
        assert_eq!(stack.undo_description(), Some("batch 2"));
    }

    #[test]
    fn test_mark_persisted_covers_earlier_batches() {
        let mut stack = UndoStack::new();
        stack.push(entry(1));
        stack.push(entry(2));
        stack.push(entry(3));

        stack.mark_persist_failed(1);
        stack.mark_persisted(2);

        let states: Vec<BatchState> = stack.entries().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![BatchState::Persisted, BatchState::Persisted, BatchState::Applied]
        );
    }

    #[test]
    fn test_payload() {
        let mut stack = UndoStack::new();
        stack.push(entry(1));

        let payload = stack.to_payload().unwrap();
        assert_eq!(payload[0]["state"], "applied");
        assert_eq!(payload[0]["actions"][0]["kind"], "set");
    }
}
