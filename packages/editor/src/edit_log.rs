//! # Edit Log
//!
//! Owns the authoritative tree of one document and its version.
//!
//! Every accepted change goes through a batch: actions are staged in an
//! [`EditSession`], committed atomically, and recorded in the bounded undo
//! history. The version increases on every commit, undo, redo and reload, so
//! any diff computed against an older version can be detected and rejected.

use crate::actions::{apply_all, EditAction, EditError};
use crate::diff::{diff, replace, DiffError};
use crate::session::EditSession;
use crate::undo_stack::{BatchState, HistoryEntry, UndoStack};
use crate::EditorError;
use std::sync::Arc;
use tandem_model::{Node, NodeId};
use tracing::{debug, info, warn};

/// A diff computed against a specific tree version
#[derive(Debug, Clone)]
pub struct PendingDiff {
    pub base_version: u64,
    pub actions: Vec<EditAction>,
}

impl PendingDiff {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Read-only view handed to renderers
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub root: Arc<Node>,
    pub version: u64,

    /// Nodes changed by the last commit, undo or redo
    pub touched: Vec<NodeId>,
}

/// An action that no longer applies to the current tree
#[derive(Debug)]
pub struct Conflict {
    pub action: EditAction,
    pub error: EditorError,
}

#[derive(Debug)]
pub struct RebaseReport {
    pub entry: HistoryEntry,
    pub conflicts: Vec<Conflict>,
}

impl RebaseReport {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

pub struct EditLog {
    root: Arc<Node>,
    version: u64,
    history: UndoStack,
    next_batch_id: u64,
    touched: Vec<NodeId>,
}

impl EditLog {
    pub fn new(root: Arc<Node>) -> Self {
        Self::with_history_depth(root, crate::undo_stack::DEFAULT_HISTORY_DEPTH)
    }

    pub fn with_history_depth(root: Arc<Node>, depth: usize) -> Self {
        Self {
            root,
            version: 0,
            history: UndoStack::with_max_levels(depth),
            next_batch_id: 1,
            touched: Vec::new(),
        }
    }

    /// Start counting versions from `version`, e.g. the version on disk
    pub fn starting_at(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            root: self.root.clone(),
            version: self.version,
            touched: self.touched.clone(),
        }
    }

    /// Start a batch. The log is borrowed until the session is committed or
    /// dropped.
    pub fn begin_session(&mut self, description: impl Into<String>) -> EditSession<'_> {
        EditSession::new(self, Some(description.into()))
    }

    /// Diff the node with the candidate's identity against the candidate
    pub fn diff_against(&self, candidate: &Node) -> Result<PendingDiff, EditorError> {
        Ok(PendingDiff {
            base_version: self.version,
            actions: candidate_actions(&self.root, candidate)?,
        })
    }

    /// Apply `actions` as one undoable batch
    pub fn commit_batch(
        &mut self,
        actions: Vec<EditAction>,
        description: Option<String>,
    ) -> Result<HistoryEntry, EditorError> {
        let mut session = EditSession::new(self, description);
        session.stage_all(actions)?;
        session.commit()
    }

    /// Commit a diff; fails if the tree changed since it was computed
    pub fn commit_diff(&mut self, diff: PendingDiff, description: Option<String>) -> Result<HistoryEntry, EditorError> {
        self.check_base_version(diff.base_version)?;
        self.commit_batch(diff.actions, description)
    }

    /// Revert the most recent batch. Returns `false` when there is nothing
    /// to undo.
    pub fn undo(&mut self) -> Result<bool, EditorError> {
        let Some(mut entry) = self.history.pop_undo() else {
            debug!("Nothing to undo");
            return Ok(false);
        };

        match apply_all(&entry.inverses, &self.root) {
            Ok((root, _)) => {
                self.root = root;
                self.version += 1;
                self.touched = entry.touched();
                entry.state = BatchState::Undone;

                info!(
                    batch_id = entry.id,
                    version = self.version,
                    "Undid batch"
                );
                self.history.push_redo(entry);
                Ok(true)
            }
            Err(err) => {
                self.history.push_undo(entry);
                Err(err.into())
            }
        }
    }

    /// Reapply the most recently undone batch. Returns `false` when there is
    /// nothing to redo.
    pub fn redo(&mut self) -> Result<bool, EditorError> {
        let Some(mut entry) = self.history.pop_redo() else {
            debug!("Nothing to redo");
            return Ok(false);
        };

        match apply_all(&entry.actions, &self.root) {
            Ok((root, applied)) => {
                self.root = root;
                self.version += 1;
                entry.actions = applied;
                entry.version = self.version;
                entry.state = BatchState::Applied;
                self.touched = entry.touched();

                info!(
                    batch_id = entry.id,
                    version = self.version,
                    "Redid batch"
                );
                self.history.push_undo(entry);
                Ok(true)
            }
            Err(err) => {
                self.history.push_redo(entry);
                Err(err.into())
            }
        }
    }

    /// Replace the tree wholesale (external change). History no longer
    /// applies and is cleared.
    pub fn reload(&mut self, root: Arc<Node>) -> u64 {
        self.touched = vec![root.id.clone()];
        self.root = root;
        self.version += 1;
        self.history.clear();

        info!(version = self.version, "Reloaded document tree");
        self.version
    }

    /// Apply `actions` computed against an older tree, skipping the ones that
    /// no longer apply. Applicable actions form one batch.
    pub fn rebase(&mut self, actions: Vec<EditAction>, description: Option<String>) -> Result<RebaseReport, EditorError> {
        let mut session = EditSession::new(self, description);
        let mut conflicts = Vec::new();

        for action in actions {
            if let Err(error) = session.stage(action.clone()) {
                debug!(action = action.name(), target = action.target(), %error, "Skipping conflicting action");
                conflicts.push(Conflict { action, error });
            }
        }

        let entry = session.commit()?;
        if !conflicts.is_empty() {
            warn!(conflicts = conflicts.len(), "Rebase skipped conflicting actions");
        }

        Ok(RebaseReport { entry, conflicts })
    }

    pub fn mark_persisted(&mut self, version: u64) {
        self.history.mark_persisted(version);
    }

    pub fn mark_persist_failed(&mut self, version: u64) {
        self.history.mark_persist_failed(version);
    }

    pub(crate) fn check_base_version(&self, base: u64) -> Result<(), EditorError> {
        if base != self.version {
            warn!(base, current = self.version, "Rejecting diff computed against a stale tree");
            return Err(EditorError::StaleBaseVersion {
                base,
                current: self.version,
            });
        }
        Ok(())
    }

    /// Install the result of a session
    pub(crate) fn install(
        &mut self,
        root: Arc<Node>,
        actions: Vec<EditAction>,
        description: Option<String>,
    ) -> Result<HistoryEntry, EditorError> {
        let id = self.next_batch_id;
        self.next_batch_id += 1;

        if actions.is_empty() {
            debug!(batch_id = id, "Empty batch, nothing to commit");
            return Ok(HistoryEntry {
                id,
                version: self.version,
                description,
                actions,
                inverses: Vec::new(),
                state: BatchState::Applied,
            });
        }

        let inverses = actions
            .iter()
            .rev()
            .map(EditAction::invert)
            .collect::<Result<Vec<_>, _>>()?;

        self.root = root;
        self.version += 1;

        let entry = HistoryEntry {
            id,
            version: self.version,
            description,
            actions,
            inverses,
            state: BatchState::Applied,
        };
        self.touched = entry.touched();

        info!(
            batch_id = id,
            version = self.version,
            actions = entry.actions.len(),
            "Committed batch"
        );

        self.history.push(entry.clone());
        Ok(entry)
    }
}

/// Actions that turn the node sharing the candidate's identity into the
/// candidate. Falls back to a whole-node replacement when the kinds differ.
pub(crate) fn candidate_actions(root: &Node, candidate: &Node) -> Result<Vec<EditAction>, EditorError> {
    let existing = root
        .find(&candidate.id)
        .ok_or_else(|| EditError::NodeNotFound(candidate.id.clone()))?;

    match diff(existing, candidate) {
        Ok(actions) => Ok(actions),
        Err(err @ DiffError::NotDiffable { .. }) => {
            // the root itself cannot be replaced
            let parent = root.parent_of(&candidate.id).ok_or(err)?;
            let index = parent
                .children
                .iter()
                .position(|child| child.id == candidate.id)
                .ok_or_else(|| EditError::NodeNotFound(candidate.id.clone()))?;

            debug!(node_id = %candidate.id, "Kind changed, replacing whole node");
            Ok(replace(&parent.id, index, existing, candidate.clone()))
        }
    }
}
