//! # Edit Sessions
//!
//! A session is a batch in the Pending state. Staged actions are applied to a
//! private working tree as they arrive, so errors surface at staging time and
//! later candidates are diffed against the preview. Nothing reaches the log
//! until [`EditSession::commit`]; dropping the session discards the batch.
//!
//! The session holds the log mutably, so only one batch can be pending at a
//! time.

use crate::actions::{apply_all, EditAction};
use crate::edit_log::{candidate_actions, EditLog, PendingDiff};
use crate::undo_stack::{BatchState, HistoryEntry};
use crate::EditorError;
use std::sync::Arc;
use tandem_model::Node;
use tracing::debug;

pub struct EditSession<'a> {
    log: &'a mut EditLog,
    description: Option<String>,

    /// Log root with every staged action applied
    working: Arc<Node>,

    /// Staged actions with prior state captured
    staged: Vec<EditAction>,
}

impl<'a> EditSession<'a> {
    pub(crate) fn new(log: &'a mut EditLog, description: Option<String>) -> Self {
        let working = log.root().clone();
        Self {
            log,
            description,
            working,
            staged: Vec::new(),
        }
    }

    pub fn state(&self) -> BatchState {
        BatchState::Pending
    }

    /// Version of the tree this batch was started against
    pub fn base_version(&self) -> u64 {
        self.log.version()
    }

    /// Tree as it will be after commit
    pub fn preview(&self) -> &Arc<Node> {
        &self.working
    }

    pub fn staged(&self) -> &[EditAction] {
        &self.staged
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn stage(&mut self, action: EditAction) -> Result<(), EditorError> {
        self.stage_all([action])
    }

    /// Stage several actions; if any fails none of them is staged
    pub fn stage_all(&mut self, actions: impl IntoIterator<Item = EditAction>) -> Result<(), EditorError> {
        let actions: Vec<EditAction> = actions.into_iter().collect();
        let (working, applied) = apply_all(&actions, &self.working)?;

        self.working = working;
        self.staged.extend(applied);
        Ok(())
    }

    /// Stage a diff computed by [`EditLog::diff_against`]
    pub fn stage_diff(&mut self, diff: PendingDiff) -> Result<(), EditorError> {
        self.log.check_base_version(diff.base_version)?;
        self.stage_all(diff.actions)
    }

    /// Stage the changes that turn the existing node with the candidate's
    /// identity into the candidate
    pub fn stage_candidate(&mut self, candidate: &Node) -> Result<(), EditorError> {
        let actions = candidate_actions(&self.working, candidate)?;
        self.stage_all(actions)
    }

    /// Apply the batch to the log
    pub fn commit(self) -> Result<HistoryEntry, EditorError> {
        self.log.install(self.working, self.staged, self.description)
    }

    pub fn discard(self) {
        debug!(
            staged = self.staged.len(),
            "Discarding pending batch"
        );
    }
}
