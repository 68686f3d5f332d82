//! Error types for the editor

use tandem_common::CommonError;
use tandem_model::{NodeId, SerializeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Edit error: {0}")]
    Edit(#[from] crate::actions::EditError),

    #[error("Diff error: {0}")]
    Diff(#[from] crate::diff::DiffError),

    #[error("Stale base version {base} (current version is {current})")]
    StaleBaseVersion { base: u64, current: u64 },

    #[error("Not saved: {0}")]
    Persistence(#[from] crate::persistence::PersistenceError),

    #[error("{0}")]
    Confirm(#[from] ConfirmError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] SerializeError),

    #[error("{0}")]
    Common(#[from] CommonError),
}

impl EditorError {
    /// Whether the error should be shown to the user. Everything else is
    /// internal control flow the caller recovers from.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, EditorError::Persistence(_) | EditorError::Confirm(_))
    }

    pub fn user_message(&self) -> Option<String> {
        self.is_user_visible().then(|| self.to_string())
    }
}

/// Operations the user has to be told about instead of silently applying
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfirmError {
    #[error("Cannot insert component in itself")]
    ComponentInsideItself { component_id: NodeId },

    #[error("Please remove all instances of component before deleting it.")]
    ComponentHasInstances {
        component_id: NodeId,
        instances: Vec<NodeId>,
    },
}
