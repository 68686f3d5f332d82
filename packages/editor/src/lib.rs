//! # Tandem Editor
//!
//! Core document editing engine: minimal diffs between trees, an invertible
//! edit-action log with bounded undo/redo, and ordered persistence.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ candidate tree (from a visual edit)         │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ diff: old tree + candidate → EditActions    │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ edit log: batches, versions, undo/redo      │
//! │  - Atomic commit of staged actions          │
//! │  - Stale diffs rejected by version          │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ persister: whole-tree writes, newest wins   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Identity is stable**: nodes keep their id across edits and replay
//! 2. **Snapshots are immutable**: applying an action yields a new root that
//!    shares every untouched subtree with the old one
//! 3. **Every action is invertible** once applied
//! 4. **One writer per document**: the log is the only path to the tree
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tandem_editor::{Document, Persister};
//!
//! let mut doc = Document::new("card.json", root);
//!
//! // Apply a visual edit as a minimal batch
//! doc.apply_candidate(&edited_node, Some("Resize card".into()))?;
//!
//! // Undo it
//! doc.undo()?;
//!
//! // Save
//! doc.save(&persister).await?;
//! ```

pub mod actions;
pub mod config;
pub mod diff;
mod document;
pub mod edit_log;
mod errors;
pub mod persistence;
mod session;
pub mod undo_stack;

pub use actions::{apply_all, deserialize_actions, serialize_actions, Applied, EditAction, EditError};
pub use config::{EditorConfig, DEFAULT_CONFIG_NAME};
pub use diff::{diff, replace, DiffError, DiffStats};
pub use document::Document;
pub use edit_log::{Conflict, EditLog, PendingDiff, RebaseReport, Snapshot};
pub use errors::{ConfirmError, EditorError};
pub use persistence::{PersistOutcome, PersistRequest, PersistenceError, Persister};
pub use session::EditSession;
pub use undo_stack::{BatchState, HistoryEntry, UndoStack};

// Re-export common types for convenience
pub use tandem_model::{Node, NodeId, NodeKind, ValueKey};
