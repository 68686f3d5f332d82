//! # Document Handle
//!
//! One editable document: its edit log, id generator and persistence state.
//!
//! ## Lifecycle
//!
//! ```text
//! Load → Edit (batches) → Save
//!   ↓         ↓             ↓
//! File    EditLog        Persister
//! ```
//!
//! Structural edits that would leave the project in a broken state are
//! refused with a [`ConfirmError`] the caller shows to the user.

use crate::actions::{EditAction, EditError};
use crate::config::EditorConfig;
use crate::edit_log::{EditLog, PendingDiff, RebaseReport, Snapshot};
use crate::persistence::{PersistOutcome, PersistRequest, PersistenceError, Persister};
use crate::session::EditSession;
use crate::undo_stack::{HistoryEntry, UndoStack};
use crate::{ConfirmError, EditorError};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tandem_common::{collect_components, collect_instances_of};
use tandem_model::{
    get_document_id, IDGenerator, Node, NodeId, NodeTag, ReferenceTable, Resolver, ValueKey,
};
use tracing::{info, warn};

pub struct Document {
    pub id: String,

    /// Where the document is persisted
    pub path: PathBuf,

    log: EditLog,
    ids: IDGenerator,
    config: EditorConfig,

    /// Last version known to be on disk
    persisted_version: Option<u64>,
}

impl Document {
    /// New in-memory document, not yet saved
    pub fn new(path: impl Into<PathBuf>, root: Node) -> Self {
        Self::with_config(path, root, EditorConfig::default())
    }

    pub fn with_config(path: impl Into<PathBuf>, root: Node, config: EditorConfig) -> Self {
        let path = path.into();
        let path_str = path.to_string_lossy().to_string();

        let mut ids = IDGenerator::new(&path_str);
        ids.observe(&root);

        Self {
            id: get_document_id(&path_str),
            path,
            log: EditLog::with_history_depth(root.into_shared(), config.history_depth),
            ids,
            config,
            persisted_version: None,
        }
    }

    /// Load a persisted document. Versions continue from the one on disk.
    pub async fn load(
        persister: &Persister,
        path: impl Into<PathBuf>,
        resolver: Arc<dyn Resolver>,
        config: EditorConfig,
    ) -> Result<(Self, ReferenceTable), EditorError> {
        let path = path.into();
        let (header, deserialized) = persister.load(&path, resolver).await?;

        let mut ids = IDGenerator::new(&path.to_string_lossy());
        ids.observe(&deserialized.root);

        info!(
            document_id = %header.document_id,
            version = header.version,
            "Loaded document"
        );

        let document = Self {
            id: header.document_id,
            path,
            log: EditLog::with_history_depth(deserialized.root, config.history_depth)
                .starting_at(header.version),
            ids,
            config,
            persisted_version: Some(header.version),
        };
        Ok((document, deserialized.references))
    }

    pub fn root(&self) -> &Arc<Node> {
        self.log.root()
    }

    pub fn version(&self) -> u64 {
        self.log.version()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.log.snapshot()
    }

    pub fn history(&self) -> &UndoStack {
        self.log.history()
    }

    pub fn log(&self) -> &EditLog {
        &self.log
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn persisted_version(&self) -> Option<u64> {
        self.persisted_version
    }

    /// Whether the in-memory tree differs from the last saved version
    pub fn is_dirty(&self) -> bool {
        self.persisted_version != Some(self.version())
    }

    /// Fresh identity for a node created in this document
    pub fn new_id(&mut self) -> NodeId {
        self.ids.new_id()
    }

    pub fn begin_session(&mut self, description: impl Into<String>) -> EditSession<'_> {
        self.log.begin_session(description)
    }

    /// Replace the node sharing the candidate's identity with the candidate,
    /// as a minimal batch
    pub fn apply_candidate(&mut self, candidate: &Node, description: Option<String>) -> Result<HistoryEntry, EditorError> {
        let ancestors = ancestor_components(self.root(), &candidate.id);
        check_self_reference(candidate, ancestors)?;

        let diff = self.log.diff_against(candidate)?;
        self.commit_diff(diff, candidate, description)
    }

    /// Commit a diff computed earlier. If the tree moved on in the meantime
    /// the diff is recomputed against the current tree, up to the configured
    /// number of retries.
    pub fn commit_diff(
        &mut self,
        diff: PendingDiff,
        candidate: &Node,
        description: Option<String>,
    ) -> Result<HistoryEntry, EditorError> {
        let mut diff = diff;
        let mut retries = self.config.stale_retries;

        loop {
            match self.log.commit_diff(diff, description.clone()) {
                Err(EditorError::StaleBaseVersion { .. }) if retries > 0 => {
                    retries -= 1;
                    diff = self.log.diff_against(candidate)?;
                }
                result => return result,
            }
        }
    }

    pub fn set_value(
        &mut self,
        node_id: &str,
        key: ValueKey,
        value: Option<Value>,
        description: Option<String>,
    ) -> Result<HistoryEntry, EditorError> {
        self.log
            .commit_batch(vec![EditAction::set(node_id, key, value)], description)
    }

    pub fn insert_node(
        &mut self,
        parent_id: &str,
        index: usize,
        node: Node,
        description: Option<String>,
    ) -> Result<HistoryEntry, EditorError> {
        let mut enclosing = ancestor_components(self.root(), parent_id);
        if self.root().find(parent_id).map(|p| p.tag()) == Some(NodeTag::Component) {
            enclosing.push(parent_id.to_string());
        }
        check_self_reference(&node, enclosing)?;

        self.log
            .commit_batch(vec![EditAction::insert(parent_id, index, node)], description)
    }

    /// Remove a node and its subtree. Refused while a component defined in
    /// the subtree is still instantiated elsewhere.
    pub fn remove_node(&mut self, node_id: &str, description: Option<String>) -> Result<HistoryEntry, EditorError> {
        let root = self.root().clone();
        let (parent, index) = locate(&root, node_id)?;

        let subtree = &parent.children[index];
        let inside = subtree.descendant_ids();

        for component_id in collect_components(subtree) {
            let instances: Vec<NodeId> = collect_instances_of(&root, &component_id)
                .into_iter()
                .filter(|id| !inside.contains(id))
                .collect();

            if !instances.is_empty() {
                info!(
                    component_id = %component_id,
                    instances = instances.len(),
                    "Refusing to remove instantiated component"
                );
                return Err(ConfirmError::ComponentHasInstances {
                    component_id,
                    instances,
                }
                .into());
            }
        }

        self.log.commit_batch(
            vec![EditAction::remove(parent.id.clone(), index, node_id)],
            description,
        )
    }

    /// Move a node to `to` within its current parent
    pub fn move_node(&mut self, node_id: &str, to: usize, description: Option<String>) -> Result<HistoryEntry, EditorError> {
        let root = self.root().clone();
        let (parent, from) = locate(&root, node_id)?;

        self.log.commit_batch(
            vec![EditAction::move_child(parent.id.clone(), node_id, from, to)],
            description,
        )
    }

    pub fn undo(&mut self) -> Result<bool, EditorError> {
        self.log.undo()
    }

    pub fn redo(&mut self) -> Result<bool, EditorError> {
        self.log.redo()
    }

    /// Replace the tree after an external change on disk
    pub fn reload(&mut self, root: Node) -> u64 {
        self.ids.observe(&root);
        self.log.reload(root.into_shared())
    }

    pub fn rebase(&mut self, actions: Vec<EditAction>, description: Option<String>) -> Result<RebaseReport, EditorError> {
        self.log.rebase(actions, description)
    }

    /// Current tree and version, ready to hand to a [`Persister`] without
    /// borrowing the document
    pub fn persist_request(&self) -> PersistRequest {
        PersistRequest {
            document_id: self.id.clone(),
            path: self.path.clone(),
            version: self.version(),
            root: self.root().clone(),
        }
    }

    /// Update batch states from the outcome of a write of `version`
    pub fn record_persist(
        &mut self,
        version: u64,
        result: Result<PersistOutcome, PersistenceError>,
    ) -> Result<PersistOutcome, EditorError> {
        match result {
            Ok(PersistOutcome::Written { version }) => {
                self.persisted_version = Some(self.persisted_version.map_or(version, |v| v.max(version)));
                self.log.mark_persisted(version);
                Ok(PersistOutcome::Written { version })
            }
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(document_id = %self.id, version, error = %err, "Document not saved");
                self.log.mark_persist_failed(version);
                Err(err.into())
            }
        }
    }

    pub async fn save(&mut self, persister: &Persister) -> Result<PersistOutcome, EditorError> {
        let request = self.persist_request();
        let version = request.version;
        let result = persister.persist(request).await;
        self.record_persist(version, result)
    }
}

/// Parent of `node_id` and its index there
fn locate<'a>(root: &'a Node, node_id: &str) -> Result<(&'a Node, usize), EditorError> {
    if !root.contains(node_id) {
        return Err(EditError::NodeNotFound(node_id.to_string()).into());
    }
    let parent = root
        .parent_of(node_id)
        .ok_or_else(|| EditError::ParentNotFound(node_id.to_string()))?;
    let index = parent
        .children
        .iter()
        .position(|child| child.id == node_id)
        .ok_or_else(|| EditError::NodeNotFound(node_id.to_string()))?;
    Ok((parent, index))
}

/// Components strictly above `id`, outermost first
fn ancestor_components(root: &Node, id: &str) -> Vec<NodeId> {
    let Some(path) = root.path_to(id) else {
        return Vec::new();
    };

    let mut components = Vec::new();
    let mut current = root;
    for index in path {
        if current.tag() == NodeTag::Component {
            components.push(current.id.clone());
        }
        current = &current.children[index];
    }
    components
}

/// Refuse a subtree containing an instance of a component that encloses it
fn check_self_reference(node: &Node, mut enclosing: Vec<NodeId>) -> Result<(), ConfirmError> {
    match find_self_reference(node, &mut enclosing) {
        Some(component_id) => {
            info!(component_id = %component_id, "Refusing to insert component in itself");
            Err(ConfirmError::ComponentInsideItself { component_id })
        }
        None => Ok(()),
    }
}

fn find_self_reference(node: &Node, enclosing: &mut Vec<NodeId>) -> Option<NodeId> {
    if let Some(component_id) = node.reference() {
        if enclosing.iter().any(|id| id == component_id) {
            return Some(component_id.to_string());
        }
    }

    let is_component = node.tag() == NodeTag::Component;
    if is_component {
        enclosing.push(node.id.clone());
    }
    let found = node
        .children
        .iter()
        .find_map(|child| find_self_reference(child, enclosing));
    if is_component {
        enclosing.pop();
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(
            "/project/card.json",
            Node::element("root", "div").with_children([
                Node::component("button", "Button").with_children([Node::element("b", "button")]),
                Node::instance("i1", "button"),
            ]),
        )
    }

    #[test]
    fn test_ancestor_components() {
        let doc = doc();
        assert_eq!(ancestor_components(doc.root(), "b"), vec!["button"]);
        assert!(ancestor_components(doc.root(), "i1").is_empty());
    }

    #[test]
    fn test_new_ids_do_not_collide() {
        let mut doc = doc();
        let id = doc.new_id();
        let parent_id = doc.root().id.clone();

        doc.insert_node(&parent_id, 0, Node::text(id.clone(), "hi"), None).unwrap();
        assert_ne!(doc.new_id(), id);
    }

    #[test]
    fn test_new_document_is_dirty() {
        let doc = doc();
        assert!(doc.is_dirty());
        assert_eq!(doc.version(), 0);
    }
}
