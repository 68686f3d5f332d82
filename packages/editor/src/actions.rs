//! # Edit Actions
//!
//! Atomic, invertible tree mutations.
//!
//! ## Semantics
//!
//! ### Set
//! - Overwrites one value of the target node (`None` removes an attribute or
//!   metadata entry)
//! - Captures the prior value when applied; the inverse writes it back, so a
//!   key that did not exist before is removed again
//!
//! ### InsertChild / RemoveChild
//! - Index-addressed within the parent; no clamping, an out-of-range index is
//!   an error so replay is exact
//! - RemoveChild names the child it expects at the index and captures the
//!   removed subtree when applied
//!
//! ### MoveChild
//! - Removes the child at `from`, then inserts it at `to` in the shortened
//!   list; the inverse swaps `from` and `to`
//!
//! Applying never mutates the input tree: ancestors of the edited node are
//! copied and every other subtree is shared with the previous root.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tandem_model::{ModelError, Node, NodeId, PlainValue, SerializeError, ValueKey};
use thiserror::Error;

/// One atomic mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EditAction {
    /// Overwrite a scalar value of `target`. An absent `value` removes the
    /// entry; a JSON `null` is stored as is.
    Set {
        target: NodeId,
        key: ValueKey,
        #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
        value: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
        previous: Option<Value>,
    },

    /// Insert `child` (with its subtree) under `parent` at `index`
    InsertChild {
        parent: NodeId,
        index: usize,
        child: Node,
    },

    /// Remove the child `child_id` found at `index` under `parent`
    RemoveChild {
        parent: NodeId,
        index: usize,
        #[serde(rename = "childId")]
        child_id: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        removed: Option<Node>,
    },

    /// Reorder a child within `parent`
    MoveChild {
        parent: NodeId,
        #[serde(rename = "childId")]
        child_id: NodeId,
        from: usize,
        to: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Parent not found: {0}")]
    ParentNotFound(NodeId),

    #[error("Index {index} out of bounds for {parent} ({len} children)")]
    IndexOutOfBounds {
        parent: NodeId,
        index: usize,
        len: usize,
    },

    #[error("Expected {expected} at index {index} of {parent}, found {found}")]
    ChildMismatch {
        parent: NodeId,
        index: usize,
        expected: NodeId,
        found: NodeId,
    },

    #[error("Node {0} cannot have children")]
    LeafCannotHaveChildren(NodeId),

    #[error("Node id already in tree: {0}")]
    DuplicateId(NodeId),

    #[error("Invalid value: {0}")]
    InvalidField(#[from] ModelError),

    #[error("Action is not invertible: {0}")]
    NotInvertible(&'static str),
}

/// An action applied to a tree
#[derive(Debug, Clone)]
pub struct Applied {
    /// New root; the input root is left untouched
    pub root: Arc<Node>,

    /// The action with prior state captured, ready to be inverted
    pub action: EditAction,
}

impl EditAction {
    pub fn set(target: impl Into<NodeId>, key: ValueKey, value: Option<Value>) -> Self {
        EditAction::Set {
            target: target.into(),
            key,
            value,
            previous: None,
        }
    }

    pub fn insert(parent: impl Into<NodeId>, index: usize, child: Node) -> Self {
        EditAction::InsertChild {
            parent: parent.into(),
            index,
            child,
        }
    }

    pub fn remove(parent: impl Into<NodeId>, index: usize, child_id: impl Into<NodeId>) -> Self {
        EditAction::RemoveChild {
            parent: parent.into(),
            index,
            child_id: child_id.into(),
            removed: None,
        }
    }

    pub fn move_child(parent: impl Into<NodeId>, child_id: impl Into<NodeId>, from: usize, to: usize) -> Self {
        EditAction::MoveChild {
            parent: parent.into(),
            child_id: child_id.into(),
            from,
            to,
        }
    }

    /// Debug name for logging
    pub fn name(&self) -> &'static str {
        match self {
            EditAction::Set { .. } => "set",
            EditAction::InsertChild { .. } => "insertChild",
            EditAction::RemoveChild { .. } => "removeChild",
            EditAction::MoveChild { .. } => "moveChild",
        }
    }

    /// Node the action is addressed at
    pub fn target(&self) -> &str {
        match self {
            EditAction::Set { target, .. } => target,
            EditAction::InsertChild { parent, .. }
            | EditAction::RemoveChild { parent, .. }
            | EditAction::MoveChild { parent, .. } => parent,
        }
    }

    /// Node ids a renderer has to refresh after this action
    pub fn touched(&self) -> Vec<NodeId> {
        match self {
            EditAction::Set { target, .. } => vec![target.clone()],
            EditAction::InsertChild { parent, child, .. } => vec![parent.clone(), child.id.clone()],
            EditAction::RemoveChild { parent, .. } => vec![parent.clone()],
            EditAction::MoveChild { parent, child_id, .. } => vec![parent.clone(), child_id.clone()],
        }
    }

    /// Apply to `root`, returning the new root and the captured action
    pub fn apply(&self, root: &Arc<Node>) -> Result<Applied, EditError> {
        match self {
            EditAction::Set {
                target, key, value, ..
            } => {
                let (root, previous) = update_node(
                    root,
                    target,
                    || EditError::NodeNotFound(target.clone()),
                    |node| {
                        let previous = node.value(key);
                        node.set_value(key, value.clone())?;
                        Ok(previous)
                    },
                )?;

                Ok(Applied {
                    root,
                    action: EditAction::Set {
                        target: target.clone(),
                        key: key.clone(),
                        value: value.clone(),
                        previous,
                    },
                })
            }

            EditAction::InsertChild {
                parent,
                index,
                child,
            } => {
                if let Some(id) = child.descendant_ids().into_iter().find(|id| root.contains(id)) {
                    return Err(EditError::DuplicateId(id));
                }

                let (root, ()) = update_node(
                    root,
                    parent,
                    || EditError::ParentNotFound(parent.clone()),
                    |node| {
                        if !node.accepts_children() {
                            return Err(EditError::LeafCannotHaveChildren(node.id.clone()));
                        }
                        check_index(node, *index, node.children.len())?;
                        node.children.insert(*index, Arc::new(child.clone()));
                        Ok(())
                    },
                )?;

                Ok(Applied {
                    root,
                    action: self.clone(),
                })
            }

            EditAction::RemoveChild {
                parent,
                index,
                child_id,
                ..
            } => {
                let (root, removed) = update_node(
                    root,
                    parent,
                    || EditError::ParentNotFound(parent.clone()),
                    |node| {
                        expect_child(node, *index, child_id)?;
                        Ok(node.children.remove(*index))
                    },
                )?;

                Ok(Applied {
                    root,
                    action: EditAction::RemoveChild {
                        parent: parent.clone(),
                        index: *index,
                        child_id: child_id.clone(),
                        removed: Some(Arc::try_unwrap(removed).unwrap_or_else(|shared| (*shared).clone())),
                    },
                })
            }

            EditAction::MoveChild {
                parent,
                child_id,
                from,
                to,
            } => {
                let (root, ()) = update_node(
                    root,
                    parent,
                    || EditError::ParentNotFound(parent.clone()),
                    |node| {
                        expect_child(node, *from, child_id)?;
                        let moved = node.children.remove(*from);
                        if let Err(err) = check_index(node, *to, node.children.len()) {
                            node.children.insert(*from, moved);
                            return Err(err);
                        }
                        node.children.insert(*to, moved);
                        Ok(())
                    },
                )?;

                Ok(Applied {
                    root,
                    action: self.clone(),
                })
            }
        }
    }

    /// The action that undoes this one.
    ///
    /// Set actions invert using the captured `previous` value (`None` means
    /// the key did not exist and is removed again). A RemoveChild that has
    /// not been applied carries no subtree to restore and is not invertible.
    pub fn invert(&self) -> Result<EditAction, EditError> {
        Ok(match self {
            EditAction::Set {
                target,
                key,
                value,
                previous,
            } => EditAction::Set {
                target: target.clone(),
                key: key.clone(),
                value: previous.clone(),
                previous: value.clone(),
            },

            EditAction::InsertChild {
                parent,
                index,
                child,
            } => EditAction::RemoveChild {
                parent: parent.clone(),
                index: *index,
                child_id: child.id.clone(),
                removed: Some(child.clone()),
            },

            EditAction::RemoveChild {
                parent,
                index,
                removed: Some(node),
                ..
            } => EditAction::InsertChild {
                parent: parent.clone(),
                index: *index,
                child: node.clone(),
            },

            EditAction::RemoveChild { removed: None, .. } => {
                return Err(EditError::NotInvertible("removed child was not captured"))
            }

            EditAction::MoveChild {
                parent,
                child_id,
                from,
                to,
            } => EditAction::MoveChild {
                parent: parent.clone(),
                child_id: child_id.clone(),
                from: *to,
                to: *from,
            },
        })
    }
}

/// Apply `actions` in order. On failure the input root is unchanged, so a
/// batch is all-or-nothing.
pub fn apply_all(actions: &[EditAction], root: &Arc<Node>) -> Result<(Arc<Node>, Vec<EditAction>), EditError> {
    let mut current = root.clone();
    let mut applied = Vec::with_capacity(actions.len());

    for action in actions {
        let result = action.apply(&current)?;
        current = result.root;
        applied.push(result.action);
    }

    Ok((current, applied))
}

/// Encode a batch as a history payload
pub fn serialize_actions(actions: &[EditAction]) -> Result<PlainValue, SerializeError> {
    Ok(serde_json::to_value(actions)?)
}

/// Decode a history payload
pub fn deserialize_actions(payload: PlainValue) -> Result<Vec<EditAction>, SerializeError> {
    Ok(serde_json::from_value(payload)?)
}

/// A field that is present is `Some`, even when it holds `null`
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Copy the path from `root` to `target`, run `f` on the copy of `target` and
/// return the new root. Subtrees off the path are shared.
fn update_node<R>(
    root: &Arc<Node>,
    target: &str,
    missing: impl FnOnce() -> EditError,
    f: impl FnOnce(&mut Node) -> Result<R, EditError>,
) -> Result<(Arc<Node>, R), EditError> {
    let path = root.path_to(target).ok_or_else(missing)?;
    rebuild(root, &path, f)
}

fn rebuild<R>(
    node: &Arc<Node>,
    path: &[usize],
    f: impl FnOnce(&mut Node) -> Result<R, EditError>,
) -> Result<(Arc<Node>, R), EditError> {
    let mut copy = Node::clone(node);

    let result = match path.split_first() {
        None => f(&mut copy)?,
        Some((&index, rest)) => {
            let (child, result) = rebuild(&copy.children[index], rest, f)?;
            copy.children[index] = child;
            result
        }
    };

    Ok((Arc::new(copy), result))
}

fn check_index(node: &Node, index: usize, len: usize) -> Result<(), EditError> {
    if index > len {
        return Err(EditError::IndexOutOfBounds {
            parent: node.id.clone(),
            index,
            len,
        });
    }
    Ok(())
}

fn expect_child(node: &Node, index: usize, child_id: &str) -> Result<(), EditError> {
    let found = node.children.get(index).ok_or_else(|| EditError::IndexOutOfBounds {
        parent: node.id.clone(),
        index,
        len: node.children.len(),
    })?;

    if found.id != child_id {
        return Err(EditError::ChildMismatch {
            parent: node.id.clone(),
            index,
            expected: child_id.to_string(),
            found: found.id.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> Arc<Node> {
        Node::element("root", "div")
            .with_children([
                Node::element("a", "span"),
                Node::element("b", "span"),
                Node::style_rule("rule", ".a").with_children([Node::declaration("color", "color", "red")]),
            ])
            .into_shared()
    }

    fn child_ids(node: &Node) -> Vec<&str> {
        node.children.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_set_captures_previous() {
        let root = tree();
        let action = EditAction::set("color", ValueKey::field("value"), Some(json!("blue")));

        let applied = action.apply(&root).unwrap();

        assert_eq!(applied.root.find("color").unwrap().value(&ValueKey::field("value")), Some(json!("blue")));
        assert!(matches!(applied.action, EditAction::Set { previous: Some(ref p), .. } if p == "red"));
        // original snapshot is untouched
        assert_eq!(root.find("color").unwrap().name(), "color");
        assert_eq!(root.find("color").unwrap().value(&ValueKey::field("value")), Some(json!("red")));
    }

    #[test]
    fn test_untouched_subtrees_are_shared() {
        let root = tree();
        let applied = EditAction::set("color", ValueKey::field("value"), Some(json!("blue")))
            .apply(&root)
            .unwrap();

        assert!(Arc::ptr_eq(&root.children[0], &applied.root.children[0]));
        assert!(Arc::ptr_eq(&root.children[1], &applied.root.children[1]));
        assert!(!Arc::ptr_eq(&root.children[2], &applied.root.children[2]));
    }

    #[test]
    fn test_set_new_metadata_key_inverts_to_removal() {
        let root = tree();
        let key = ValueKey::metadata("bounds");
        let applied = EditAction::set("a", key.clone(), Some(json!({ "left": 1 })))
            .apply(&root)
            .unwrap();

        let inverse = applied.action.invert().unwrap();
        assert!(matches!(inverse, EditAction::Set { value: None, .. }));

        let restored = inverse.apply(&applied.root).unwrap().root;
        assert_eq!(restored.find("a").unwrap().value(&key), None);
        assert!(restored.structurally_eq(&root));
    }

    #[test]
    fn test_insert_and_invert() {
        let root = tree();
        let applied = EditAction::insert("root", 1, Node::text("t", "hello"))
            .apply(&root)
            .unwrap();
        assert_eq!(child_ids(&applied.root), vec!["a", "t", "b", "rule"]);

        let undone = applied.action.invert().unwrap().apply(&applied.root).unwrap();
        assert_eq!(child_ids(&undone.root), vec!["a", "b", "rule"]);
    }

    #[test]
    fn test_insert_rejects_duplicates_and_leaves() {
        let root = tree();

        let err = EditAction::insert("root", 0, Node::text("a", "dup")).apply(&root).unwrap_err();
        assert_eq!(err, EditError::DuplicateId("a".to_string()));

        let err = EditAction::insert("color", 0, Node::text("t", "x")).apply(&root).unwrap_err();
        assert_eq!(err, EditError::LeafCannotHaveChildren("color".to_string()));

        let err = EditAction::insert("root", 9, Node::text("t", "x")).apply(&root).unwrap_err();
        assert!(matches!(err, EditError::IndexOutOfBounds { index: 9, len: 3, .. }));
    }

    #[test]
    fn test_remove_validates_child_and_captures_subtree() {
        let root = tree();

        let err = EditAction::remove("root", 0, "b").apply(&root).unwrap_err();
        assert!(matches!(err, EditError::ChildMismatch { .. }));

        let uncaptured = EditAction::remove("root", 2, "rule");
        assert!(matches!(uncaptured.invert(), Err(EditError::NotInvertible(_))));

        let applied = uncaptured.apply(&root).unwrap();
        let inverse = applied.action.invert().unwrap();
        let restored = inverse.apply(&applied.root).unwrap().root;
        assert!(restored.structurally_eq(&root));
        assert!(restored.contains("color"));
    }

    #[test]
    fn test_move_and_invert() {
        let root = tree();
        let action = EditAction::move_child("root", "a", 0, 2);

        let applied = action.apply(&root).unwrap();
        assert_eq!(child_ids(&applied.root), vec!["b", "rule", "a"]);

        let undone = action.invert().unwrap().apply(&applied.root).unwrap();
        assert_eq!(child_ids(&undone.root), vec!["a", "b", "rule"]);
    }

    #[test]
    fn test_move_out_of_bounds_fails() {
        let err = EditAction::move_child("root", "a", 0, 3).apply(&tree()).unwrap_err();
        assert!(matches!(err, EditError::IndexOutOfBounds { index: 3, len: 2, .. }));
    }

    #[test]
    fn test_apply_all_is_atomic() {
        let root = tree();
        let actions = vec![
            EditAction::set("a", ValueKey::attribute("class"), Some(json!("x"))),
            EditAction::remove("root", 5, "nope"),
        ];

        assert!(apply_all(&actions, &root).is_err());
        assert_eq!(root.find("a").unwrap().value(&ValueKey::attribute("class")), None);
    }

    #[test]
    fn test_action_payload_round_trip() {
        let actions = vec![
            EditAction::set("a", ValueKey::metadata("label"), Some(json!("Header"))),
            EditAction::insert("root", 0, Node::text("t", "hi")),
            EditAction::move_child("root", "a", 0, 1),
        ];

        let payload = serialize_actions(&actions).unwrap();
        assert_eq!(payload[0]["kind"], "set");
        assert_eq!(payload[1]["child"]["type"], "text");

        assert_eq!(deserialize_actions(payload).unwrap(), actions);
    }

    #[test]
    fn test_null_metadata_survives_payload_round_trip() {
        let root = tree();
        let key = ValueKey::metadata("hidden");
        let stored_null = EditAction::set("a", key.clone(), Some(Value::Null))
            .apply(&root)
            .unwrap();
        assert_eq!(stored_null.root.find("a").unwrap().value(&key), Some(Value::Null));

        // overwrite the null, so the captured previous value is null as well
        let overwritten = EditAction::set("a", key.clone(), Some(json!(true)))
            .apply(&stored_null.root)
            .unwrap();
        let actions = vec![stored_null.action.clone(), overwritten.action.clone()];

        let payload = serialize_actions(&actions).unwrap();
        assert_eq!(payload[0].get("value"), Some(&Value::Null));
        assert!(payload[0].get("previous").is_none());
        let decoded = deserialize_actions(payload).unwrap();
        assert_eq!(decoded, actions);

        // replaying the decoded batch keeps the key
        let (replayed, _) = apply_all(&decoded[..1], &root).unwrap();
        assert_eq!(replayed.find("a").unwrap().value(&key), Some(Value::Null));

        // undoing the overwrite restores null rather than removing the key
        let undone = decoded[1].invert().unwrap().apply(&overwritten.root).unwrap().root;
        assert_eq!(undone.find("a").unwrap().value(&key), Some(Value::Null));
    }
}
