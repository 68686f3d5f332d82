//! Shallow (children-excluded) operations on nodes.
//!
//! These are the dispatch tables the diff engine relies on: which values a
//! node carries, how to overwrite one of them, how to clone a node without
//! its descendants and how far apart two nodes are.

use crate::ast::{Node, NodeKind, NodeTag};
use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Address of one non-child value of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", content = "name", rename_all = "camelCase")]
pub enum ValueKey {
    /// Variant field (`selector`, `value`, `media`, ...)
    Field(String),
    /// Element attribute
    Attribute(String),
    /// Metadata entry
    Metadata(String),
}

impl ValueKey {
    pub fn field(name: impl Into<String>) -> Self {
        ValueKey::Field(name.into())
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        ValueKey::Attribute(name.into())
    }

    pub fn metadata(name: impl Into<String>) -> Self {
        ValueKey::Metadata(name.into())
    }
}

impl fmt::Display for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKey::Field(name) => write!(f, "{}", name),
            ValueKey::Attribute(name) => write!(f, "attributes.{}", name),
            ValueKey::Metadata(name) => write!(f, "metadata.{}", name),
        }
    }
}

impl NodeKind {
    /// Named variant fields, in declaration order
    pub fn fields(&self) -> Vec<(&'static str, Value)> {
        match self {
            NodeKind::Declaration { name, value } => vec![
                ("name", Value::from(name.as_str())),
                ("value", Value::from(value.as_str())),
            ],
            NodeKind::StyleRule { selector } => vec![("selector", Value::from(selector.as_str()))],
            NodeKind::AtRule { name, params } => vec![
                ("name", Value::from(name.as_str())),
                ("params", Value::from(params.as_str())),
            ],
            NodeKind::MediaRule { media } => vec![(
                "media",
                Value::Array(media.iter().map(|m| Value::from(m.as_str())).collect()),
            )],
            NodeKind::Element { tag_name, .. } => vec![("tagName", Value::from(tag_name.as_str()))],
            NodeKind::Text { value } => vec![("value", Value::from(value.as_str()))],
            NodeKind::Slot { name } => vec![("name", Value::from(name.as_str()))],
            NodeKind::Content { slot_name } => vec![("slotName", Value::from(slot_name.as_str()))],
            NodeKind::Component { name } => vec![("name", Value::from(name.as_str()))],
            NodeKind::ComponentInstance { component_id } => {
                vec![("componentId", Value::from(component_id.as_str()))]
            }
        }
    }

    /// Fields whose change makes two nodes incomparable for pairing purposes
    pub fn is_defining_field(&self, field: &str) -> bool {
        matches!(
            (self, field),
            (NodeKind::Declaration { .. }, "name")
                | (NodeKind::AtRule { .. }, "name")
                | (NodeKind::MediaRule { .. }, "media")
                | (NodeKind::Element { .. }, "tagName")
                | (NodeKind::ComponentInstance { .. }, "componentId")
        )
    }

    pub fn set_field(&mut self, field: &str, value: Value) -> Result<(), ModelError> {
        let tag = self.tag();
        match (self, field) {
            (NodeKind::Declaration { name, .. }, "name")
            | (NodeKind::AtRule { name, .. }, "name")
            | (NodeKind::Slot { name }, "name")
            | (NodeKind::Component { name }, "name") => *name = expect_string(field, value)?,
            (NodeKind::Declaration { value: target, .. }, "value")
            | (NodeKind::Text { value: target }, "value") => *target = expect_string(field, value)?,
            (NodeKind::StyleRule { selector }, "selector") => *selector = expect_string(field, value)?,
            (NodeKind::AtRule { params, .. }, "params") => *params = expect_string(field, value)?,
            (NodeKind::MediaRule { media }, "media") => *media = expect_string_list(field, value)?,
            (NodeKind::Element { tag_name, .. }, "tagName") => *tag_name = expect_string(field, value)?,
            (NodeKind::Content { slot_name }, "slotName") => *slot_name = expect_string(field, value)?,
            (NodeKind::ComponentInstance { component_id }, "componentId") => {
                *component_id = expect_string(field, value)?
            }
            _ => {
                return Err(ModelError::UnknownField {
                    tag,
                    field: field.to_string(),
                })
            }
        }
        Ok(())
    }
}

fn expect_string(field: &str, value: Value) -> Result<String, ModelError> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(ModelError::InvalidValue {
            field: field.to_string(),
            expected: "string",
        }),
    }
}

fn expect_string_list(field: &str, value: Value) -> Result<Vec<String>, ModelError> {
    let invalid = || ModelError::InvalidValue {
        field: field.to_string(),
        expected: "array of strings",
    };

    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(invalid()),
            })
            .collect(),
        _ => Err(invalid()),
    }
}

impl Node {
    /// All non-child values of this node, keyed by address
    pub fn values(&self) -> BTreeMap<ValueKey, Value> {
        let mut values: BTreeMap<ValueKey, Value> = self
            .kind
            .fields()
            .into_iter()
            .map(|(name, value)| (ValueKey::field(name), value))
            .collect();

        if let NodeKind::Element { attributes, .. } = &self.kind {
            for (name, value) in attributes {
                values.insert(ValueKey::attribute(name.as_str()), Value::from(value.as_str()));
            }
        }

        for (key, value) in &self.metadata {
            values.insert(ValueKey::metadata(key.as_str()), value.clone());
        }

        values
    }

    pub fn value(&self, key: &ValueKey) -> Option<Value> {
        match key {
            ValueKey::Field(name) => self
                .kind
                .fields()
                .into_iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value),
            ValueKey::Attribute(name) => match &self.kind {
                NodeKind::Element { attributes, .. } => {
                    attributes.get(name).map(|v| Value::from(v.as_str()))
                }
                _ => None,
            },
            ValueKey::Metadata(name) => self.metadata.get(name).cloned(),
        }
    }

    /// Overwrite one value. `None` removes an attribute or metadata entry.
    pub fn set_value(&mut self, key: &ValueKey, value: Option<Value>) -> Result<(), ModelError> {
        match key {
            ValueKey::Field(name) => match value {
                Some(value) => self.kind.set_field(name, value),
                None => Err(ModelError::FieldNotRemovable(name.clone())),
            },
            ValueKey::Attribute(name) => {
                let tag = self.tag();
                let NodeKind::Element { attributes, .. } = &mut self.kind else {
                    return Err(ModelError::UnknownField {
                        tag,
                        field: key.to_string(),
                    });
                };
                match value {
                    Some(value) => {
                        attributes.insert(name.clone(), expect_string(name, value)?);
                    }
                    None => {
                        attributes.remove(name);
                    }
                }
                Ok(())
            }
            ValueKey::Metadata(name) => {
                match value {
                    Some(value) => {
                        self.metadata.insert(name.clone(), value);
                    }
                    None => {
                        self.metadata.remove(name);
                    }
                }
                Ok(())
            }
        }
    }

    /// Copy of this node with scalar fields and metadata but no descendants.
    ///
    /// Only meant as a comparison candidate, never as a live tree member.
    pub fn clone_shallow(&self) -> Node {
        Node {
            id: self.id.clone(),
            kind: self.kind.clone(),
            metadata: self.metadata.clone(),
            children: Vec::new(),
        }
    }

    /// Similarity cost between two nodes, ignoring children.
    ///
    /// Returns `-1` when the nodes cannot be paired (different kind, or a
    /// defining field such as a declaration name or media list differs),
    /// otherwise the number of values that differ.
    pub fn count_shallow_diffs(&self, other: &Node) -> i32 {
        if self.tag() != other.tag() {
            return -1;
        }

        let ours = self.values();
        let theirs = other.values();

        for (key, value) in &ours {
            if let ValueKey::Field(name) = key {
                if self.kind.is_defining_field(name) && theirs.get(key) != Some(value) {
                    return -1;
                }
            }
        }

        let mut count = 0;
        for (key, value) in &ours {
            if theirs.get(key) != Some(value) {
                count += 1;
            }
        }
        for key in theirs.keys() {
            if !ours.contains_key(key) {
                count += 1;
            }
        }
        count
    }

    /// Whether two nodes of this kind may be paired by the differ
    pub fn is_comparable(&self, other: &Node) -> bool {
        self.count_shallow_diffs(other) >= 0
    }
}

impl NodeTag {
    /// Leaf kinds never own children
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeTag::Declaration | NodeTag::Text)
    }
}
