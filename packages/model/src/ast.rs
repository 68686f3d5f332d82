use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Stable node identity (assigned at creation, never recomputed on edit)
pub type NodeId = String;

/// Free-form node metadata (bounds, style mixins, labels, ...)
pub type Metadata = BTreeMap<String, Value>;

/// Discriminator used for type dispatch and similarity scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeTag {
    Declaration,
    StyleRule,
    AtRule,
    MediaRule,
    Element,
    Text,
    Slot,
    Content,
    Component,
    ComponentInstance,
}

impl NodeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeTag::Declaration => "declaration",
            NodeTag::StyleRule => "styleRule",
            NodeTag::AtRule => "atRule",
            NodeTag::MediaRule => "mediaRule",
            NodeTag::Element => "element",
            NodeTag::Text => "text",
            NodeTag::Slot => "slot",
            NodeTag::Content => "content",
            NodeTag::Component => "component",
            NodeTag::ComponentInstance => "componentInstance",
        }
    }
}

impl fmt::Display for NodeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant-specific scalar fields of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeKind {
    /// CSS declaration (`color: red`)
    Declaration { name: String, value: String },

    /// Style rule; children are its declarations
    StyleRule { selector: String },

    /// Generic at-rule container (`@keyframes fade`)
    AtRule {
        name: String,
        #[serde(default)]
        params: String,
    },

    /// `@media` rule; children are the nested rules
    MediaRule { media: Vec<String> },

    /// Visible element (div, button, ...)
    Element {
        #[serde(rename = "tagName")]
        tag_name: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attributes: BTreeMap<String, String>,
    },

    /// Text node
    Text { value: String },

    /// Slot declared by a component
    Slot { name: String },

    /// Content plugged into a named slot of an instance
    Content {
        #[serde(rename = "slotName")]
        slot_name: String,
    },

    /// Component definition
    Component { name: String },

    /// Instance of a component. The component is referenced by id only.
    ComponentInstance {
        #[serde(rename = "componentId")]
        component_id: NodeId,
    },
}

impl NodeKind {
    pub fn tag(&self) -> NodeTag {
        match self {
            NodeKind::Declaration { .. } => NodeTag::Declaration,
            NodeKind::StyleRule { .. } => NodeTag::StyleRule,
            NodeKind::AtRule { .. } => NodeTag::AtRule,
            NodeKind::MediaRule { .. } => NodeTag::MediaRule,
            NodeKind::Element { .. } => NodeTag::Element,
            NodeKind::Text { .. } => NodeTag::Text,
            NodeKind::Slot { .. } => NodeTag::Slot,
            NodeKind::Content { .. } => NodeTag::Content,
            NodeKind::Component { .. } => NodeTag::Component,
            NodeKind::ComponentInstance { .. } => NodeTag::ComponentInstance,
        }
    }
}

/// Structural tree node
///
/// Children are reference counted so that edits can produce a new root while
/// sharing every subtree they did not touch.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub metadata: Metadata,
    pub children: Vec<Arc<Node>>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            metadata: Metadata::new(),
            children: Vec::new(),
        }
    }

    pub fn declaration(id: impl Into<NodeId>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Declaration {
                name: name.into(),
                value: value.into(),
            },
        )
    }

    pub fn style_rule(id: impl Into<NodeId>, selector: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::StyleRule {
                selector: selector.into(),
            },
        )
    }

    pub fn at_rule(id: impl Into<NodeId>, name: impl Into<String>, params: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::AtRule {
                name: name.into(),
                params: params.into(),
            },
        )
    }

    pub fn media_rule<S: Into<String>>(id: impl Into<NodeId>, media: impl IntoIterator<Item = S>) -> Self {
        Self::new(
            id,
            NodeKind::MediaRule {
                media: media.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn element(id: impl Into<NodeId>, tag_name: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Element {
                tag_name: tag_name.into(),
                attributes: BTreeMap::new(),
            },
        )
    }

    pub fn text(id: impl Into<NodeId>, value: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Text { value: value.into() })
    }

    pub fn slot(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Slot { name: name.into() })
    }

    pub fn content(id: impl Into<NodeId>, slot_name: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Content {
                slot_name: slot_name.into(),
            },
        )
    }

    pub fn component(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Component { name: name.into() })
    }

    pub fn instance(id: impl Into<NodeId>, component_id: impl Into<NodeId>) -> Self {
        Self::new(
            id,
            NodeKind::ComponentInstance {
                component_id: component_id.into(),
            },
        )
    }

    /// Append children (builder style)
    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children.into_iter().map(Arc::new));
        self
    }

    /// Set a metadata entry (builder style)
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Set an element attribute (builder style). Ignored for non-elements.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let NodeKind::Element { attributes, .. } = &mut self.kind {
            attributes.insert(name.into(), value.into());
        }
        self
    }

    pub fn into_shared(self) -> Arc<Node> {
        Arc::new(self)
    }

    pub fn tag(&self) -> NodeTag {
        self.kind.tag()
    }

    /// Display name, also used when scoring similarity
    pub fn name(&self) -> String {
        match &self.kind {
            NodeKind::Declaration { name, .. } => name.clone(),
            NodeKind::StyleRule { selector } => selector.clone(),
            NodeKind::AtRule { name, params } if params.is_empty() => format!("@{}", name),
            NodeKind::AtRule { name, params } => format!("@{} {}", name, params),
            NodeKind::MediaRule { media } => media.join(" "),
            NodeKind::Element { tag_name, .. } => tag_name.clone(),
            NodeKind::Text { value } => value.clone(),
            NodeKind::Slot { name } => name.clone(),
            NodeKind::Content { slot_name } => slot_name.clone(),
            NodeKind::Component { name } => name.clone(),
            NodeKind::ComponentInstance { component_id } => component_id.clone(),
        }
    }

    /// Leaves never own children
    pub fn accepts_children(&self) -> bool {
        !matches!(
            self.kind,
            NodeKind::Declaration { .. } | NodeKind::Text { .. }
        )
    }

    /// Weak reference carried by this node, if any
    pub fn reference(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::ComponentInstance { component_id } => Some(component_id),
            _ => None,
        }
    }

    /// Find a node by identity (pre-order)
    pub fn find(&self, id: &str) -> Option<&Node> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Find a node by identity, returning its shared handle
    pub fn find_shared(self: &Arc<Self>, id: &str) -> Option<Arc<Node>> {
        if self.id == id {
            return Some(self.clone());
        }
        self.children.iter().find_map(|child| child.find_shared(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// Child-index path from this node to `id`
    pub fn path_to(&self, id: &str) -> Option<Vec<usize>> {
        if self.id == id {
            return Some(Vec::new());
        }
        for (index, child) in self.children.iter().enumerate() {
            if let Some(mut path) = child.path_to(id) {
                path.insert(0, index);
                return Some(path);
            }
        }
        None
    }

    /// Id of the node that owns `id` as a direct child
    pub fn parent_of(&self, id: &str) -> Option<&Node> {
        if self.children.iter().any(|child| child.id == id) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.parent_of(id))
    }

    /// Ids of this node and all of its descendants, pre-order
    pub fn descendant_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut Vec<NodeId>) {
        ids.push(self.id.clone());
        for child in &self.children {
            child.collect_ids(ids);
        }
    }

    /// Same scalar fields and metadata, ignoring identity and children
    pub fn shallow_eq(&self, other: &Node) -> bool {
        self.kind == other.kind && self.metadata == other.metadata
    }

    /// Deep value equality that ignores identities
    pub fn structurally_eq(&self, other: &Node) -> bool {
        self.shallow_eq(other)
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.structurally_eq(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Node {
        Node::style_rule("rule", ".a").with_children([
            Node::declaration("d1", "color", "red"),
            Node::declaration("d2", "display", "block"),
        ])
    }

    #[test]
    fn test_find_and_path() {
        let rule = sample();

        assert_eq!(rule.find("d2").map(|n| n.name()), Some("display".to_string()));
        assert_eq!(rule.path_to("d2"), Some(vec![1]));
        assert_eq!(rule.path_to("missing"), None);
        assert_eq!(rule.parent_of("d1").map(|n| n.id.as_str()), Some("rule"));
        assert_eq!(rule.descendant_ids(), vec!["rule", "d1", "d2"]);
    }

    #[test]
    fn test_structural_equality_ignores_ids() {
        let a = sample();
        let b = Node::style_rule("other", ".a").with_children([
            Node::declaration("x", "color", "red"),
            Node::declaration("y", "display", "block"),
        ]);

        assert_ne!(a, b);
        assert!(a.structurally_eq(&b));

        let c = b.clone().with_metadata("bounds", json!({ "left": 10 }));
        assert!(!a.structurally_eq(&c));
    }

    #[test]
    fn test_leaves_reject_children() {
        assert!(!Node::declaration("d", "color", "red").accepts_children());
        assert!(!Node::text("t", "hi").accepts_children());
        assert!(Node::media_rule("m", ["screen"]).accepts_children());
    }

    #[test]
    fn test_media_rule_name_joins_conditions() {
        let media = Node::media_rule("m", ["screen", "and (max-width: 400px)"]);
        assert_eq!(media.name(), "screen and (max-width: 400px)");
        assert_eq!(media.tag(), NodeTag::MediaRule);
    }

    #[test]
    fn test_instance_reference() {
        let instance = Node::instance("i1", "button");
        assert_eq!(instance.reference(), Some("button"));
        assert_eq!(Node::component("button", "Button").reference(), None);
    }
}
