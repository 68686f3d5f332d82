//! # Serializer Bridge
//!
//! Converts nodes to and from self-describing plain values:
//!
//! ```text
//! { "type": "mediaRule", "id": "doc-4", "media": ["screen"],
//!   "metadata": { ... }, "children": [ ... ] }
//! ```
//!
//! Weak references (component instances pointing at a component by id) are
//! recorded while deserializing but not resolved. They resolve lazily, on the
//! first lookup, against the nodes of the same subtree and then the supplied
//! [`Resolver`]. A reference that cannot be resolved yields
//! [`Resolution::Missing`] instead of failing the load.

use crate::ast::{Metadata, Node, NodeId, NodeKind, NodeTag};
use serde::de::{self, Deserializer};
use serde::ser::{self, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::debug;

/// Persistence-ready representation of a node
pub type PlainValue = Value;

/// Version of the on-disk document envelope
pub const FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed node at {path}: expected {expected}")]
    Malformed {
        path: String,
        expected: &'static str,
    },

    #[error("Duplicate node id: {0}")]
    DuplicateId(NodeId),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(u32),
}

/// Serialize a node and its descendants
pub fn serialize(node: &Node) -> Result<PlainValue, SerializeError> {
    let mut object = match serde_json::to_value(&node.kind)? {
        Value::Object(map) => map,
        _ => {
            return Err(SerializeError::Malformed {
                path: node.id.clone(),
                expected: "object",
            })
        }
    };

    object.insert("id".to_string(), Value::String(node.id.clone()));

    if !node.metadata.is_empty() {
        let metadata: Map<String, Value> = node
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        object.insert("metadata".to_string(), Value::Object(metadata));
    }

    if !node.children.is_empty() {
        let children = node
            .children
            .iter()
            .map(|child| serialize(child))
            .collect::<Result<Vec<_>, _>>()?;
        object.insert("children".to_string(), Value::Array(children));
    }

    Ok(Value::Object(object))
}

/// Deserialize a plain value produced by [`serialize`]
pub fn deserialize(value: PlainValue, resolver: Arc<dyn Resolver>) -> Result<Deserialized, SerializeError> {
    let mut state = BuildState::default();
    let root = state.node_from_plain(value, "$")?;

    debug!(
        root_id = %root.id,
        nodes = state.seen.len(),
        references = state.references.len(),
        "Deserialized subtree"
    );

    Ok(Deserialized {
        root,
        references: ReferenceTable {
            references: state
                .references
                .into_iter()
                .map(|(instance_id, component_id)| {
                    (
                        instance_id,
                        LazyReference {
                            component_id,
                            resolved: OnceLock::new(),
                        },
                    )
                })
                .collect(),
            local: state.components,
            resolver,
        },
    })
}

/// Result of deserializing a subtree
#[derive(Debug)]
pub struct Deserialized {
    pub root: Arc<Node>,
    pub references: ReferenceTable,
}

#[derive(Default)]
struct BuildState {
    seen: HashSet<NodeId>,
    references: BTreeMap<NodeId, NodeId>,
    components: HashMap<NodeId, Arc<Node>>,
}

impl BuildState {
    fn node_from_plain(&mut self, value: Value, path: &str) -> Result<Arc<Node>, SerializeError> {
        let Value::Object(mut object) = value else {
            return Err(malformed(path, "object"));
        };

        let id = match object.remove("id") {
            Some(Value::String(id)) => id,
            _ => return Err(malformed(path, "string `id`")),
        };

        let metadata: Metadata = match object.remove("metadata") {
            None | Some(Value::Null) => Metadata::new(),
            Some(Value::Object(map)) => map.into_iter().collect(),
            Some(_) => return Err(malformed(path, "object `metadata`")),
        };

        let children = match object.remove("children") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, child)| self.node_from_plain(child, &format!("{}.children[{}]", path, i)))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(malformed(path, "array `children`")),
        };

        let kind: NodeKind = serde_json::from_value(Value::Object(object))?;

        if !self.seen.insert(id.clone()) {
            return Err(SerializeError::DuplicateId(id));
        }

        if let NodeKind::ComponentInstance { component_id } = &kind {
            self.references.insert(id.clone(), component_id.clone());
        }

        let node = Arc::new(Node {
            id,
            kind,
            metadata,
            children,
        });

        if node.tag() == NodeTag::Component {
            self.components.insert(node.id.clone(), node.clone());
        }

        Ok(node)
    }
}

fn malformed(path: &str, expected: &'static str) -> SerializeError {
    SerializeError::Malformed {
        path: path.to_string(),
        expected,
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize(self)
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let node = BuildState::default()
            .node_from_plain(value, "$")
            .map_err(de::Error::custom)?;
        Ok(Arc::try_unwrap(node).unwrap_or_else(|shared| (*shared).clone()))
    }
}

/// Lookup for weak references, supplied by the dependency graph
pub trait Resolver: Send + Sync {
    fn resolve(&self, id: &str) -> Option<Arc<Node>>;
}

impl<F> Resolver for F
where
    F: Fn(&str) -> Option<Arc<Node>> + Send + Sync,
{
    fn resolve(&self, id: &str) -> Option<Arc<Node>> {
        self(id)
    }
}

/// Resolver that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl Resolver for NoResolver {
    fn resolve(&self, _id: &str) -> Option<Arc<Node>> {
        None
    }
}

/// Index of already-loaded trees
#[derive(Debug, Clone, Default)]
pub struct Registry {
    nodes: HashMap<NodeId, Arc<Node>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `root` and all of its descendants
    pub fn register(&mut self, root: &Arc<Node>) {
        self.nodes.insert(root.id.clone(), root.clone());
        for child in &root.children {
            self.register(child);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Node>> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Resolver for Registry {
    fn resolve(&self, id: &str) -> Option<Arc<Node>> {
        self.nodes.get(id).cloned()
    }
}

/// Outcome of resolving a weak reference
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved(Arc<Node>),
    /// Sentinel for a reference that could not be resolved (e.g. rendered as
    /// a placeholder)
    Missing(NodeId),
}

impl Resolution {
    pub fn node(&self) -> Option<&Arc<Node>> {
        match self {
            Resolution::Resolved(node) => Some(node),
            Resolution::Missing(_) => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Resolution::Missing(_))
    }
}

struct LazyReference {
    component_id: NodeId,
    resolved: OnceLock<Option<Arc<Node>>>,
}

/// Weak references found in a deserialized subtree, resolved on demand
pub struct ReferenceTable {
    references: BTreeMap<NodeId, LazyReference>,
    local: HashMap<NodeId, Arc<Node>>,
    resolver: Arc<dyn Resolver>,
}

impl ReferenceTable {
    /// Resolve the component referenced by `instance_id`.
    ///
    /// Returns `None` when `instance_id` is not a component instance of this
    /// subtree.
    pub fn lookup(&self, instance_id: &str) -> Option<Resolution> {
        let reference = self.references.get(instance_id)?;
        let resolved = reference.resolved.get_or_init(|| {
            let found = self
                .local
                .get(&reference.component_id)
                .cloned()
                .or_else(|| self.resolver.resolve(&reference.component_id))
                .filter(|node| node.tag() == NodeTag::Component);

            if found.is_none() {
                debug!(
                    instance_id = %instance_id,
                    component_id = %reference.component_id,
                    "Unresolved component reference"
                );
            }
            found
        });

        Some(match resolved {
            Some(node) => Resolution::Resolved(node.clone()),
            None => Resolution::Missing(reference.component_id.clone()),
        })
    }

    /// Whether the reference has already been looked up
    pub fn is_resolved(&self, instance_id: &str) -> bool {
        self.references
            .get(instance_id)
            .map(|reference| reference.resolved.get().is_some())
            .unwrap_or(false)
    }

    pub fn instance_ids(&self) -> impl Iterator<Item = &str> {
        self.references.keys().map(String::as_str)
    }

    /// Resolve every reference and return `(instance id, component id)` for
    /// the ones that are missing
    pub fn missing(&self) -> Vec<(NodeId, NodeId)> {
        self.references
            .iter()
            .filter(|(instance_id, _)| {
                self.lookup(instance_id)
                    .map(|resolution| resolution.is_missing())
                    .unwrap_or(false)
            })
            .map(|(instance_id, reference)| (instance_id.clone(), reference.component_id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

impl fmt::Debug for ReferenceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceTable")
            .field(
                "references",
                &self
                    .references
                    .iter()
                    .map(|(k, v)| (k, &v.component_id))
                    .collect::<Vec<_>>(),
            )
            .field("local", &self.local.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Header of a persisted document
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentHeader {
    pub document_id: String,
    pub version: u64,
}

/// Encode a whole document tree as the on-disk representation
pub fn serialize_document(
    document_id: &str,
    version: u64,
    root: &Node,
    pretty: bool,
) -> Result<Vec<u8>, SerializeError> {
    let envelope = json!({
        "format": FORMAT_VERSION,
        "documentId": document_id,
        "version": version,
        "root": serialize(root)?,
    });

    let bytes = if pretty {
        serde_json::to_vec_pretty(&envelope)?
    } else {
        serde_json::to_vec(&envelope)?
    };
    Ok(bytes)
}

/// Decode bytes written by [`serialize_document`]
pub fn deserialize_document(
    bytes: &[u8],
    resolver: Arc<dyn Resolver>,
) -> Result<(DocumentHeader, Deserialized), SerializeError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Envelope {
        format: u32,
        document_id: String,
        version: u64,
        root: Value,
    }

    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if envelope.format != FORMAT_VERSION {
        return Err(SerializeError::UnsupportedFormat(envelope.format));
    }

    let deserialized = deserialize(envelope.root, resolver)?;
    Ok((
        DocumentHeader {
            document_id: envelope.document_id,
            version: envelope.version,
        },
        deserialized,
    ))
}
