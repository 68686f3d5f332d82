//! # Tandem Model
//!
//! Structural object model shared by the editor: typed nodes with stable
//! identities, their shallow comparison operations, and the serializer bridge
//! that moves trees across the persistence boundary.

pub mod ast;
pub mod error;
pub mod id_generator;
pub mod serializer;
pub mod shallow;

pub use ast::{Metadata, Node, NodeId, NodeKind, NodeTag};
pub use error::ModelError;
pub use id_generator::{get_document_id, IDGenerator};
pub use serializer::{
    deserialize, deserialize_document, serialize, serialize_document, Deserialized,
    DocumentHeader, NoResolver, PlainValue, ReferenceTable, Registry, Resolution, Resolver,
    SerializeError, FORMAT_VERSION,
};
pub use shallow::ValueKey;
