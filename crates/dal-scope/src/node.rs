//! Document tree node payloads

use dal_schema::Schema;
use dal_tree::{NodeId, NodeKind};
use serde_json::Value;
use std::sync::Arc;

/// Payload of a document tree node
///
/// Schema handles point into the schema tree of the enclosing version.
#[derive(Debug, Clone)]
pub enum DocNode {
    /// Root of one workspace
    Workspace,
    /// Documents sharing one schema identity
    Scope,
    /// One logical document
    Instance,
    /// Materialized version of a document, bound to its schema
    Version {
        /// Version tag
        tag: String,
        /// Resolved schema
        schema: Arc<Schema>,
    },
    /// Object attribute
    Object {
        /// Describing schema node
        schema_node: NodeId,
    },
    /// Hash attribute; children are entries keyed by name
    Collection {
        /// Describing schema node, shared by every entry
        schema_node: NodeId,
    },
    /// Leaf attribute
    Property {
        /// Describing schema node
        schema_node: NodeId,
        /// Current value
        value: Value,
    },
}

impl NodeKind for DocNode {
    fn node_type(&self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Scope => "scope",
            Self::Instance => "instance",
            Self::Version { .. } => "version",
            Self::Object { .. } => "object",
            Self::Collection { .. } => "collection",
            Self::Property { .. } => "property",
        }
    }
}

/// Materialized attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Leaf holding a value
    Property(NodeId),
    /// Object with named children
    Object(NodeId),
    /// Name-keyed entries of one shape
    Collection(NodeId),
}

impl Attribute {
    /// Node behind the attribute
    #[inline]
    #[must_use]
    pub fn id(self) -> NodeId {
        match self {
            Self::Property(id) | Self::Object(id) | Self::Collection(id) => id,
        }
    }
}
