//! Error types for tree operations

use crate::tree::NodeId;

/// Tree operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// Handle does not point to a live node
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Child already owned by another node
    #[error("node {child} already has a parent, detach it first")]
    AlreadyAttached {
        /// The node being attached
        child: NodeId,
    },

    /// Detach target is not owned by the given parent
    #[error("node {child} is not a child of {parent}")]
    NotAChild {
        /// Expected parent
        parent: NodeId,
        /// Node being detached
        child: NodeId,
    },

    /// Name-keyed parent already holds a child with this name
    #[error("child name '{name}' already taken")]
    NameTaken {
        /// Conflicting name
        name: String,
    },

    /// Leaf nodes cannot own children
    #[error("node {0} cannot own children")]
    NotAContainer(NodeId),

    /// Attach would make a node its own ancestor
    #[error("attaching {child} under {parent} would create a cycle")]
    Cycle {
        /// Intended parent
        parent: NodeId,
        /// Node being attached
        child: NodeId,
    },
}

/// Result type for tree operations
pub type TreeResult<T> = Result<T, TreeError>;
