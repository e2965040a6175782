//! Ownership tree
//!
//! Arena-backed tree used by both the schema model and the document model.
//!
//! # Overview
//!
//! - **Tree**: owns every node; nodes refer to each other through [`NodeId`] handles
//! - **NodeId**: generational handle, stale after the node is removed
//! - **Layout**: whether a node is a leaf, keeps ordered children, or name-keyed children
//!
//! A node has at most one parent. Re-parenting is an explicit
//! [`Tree::detach`] followed by [`Tree::attach`].
//!
//! # Example
//!
//! ```rust
//! use dal_tree::{Layout, NodeKind, Tree};
//!
//! #[derive(Debug)]
//! struct Entry;
//!
//! impl NodeKind for Entry {
//!     fn node_type(&self) -> &'static str {
//!         "entry"
//!     }
//! }
//!
//! let mut tree = Tree::new();
//! let root = tree.insert("root", Entry, Layout::Map);
//! let leaf = tree.insert("leaf", Entry, Layout::Leaf);
//! tree.attach(root, leaf).unwrap();
//!
//! assert_eq!(tree.path(leaf, "/"), "root/leaf");
//! assert_eq!(tree.depth(leaf), 1);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod tree;

// Re-exports
pub use error::{TreeError, TreeResult};
pub use tree::{Layout, NodeId, NodeKind, Tree};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
