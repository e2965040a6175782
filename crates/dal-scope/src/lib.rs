//! Document layer
//!
//! Schema-bound document trees, materialized lazily and organized as
//! `workspace → scope → reference → version`.
//!
//! # Overview
//!
//! - **Workspaces**: binds workspace names to adapters, resolves path strings
//! - **Workspace**: document cache plus attribute access and persistence calls
//! - **ScopeHandle**: `get` / `create` of documents in one scope
//! - **DalConfig**: directories, global store, archive settings
//!
//! # Example
//!
//! ```rust,ignore
//! use dal_scope::{DalConfig, Workspaces};
//! use serde_json::json;
//!
//! # async fn example() -> dal_scope::DalResult<()> {
//! let mut workspaces = Workspaces::from_config(DalConfig::new())?;
//! let global = workspaces.workspace("global")?;
//!
//! let doc = global.scope("Flow").create("f1", "__UNVERSIONED__", false).await?;
//! global.set_attr(doc, "Label", json!("pick and place"))?;
//! global.write(doc).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod node;
pub mod workspace;
pub mod workspaces;

// Re-exports
pub use config::{DalConfig, StoreConfig, CONFIG_ENV};
pub use error::{DalError, DalResult};
pub use node::{Attribute, DocNode};
pub use workspace::{ScopeHandle, Workspace};
pub use workspaces::Workspaces;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for document consumers
    pub use crate::{
        Attribute, DalConfig, DalError, DalResult, DocNode, ScopeHandle, Workspace, Workspaces,
    };
    pub use dal_persistence::{DocumentRef, PathDefaults, RelationQuery, UNVERSIONED};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
