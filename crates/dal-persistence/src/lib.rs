//! Persistence adapters
//!
//! Storage backends for schema-bound documents, addressed by
//! [`DocumentRef`] (`workspace/scope/ref/version`).
//!
//! # Overview
//!
//! - **KvPersistence**: one key per leaf over a [`dal_store::KeyValueStore`],
//!   differential writes, relation cache in a side key
//! - **FilePersistence**: one folder per stored version, relation list next to the data
//! - **collect_relations**: bounded, cycle-safe transitive relation walk
//!
//! # Example
//!
//! ```rust,ignore
//! use dal_persistence::{DocumentRef, KvPersistence, Persistence};
//!
//! # async fn example(kv: KvPersistence, schema: &dal_schema::Schema) -> dal_persistence::PersistenceResult<()> {
//! let doc = DocumentRef::parse("Flow:f1")?;
//! let body = serde_json::json!({"Links": {"abc": {"From": "n1/p1/out"}}});
//! kv.write(&doc, schema, &body).await?;
//!
//! let raw = kv.read(&doc).await?.expect("just written");
//! assert_eq!(raw["Flow"]["f1"], body);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod adapter;
pub mod error;
pub mod filesystem;
pub mod kv;
pub mod reference;
pub mod relations;

// Re-exports
pub use adapter::{
    raw_schema_version, unwrap_document, wrap_document, Persistence, RelationSource, ScopeEntry,
    VersionEntry,
};
pub use error::{PersistenceError, PersistenceResult};
pub use filesystem::FilePersistence;
pub use kv::KvPersistence;
pub use reference::{
    is_plain_segment, DocumentRef, PathDefaults, DEFAULT_SCHEMA_VERSION, GLOBAL_WORKSPACE,
    UNVERSIONED,
};
pub use relations::{collect_relations, relations_from_body, RelationQuery};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for adapter consumers
    pub use crate::{
        DocumentRef, FilePersistence, KvPersistence, PathDefaults, Persistence,
        PersistenceError, PersistenceResult, RelationQuery, RelationSource,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
