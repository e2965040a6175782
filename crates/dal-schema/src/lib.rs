//! Schema model
//!
//! Versioned, lazily loaded schema trees describing the shape of every
//! document in a scope.
//!
//! # Overview
//!
//! - **Schema**: tree of [`SchemaEntry`] nodes for one `(scope, version)`
//! - **SchemaVersion**: closed set of definition formats, each with its own deserializer
//! - **SchemaRegistry**: memoizing loader over a [`SchemaSource`]
//!
//! # Example
//!
//! ```rust
//! use dal_schema::{SchemaRegistry, StaticSource};
//! use serde_json::json;
//!
//! let source = StaticSource::new().with_definition(
//!     "Flow",
//!     "1.0",
//!     json!({
//!         "_version": "1.0",
//!         "schema": { "Flow": { "$name": { "Label": "str" } } }
//!     }),
//! );
//! let registry = SchemaRegistry::new(source);
//!
//! let schema = registry.load("Flow", "1.0").unwrap();
//! assert!(schema.resolve("Label").is_ok());
//! assert!(schema.resolve("Missing").is_err());
//! ```

#![warn(missing_docs)]

pub mod entry;
pub mod error;
pub mod registry;
pub mod schema;
pub mod source;
pub mod version;

// Re-exports
pub use entry::{ObjectSchema, PropertySchema, SchemaEntry, StorageKind, ValueType};
pub use error::{SchemaError, SchemaResult};
pub use registry::SchemaRegistry;
pub use schema::{RelationDef, Schema};
pub use source::{DirectorySource, SchemaSource, StaticSource};
pub use version::SchemaVersion;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for schema consumers
    pub use crate::{
        ObjectSchema, PropertySchema, RelationDef, Schema, SchemaEntry, SchemaError,
        SchemaRegistry, SchemaResult, SchemaVersion, StorageKind, ValueType,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
