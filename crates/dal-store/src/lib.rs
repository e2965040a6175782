//! Key-value backing stores
//!
//! The key-value codec talks to storage only through [`KeyValueStore`].
//! A key holds exactly one payload kind: a scalar, a field map, or an
//! ordered sequence. Using a key as the wrong kind is an error, as in Redis.
//!
//! Implementations:
//! - [`MemoryStore`]: radix-trie backed, process local
//! - `SqliteStore` (feature `sqlite`): durable single-file store

#![warn(missing_docs)]

pub mod error;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

// Re-exports
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use store::{KeyValueStore, StoredValue, ValueKind};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
