//! Backing store protocol

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::fmt;

/// Payload kind held by a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Single byte string
    Scalar,
    /// Field to byte string map
    Map,
    /// Ordered byte strings
    Sequence,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scalar => "scalar",
            Self::Map => "map",
            Self::Sequence => "sequence",
        })
    }
}

/// Payload stored under one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    /// Single value
    Scalar(Vec<u8>),
    /// Field map
    Map(IndexMap<String, Vec<u8>>),
    /// Ordered values
    Sequence(Vec<Vec<u8>>),
}

impl StoredValue {
    /// Kind of this payload
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Scalar(_) => ValueKind::Scalar,
            Self::Map(_) => ValueKind::Map,
            Self::Sequence(_) => ValueKind::Sequence,
        }
    }

    /// Error for using this payload as `expected`
    pub(crate) fn mismatch(&self, key: &str, expected: ValueKind) -> StoreError {
        StoreError::WrongKind {
            key: key.to_string(),
            expected,
            found: self.kind(),
        }
    }
}

/// Flat key space with three payload kinds
///
/// Keys are opaque strings. Atomicity is per key only.
#[async_trait]
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Every key starting with `prefix`, sorted
    async fn scan(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Kind stored at `key`, `None` if absent
    async fn kind(&self, key: &str) -> StoreResult<Option<ValueKind>>;

    /// Scalar at `key`
    ///
    /// # Errors
    /// [`StoreError::WrongKind`] if `key` holds a map or sequence.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store a scalar, replacing whatever `key` held
    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Remove keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> StoreResult<usize>;

    /// Map at `key`, empty if absent
    ///
    /// # Errors
    /// [`StoreError::WrongKind`] if `key` holds a scalar or sequence.
    async fn get_map(&self, key: &str) -> StoreResult<IndexMap<String, Vec<u8>>>;

    /// Set one map field, creating the map if needed
    async fn set_map_field(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Sequence at `key`, empty if absent
    ///
    /// # Errors
    /// [`StoreError::WrongKind`] if `key` holds a scalar or map.
    async fn get_sequence(&self, key: &str) -> StoreResult<Vec<Vec<u8>>>;

    /// Append to a sequence, creating it if needed
    async fn append_sequence(&self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Whether `key` holds anything
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.kind(key).await?.is_some())
    }
}
