//! Error types for backing stores

use crate::store::ValueKind;

/// Backing store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Key holds a different payload kind
    #[error("key '{key}' holds a {found} payload, expected {expected}")]
    WrongKind {
        /// Offending key
        key: String,
        /// Kind the operation needs
        expected: ValueKind,
        /// Kind actually stored
        found: ValueKind,
    },

    /// Underlying SQLite failure
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this is a per-key payload kind mismatch
    #[inline]
    #[must_use]
    pub fn is_wrong_kind(&self) -> bool {
        matches!(self, Self::WrongKind { .. })
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
