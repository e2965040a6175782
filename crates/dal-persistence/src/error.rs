//! Error types for persistence adapters

use dal_schema::SchemaError;
use dal_store::StoreError;

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Document or stored version does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Target already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Adapter cannot perform this operation
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Value or key has the wrong shape
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Path string matches no rule and no defaults apply
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Schema resolution failed
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Backing store failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// File storage failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored JSON is malformed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PersistenceError {
    /// Whether the error means "nothing there"
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Schema(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Whether the error is a per-key decode failure that readers may skip
    #[inline]
    #[must_use]
    pub fn is_decode_failure(&self) -> bool {
        match self {
            Self::InvalidShape(_) => true,
            Self::Store(e) => e.is_wrong_kind(),
            _ => false,
        }
    }
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;
