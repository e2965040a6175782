//! Error types for the document layer

use dal_persistence::PersistenceError;
use dal_schema::SchemaError;
use dal_tree::TreeError;

/// Document layer errors
///
/// Adapter and schema errors with a direct counterpart here are folded into
/// that variant, so callers match one taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum DalError {
    /// Schema does not declare the attribute
    #[error("no such attribute: {0}")]
    NoSuchAttribute(String),

    /// Document, version or workspace does not exist
    #[error("does not exist: {0}")]
    NotFound(String),

    /// Target already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Operation not available for this workspace or document
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Value does not fit the node it is assigned to
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Path string could not be resolved
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// Tree invariant violated
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// Schema resolution failed
    #[error("schema error: {0}")]
    Schema(SchemaError),

    /// Adapter failed
    #[error("persistence error: {0}")]
    Persistence(PersistenceError),

    /// Filesystem failure outside an adapter
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DalError {
    /// Whether the error means "nothing there"
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Schema(e) => e.is_not_found(),
            Self::Persistence(e) => e.is_not_found(),
            _ => false,
        }
    }
}

impl From<SchemaError> for DalError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::NoSuchAttribute { name, .. } => Self::NoSuchAttribute(name),
            other => Self::Schema(other),
        }
    }
}

impl From<PersistenceError> for DalError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::NotFound(what) => Self::NotFound(what),
            PersistenceError::AlreadyExists(what) => Self::AlreadyExists(what),
            PersistenceError::Unsupported(what) => Self::Unsupported(what),
            PersistenceError::InvalidShape(what) => Self::InvalidShape(what),
            PersistenceError::InvalidPath(what) => Self::InvalidPath(what),
            PersistenceError::Schema(inner) => inner.into(),
            other => Self::Persistence(other),
        }
    }
}

/// Result type for document layer operations
pub type DalResult<T> = Result<T, DalError>;
