//! Error types for archive jobs

use dal_persistence::PersistenceError;
use dal_schema::SchemaError;
use dal_scope::DalError;

/// Archive errors
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Archive has no readable `manifest.json`
    #[error("missing or malformed manifest: {0}")]
    Manifest(String),

    /// Zip container could not be read or written
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Document layer failed
    #[error(transparent)]
    Dal(#[from] DalError),

    /// Archive file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Blocking archive task panicked or was cancelled
    #[error("archive task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ArchiveError {
    /// Whether a single document, not the whole job, is at fault
    ///
    /// Jobs log and skip these, like missing documents and workspaces
    /// without an adapter.
    #[must_use]
    pub fn is_document_error(&self) -> bool {
        matches!(
            self,
            Self::Dal(
                DalError::NotFound(_)
                    | DalError::AlreadyExists(_)
                    | DalError::Unsupported(_)
                    | DalError::InvalidShape(_)
                    | DalError::InvalidPath(_)
            )
        ) || matches!(self, Self::Dal(e) if e.is_not_found())
    }
}

impl From<PersistenceError> for ArchiveError {
    fn from(e: PersistenceError) -> Self {
        Self::Dal(e.into())
    }
}

impl From<SchemaError> for ArchiveError {
    fn from(e: SchemaError) -> Self {
        Self::Dal(e.into())
    }
}

/// Result type for archive jobs
pub type ArchiveResult<T> = Result<T, ArchiveError>;
