//! Error types for schema loading and resolution

use dal_tree::TreeError;

/// Schema errors
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// No definition exists for this pair
    #[error("schema not found: {scope} (version {version})")]
    NotFound {
        /// Scope name
        scope: String,
        /// Version tag
        version: String,
    },

    /// Version tag has no registered deserializer
    #[error("unknown schema version: {0}")]
    UnknownVersion(String),

    /// Definition is malformed
    #[error("invalid schema definition for {scope}: {reason}")]
    InvalidDefinition {
        /// Scope name
        scope: String,
        /// What is wrong
        reason: String,
    },

    /// Name not declared in the schema
    #[error("no such attribute '{name}' in schema {scope}")]
    NoSuchAttribute {
        /// Scope name
        scope: String,
        /// Requested attribute
        name: String,
    },

    /// Reading the definition failed
    #[error("schema source I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Definition is not valid JSON
    #[error("schema definition is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Building the schema tree failed
    #[error("schema tree error: {0}")]
    Tree(#[from] TreeError),
}

impl SchemaError {
    /// Create an invalid definition error
    #[inline]
    pub fn invalid(scope: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            scope: scope.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error means "nothing declared here"
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NoSuchAttribute { .. })
    }
}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SchemaError::NotFound {
            scope: "Flow".into(),
            version: "9.9".into(),
        };
        assert_eq!(err.to_string(), "schema not found: Flow (version 9.9)");
        assert!(err.is_not_found());

        let err = SchemaError::invalid("Flow", "missing schema");
        assert_eq!(
            err.to_string(),
            "invalid schema definition for Flow: missing schema"
        );
        assert!(!err.is_not_found());
    }
}
