//! Memoizing schema registry
//!
//! Constructed once and shared by `Arc` with every component that resolves
//! schemas. Each `(scope, version)` is deserialized at most once.

use crate::error::{SchemaError, SchemaResult};
use crate::schema::Schema;
use crate::source::SchemaSource;
use crate::version::SchemaVersion;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of loaded schemas
#[derive(Debug)]
pub struct SchemaRegistry {
    source: Box<dyn SchemaSource>,
    loaded: RwLock<HashMap<(String, String), Arc<Schema>>>,
}

impl SchemaRegistry {
    /// Registry over a definition source
    #[must_use]
    pub fn new(source: impl SchemaSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// Load a schema, reusing the cached tree when present
    ///
    /// # Errors
    /// - [`SchemaError::NotFound`] if the source has no definition
    /// - [`SchemaError::UnknownVersion`] if no deserializer handles `version`
    /// - [`SchemaError::InvalidDefinition`] if the definition is malformed
    pub fn load(&self, scope: &str, version: &str) -> SchemaResult<Arc<Schema>> {
        let key = (scope.to_string(), version.to_string());
        if let Some(schema) = self.loaded.read().get(&key) {
            return Ok(Arc::clone(schema));
        }

        let raw = self
            .source
            .fetch(scope, version)?
            .ok_or_else(|| SchemaError::NotFound {
                scope: scope.to_string(),
                version: version.to_string(),
            })?;

        let schema = Arc::new(version.parse::<SchemaVersion>()?.deserialize(scope, &raw)?);
        tracing::debug!(
            scope,
            version,
            location = %self.source.locate(scope, version),
            "schema loaded"
        );

        let mut loaded = self.loaded.write();
        let entry = loaded.entry(key).or_insert(schema);
        Ok(Arc::clone(entry))
    }

    /// Whether a schema is already resident
    #[must_use]
    pub fn is_loaded(&self, scope: &str, version: &str) -> bool {
        self.loaded
            .read()
            .contains_key(&(scope.to_string(), version.to_string()))
    }

    /// Resident `(scope, version)` pairs
    #[must_use]
    pub fn loaded(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.loaded.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        let source = StaticSource::new()
            .with_definition(
                "Flow",
                "1.0",
                json!({ "_version": "1.0", "schema": { "Flow": { "$name": { "Label": "str" } } } }),
            )
            .with_definition(
                "Flow",
                "2.0",
                json!({ "_version": "2.0", "attributes": { "Title": { "type": "str" } } }),
            )
            .with_definition("Flow", "7.0", json!({ "_version": "7.0" }));
        SchemaRegistry::new(source)
    }

    #[test]
    fn registry_memoizes_loads() {
        let registry = registry();
        let first = registry.load("Flow", "1.0").unwrap();
        let second = registry.load("Flow", "1.0").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.is_loaded("Flow", "1.0"));
    }

    #[test]
    fn registry_keeps_versions_side_by_side() {
        let registry = registry();
        let v1 = registry.load("Flow", "1.0").unwrap();
        let v2 = registry.load("Flow", "2.0").unwrap();
        assert!(v1.resolve("Label").is_ok());
        assert!(v2.resolve("Title").is_ok());
        assert!(v2.resolve("Label").is_err());
        assert_eq!(registry.loaded().len(), 2);
    }

    #[test]
    fn registry_missing_and_unknown() {
        let registry = registry();
        assert!(matches!(
            registry.load("Node", "1.0").unwrap_err(),
            SchemaError::NotFound { .. }
        ));
        assert!(matches!(
            registry.load("Flow", "7.0").unwrap_err(),
            SchemaError::UnknownVersion(_)
        ));
        assert!(!registry.is_loaded("Node", "1.0"));
    }
}
