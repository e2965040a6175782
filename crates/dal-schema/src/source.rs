//! Schema definition sources
//!
//! A source returns the raw JSON definition for `(scope, version)`, or
//! `None` when no such definition exists.

use crate::error::SchemaResult;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Raw definition provider
pub trait SchemaSource: Send + Sync + Debug {
    /// Fetch the raw definition
    ///
    /// # Errors
    /// Read or parse failures other than "missing".
    fn fetch(&self, scope: &str, version: &str) -> SchemaResult<Option<Value>>;

    /// Human-readable location, used in logs
    fn locate(&self, scope: &str, version: &str) -> String;
}

/// Definitions laid out as `<base>/<version>/<scope>.json`
#[derive(Debug, Clone)]
pub struct DirectorySource {
    base: PathBuf,
}

impl DirectorySource {
    /// Source rooted at `base`
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Base directory
    #[inline]
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn file(&self, scope: &str, version: &str) -> PathBuf {
        self.base.join(version).join(format!("{scope}.json"))
    }
}

impl SchemaSource for DirectorySource {
    fn fetch(&self, scope: &str, version: &str) -> SchemaResult<Option<Value>> {
        let text = match std::fs::read_to_string(self.file(scope, version)) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn locate(&self, scope: &str, version: &str) -> String {
        self.file(scope, version).display().to_string()
    }
}

/// In-memory definitions, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    definitions: HashMap<(String, String), Value>,
}

impl StaticSource {
    /// Empty source
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition
    #[must_use]
    pub fn with_definition(
        mut self,
        scope: impl Into<String>,
        version: impl Into<String>,
        definition: Value,
    ) -> Self {
        self.insert(scope, version, definition);
        self
    }

    /// Add or replace a definition
    pub fn insert(
        &mut self,
        scope: impl Into<String>,
        version: impl Into<String>,
        definition: Value,
    ) {
        self.definitions
            .insert((scope.into(), version.into()), definition);
    }
}

impl SchemaSource for StaticSource {
    fn fetch(&self, scope: &str, version: &str) -> SchemaResult<Option<Value>> {
        Ok(self
            .definitions
            .get(&(scope.to_string(), version.to_string()))
            .cloned())
    }

    fn locate(&self, scope: &str, version: &str) -> String {
        format!("static:{version}/{scope}")
    }
}
