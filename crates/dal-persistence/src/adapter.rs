//! Persistence adapter protocol

use crate::error::PersistenceResult;
use crate::reference::DocumentRef;
use async_trait::async_trait;
use dal_schema::Schema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Anything that can report the direct relations of a document
#[async_trait]
pub trait RelationSource: Send + Sync {
    /// Formatted references (`ws/scope/ref/version`) held by `doc`
    async fn direct_relations(&self, doc: &DocumentRef) -> PersistenceResult<Vec<String>>;
}

/// One stored document as reported by [`Persistence::list_scopes`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeEntry {
    /// `workspace/scope/ref`
    pub url: String,
    /// Scope name
    pub scope: String,
    /// Document reference
    pub reference: String,
}

/// One stored version as reported by [`Persistence::list_versions`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// `workspace/scope/ref/tag`
    pub url: String,
    /// Version tag
    pub tag: String,
    /// Creation time (RFC 3339) when the adapter records one
    pub date: Option<String>,
}

/// Storage backend of one workspace
///
/// Raw documents exchanged with an adapter have the shape
/// `{"schema_version": "1.0", "<scope>": {"<ref>": {...}}}`.
#[async_trait]
pub trait Persistence: RelationSource + fmt::Debug {
    /// Short adapter name for logs
    fn name(&self) -> &'static str;

    /// Whether tags other than `__UNVERSIONED__` are stored
    fn versioning(&self) -> bool;

    /// Raw document, `None` if nothing is stored
    async fn read(&self, doc: &DocumentRef) -> PersistenceResult<Option<Value>>;

    /// Store `body` (the attribute map of the document) under `doc`
    async fn write(&self, doc: &DocumentRef, schema: &Schema, body: &Value)
        -> PersistenceResult<()>;

    /// Remove the document, or only the structure named by `partial`
    async fn delete(
        &self,
        doc: &DocumentRef,
        schema: &Schema,
        partial: Option<&Value>,
    ) -> PersistenceResult<()>;

    /// Recompute every cached relation list, returning the document count
    async fn rebuild_indexes(&self) -> PersistenceResult<usize>;

    /// Stored documents, optionally restricted to one scope
    async fn list_scopes(&self, scope: Option<&str>) -> PersistenceResult<Vec<ScopeEntry>>;

    /// Stored versions of one document
    async fn list_versions(&self, scope: &str, reference: &str)
        -> PersistenceResult<Vec<VersionEntry>>;
}

/// Wrap an attribute map into the raw document shape
#[must_use]
pub fn wrap_document(doc: &DocumentRef, schema_version: &str, body: Value) -> Value {
    let mut by_ref = serde_json::Map::new();
    by_ref.insert(doc.reference.clone(), body);
    let mut raw = serde_json::Map::new();
    raw.insert("schema_version".into(), Value::String(schema_version.into()));
    raw.insert(doc.scope.clone(), Value::Object(by_ref));
    Value::Object(raw)
}

/// Attribute map held by a raw document, if any
#[must_use]
pub fn unwrap_document<'a>(doc: &DocumentRef, raw: &'a Value) -> Option<&'a Value> {
    raw.get(&doc.scope).and_then(|scope| scope.get(&doc.reference))
}

/// Schema version recorded in a raw document
#[must_use]
pub fn raw_schema_version(raw: &Value) -> Option<&str> {
    raw.get("schema_version").and_then(Value::as_str)
}
