//! Workspace document tree
//!
//! A [`Workspace`] owns one arena holding `workspace → scope → instance →
//! version` nodes. Each version node is the root object of a document and is
//! bound to its schema; attributes below it are materialized on first
//! access and cached in the tree.

use crate::error::{DalError, DalResult};
use crate::node::{Attribute, DocNode};
use dal_persistence::{
    raw_schema_version, unwrap_document, DocumentRef, Persistence, ScopeEntry, VersionEntry,
    DEFAULT_SCHEMA_VERSION, UNVERSIONED,
};
use dal_schema::{Schema, SchemaEntry, SchemaRegistry};
use dal_tree::{Layout, NodeId, Tree};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How unknown names are treated while assigning a map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assign {
    /// Unknown names fail with `NoSuchAttribute`
    Strict,
    /// Unknown names are skipped; used when loading stored data
    Lenient,
}

/// One persistence domain and its cached documents
pub struct Workspace {
    name: String,
    tree: Tree<DocNode>,
    root: NodeId,
    persistence: Arc<dyn Persistence>,
    schemas: Arc<SchemaRegistry>,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("name", &self.name)
            .field("nodes", &self.tree.len())
            .field("adapter", &self.persistence.name())
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// Empty workspace bound to an adapter
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        persistence: Arc<dyn Persistence>,
        schemas: Arc<SchemaRegistry>,
    ) -> Self {
        let name = name.into();
        let mut tree = Tree::new();
        let root = tree.insert(name.clone(), DocNode::Workspace, Layout::Map);
        Self {
            name,
            tree,
            root,
            persistence,
            schemas,
        }
    }

    /// Workspace name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Document tree
    #[inline]
    #[must_use]
    pub fn tree(&self) -> &Tree<DocNode> {
        &self.tree
    }

    /// Adapter backing this workspace
    #[inline]
    #[must_use]
    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    /// Handle for one scope
    pub fn scope(&mut self, name: impl Into<String>) -> ScopeHandle<'_> {
        ScopeHandle {
            workspace: self,
            scope: name.into(),
        }
    }

    fn child_or_insert(&mut self, parent: NodeId, name: &str, data: DocNode) -> DalResult<NodeId> {
        if let Some(id) = self.tree.child(parent, name) {
            return Ok(id);
        }
        let id = self.tree.insert(name, data, Layout::Map);
        self.tree.attach(parent, id)?;
        Ok(id)
    }

    fn cached_version(&self, scope: &str, reference: &str, tag: &str) -> Option<NodeId> {
        let scope = self.tree.child(self.root, scope)?;
        let instance = self.tree.child(scope, reference)?;
        self.tree.child(instance, tag)
    }

    fn check_versioning(&self, tag: &str) -> DalResult<()> {
        if tag != UNVERSIONED && !self.persistence.versioning() {
            return Err(DalError::Unsupported(format!(
                "workspace '{}' does not store version '{tag}'",
                self.name
            )));
        }
        Ok(())
    }

    fn attach_version(
        &mut self,
        scope: &str,
        reference: &str,
        tag: &str,
        schema: Arc<Schema>,
    ) -> DalResult<NodeId> {
        let scope_node = self.child_or_insert(self.root, scope, DocNode::Scope)?;
        let instance = self.child_or_insert(scope_node, reference, DocNode::Instance)?;
        let version = self.tree.insert(
            tag,
            DocNode::Version {
                tag: tag.to_string(),
                schema,
            },
            Layout::Map,
        );
        self.tree.attach(instance, version)?;
        Ok(version)
    }

    /// Remove a version node, then its instance and scope once empty
    fn remove_version(&mut self, version: NodeId) -> DalResult<()> {
        let instance = self.tree.parent(version);
        self.tree.remove(version)?;
        let mut node = instance;
        while let Some(id) = node.filter(|&id| id != self.root && self.tree.child_count(id) == 0) {
            node = self.tree.parent(id);
            self.tree.remove(id)?;
        }
        Ok(())
    }

    // Attribute access

    /// Version node enclosing `node` (or `node` itself)
    fn version_of(&self, node: NodeId) -> DalResult<NodeId> {
        match self.tree.get(node) {
            Some(DocNode::Version { .. }) => Ok(node),
            Some(_) => self
                .tree
                .find_first_ancestor(node, "version")
                .ok_or_else(|| DalError::InvalidShape(format!("node {node} is not inside a document"))),
            None => Err(dal_tree::TreeError::UnknownNode(node).into()),
        }
    }

    /// Schema bound to the document containing `node`
    ///
    /// # Errors
    /// Fails if `node` is not part of a materialized document.
    pub fn schema_of(&self, node: NodeId) -> DalResult<Arc<Schema>> {
        match self.tree.get(self.version_of(node)?) {
            Some(DocNode::Version { schema, .. }) => Ok(Arc::clone(schema)),
            _ => Err(DalError::InvalidShape(format!("node {node} has no schema"))),
        }
    }

    fn schema_node(&self, node: NodeId, schema: &Schema) -> DalResult<NodeId> {
        match self.tree.get(node) {
            Some(DocNode::Version { .. }) => Ok(schema.document()),
            Some(
                DocNode::Object { schema_node }
                | DocNode::Collection { schema_node }
                | DocNode::Property { schema_node, .. },
            ) => Ok(*schema_node),
            _ => Err(DalError::InvalidShape(format!("node {node} is not an attribute"))),
        }
    }

    fn attribute(&self, id: NodeId) -> DalResult<Attribute> {
        match self.tree.get(id) {
            Some(DocNode::Property { .. }) => Ok(Attribute::Property(id)),
            Some(DocNode::Collection { .. }) => Ok(Attribute::Collection(id)),
            Some(DocNode::Object { .. } | DocNode::Version { .. }) => Ok(Attribute::Object(id)),
            _ => Err(DalError::InvalidShape(format!("node {id} is not an attribute"))),
        }
    }

    /// Attribute `name` of an object, materialized on first access
    ///
    /// Later calls return the same node. On a collection, `name` selects an
    /// existing entry.
    ///
    /// # Errors
    /// [`DalError::NoSuchAttribute`] if the schema does not declare `name`.
    pub fn get_attr(&mut self, node: NodeId, name: &str) -> DalResult<Attribute> {
        if let Some(DocNode::Collection { .. }) = self.tree.get(node) {
            return self
                .entry(node, name)
                .map(Attribute::Object)
                .ok_or_else(|| DalError::NoSuchAttribute(name.to_string()));
        }
        if !matches!(
            self.tree.get(node),
            Some(DocNode::Object { .. } | DocNode::Version { .. })
        ) {
            return Err(DalError::InvalidShape(format!("node {node} has no attributes")));
        }
        if let Some(child) = self.tree.child(node, name) {
            return self.attribute(child);
        }

        let schema = self.schema_of(node)?;
        let parent_schema = self.schema_node(node, &schema)?;
        let schema_child = schema.resolve_child(parent_schema, name)?;
        let (data, layout) = match schema.entry(schema_child) {
            Some(SchemaEntry::Property(property)) => (
                DocNode::Property {
                    schema_node: schema_child,
                    value: property.default.clone(),
                },
                Layout::Leaf,
            ),
            Some(SchemaEntry::Object(object)) if object.is_hash => (
                DocNode::Collection {
                    schema_node: schema_child,
                },
                Layout::Map,
            ),
            _ => (
                DocNode::Object {
                    schema_node: schema_child,
                },
                Layout::Map,
            ),
        };
        let child = self.tree.insert(name, data, layout);
        self.tree.attach(node, child)?;
        self.attribute(child)
    }

    /// Assign attribute `name`
    ///
    /// Objects and collections take a map; properties take any value and
    /// are type-checked when serialized.
    ///
    /// # Errors
    /// [`DalError::NoSuchAttribute`] for undeclared names, and
    /// [`DalError::InvalidShape`] when a map is required but not given.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: Value) -> DalResult<Attribute> {
        self.assign(node, name, value, Assign::Strict)
    }

    fn assign(&mut self, node: NodeId, name: &str, value: Value, mode: Assign) -> DalResult<Attribute> {
        let attribute = match self.get_attr(node, name) {
            Err(DalError::NoSuchAttribute(n)) if mode == Assign::Lenient => {
                debug!(attribute = %n, "skipping undeclared attribute");
                return Err(DalError::NoSuchAttribute(n));
            }
            other => other?,
        };
        match attribute {
            Attribute::Property(id) => self.set_value(id, value)?,
            Attribute::Object(id) => self.assign_map(id, value, mode)?,
            Attribute::Collection(id) => {
                let Value::Object(entries) = value else {
                    return Err(DalError::InvalidShape(format!("'{name}' expects a map of entries")));
                };
                for old in self.tree.children(id) {
                    self.tree.remove(old)?;
                }
                for (entry_name, entry_value) in entries {
                    let entry = self.insert_entry(id, &entry_name)?;
                    self.assign_map(entry, entry_value, mode)?;
                }
            }
        }
        Ok(attribute)
    }

    fn assign_map(&mut self, node: NodeId, value: Value, mode: Assign) -> DalResult<()> {
        let Value::Object(map) = value else {
            return Err(DalError::InvalidShape(format!("node {node} expects a map, got {value}")));
        };
        for (name, inner) in map {
            match self.assign(node, &name, inner, mode) {
                Ok(_) => {}
                Err(DalError::NoSuchAttribute(_)) if mode == Assign::Lenient => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Value of a property node
    #[must_use]
    pub fn value(&self, node: NodeId) -> Option<&Value> {
        match self.tree.get(node) {
            Some(DocNode::Property { value, .. }) => Some(value),
            _ => None,
        }
    }

    /// Replace the value of a property node
    ///
    /// # Errors
    /// [`DalError::InvalidShape`] if `node` is not a property.
    pub fn set_value(&mut self, node: NodeId, new: Value) -> DalResult<()> {
        match self.tree.get_mut(node) {
            Some(DocNode::Property { value, .. }) => {
                *value = new;
                Ok(())
            }
            _ => Err(DalError::InvalidShape(format!("node {node} is not a property"))),
        }
    }

    // Collections

    /// Existing entry of a collection
    #[must_use]
    pub fn entry(&self, collection: NodeId, name: &str) -> Option<NodeId> {
        match self.tree.get(collection) {
            Some(DocNode::Collection { .. }) => self.tree.child(collection, name),
            _ => None,
        }
    }

    /// Add an empty entry to a collection
    ///
    /// # Errors
    /// [`DalError::AlreadyExists`] if the entry exists, and
    /// [`DalError::InvalidShape`] for names that cannot be stored.
    pub fn insert_entry(&mut self, collection: NodeId, name: &str) -> DalResult<NodeId> {
        let Some(DocNode::Collection { schema_node }) = self.tree.get(collection) else {
            return Err(DalError::InvalidShape(format!("node {collection} is not a collection")));
        };
        let schema_node = *schema_node;
        if name.is_empty() || name.contains(',') {
            return Err(DalError::InvalidShape(format!("'{name}' cannot name an entry")));
        }
        if self.tree.child(collection, name).is_some() {
            return Err(DalError::AlreadyExists(name.to_string()));
        }
        let entry = self.tree.insert(name, DocNode::Object { schema_node }, Layout::Map);
        self.tree.attach(collection, entry)?;
        Ok(entry)
    }

    /// Drop an entry from a collection
    ///
    /// # Errors
    /// [`DalError::NotFound`] if the entry does not exist.
    pub fn remove_entry(&mut self, collection: NodeId, name: &str) -> DalResult<()> {
        let entry = self
            .entry(collection, name)
            .ok_or_else(|| DalError::NotFound(name.to_string()))?;
        self.tree.remove(entry)?;
        Ok(())
    }

    /// Entries of a collection in insertion order
    #[must_use]
    pub fn entries(&self, collection: NodeId) -> Vec<(String, NodeId)> {
        if !matches!(self.tree.get(collection), Some(DocNode::Collection { .. })) {
            return Vec::new();
        }
        self.tree
            .children(collection)
            .into_iter()
            .map(|id| (self.tree.name(id).unwrap_or_default().to_string(), id))
            .collect()
    }

    // Serialization

    /// Materialized subtree as JSON
    ///
    /// Properties whose value the schema rejects are left out.
    ///
    /// # Errors
    /// Fails if `node` is not part of a document.
    pub fn serialize(&self, node: NodeId) -> DalResult<Value> {
        let schema = self.schema_of(node)?;
        Ok(self.serialize_with(&schema, node).unwrap_or(Value::Null))
    }

    fn serialize_with(&self, schema: &Schema, node: NodeId) -> Option<Value> {
        match self.tree.get(node)? {
            DocNode::Property { value, .. } => {
                let name = self.tree.name(node).unwrap_or_default();
                if schema.validate(name, value) {
                    Some(value.clone())
                } else {
                    warn!(attribute = name, value = %value, "dropping value rejected by schema");
                    None
                }
            }
            DocNode::Version { .. } | DocNode::Object { .. } | DocNode::Collection { .. } => {
                let mut map = Map::new();
                for child in self.tree.children(node) {
                    if let Some(value) = self.serialize_with(schema, child) {
                        map.insert(self.tree.name(child).unwrap_or_default().to_string(), value);
                    }
                }
                Some(Value::Object(map))
            }
            _ => None,
        }
    }

    /// Address of a version node
    ///
    /// # Errors
    /// [`DalError::InvalidShape`] if `version` is not a version node.
    pub fn document_ref(&self, version: NodeId) -> DalResult<DocumentRef> {
        let Some(DocNode::Version { tag, .. }) = self.tree.get(version) else {
            return Err(DalError::InvalidShape(format!("node {version} is not a document version")));
        };
        let instance = self.tree.parent(version);
        let scope = instance.and_then(|i| self.tree.parent(i));
        match (instance.and_then(|i| self.tree.name(i)), scope.and_then(|s| self.tree.name(s))) {
            (Some(reference), Some(scope)) => {
                Ok(DocumentRef::new(&self.name, scope, reference, tag))
            }
            _ => Err(DalError::InvalidShape(format!("version {version} is detached"))),
        }
    }

    // Persistence

    /// Store a materialized document
    ///
    /// # Errors
    /// Adapter errors, e.g. [`DalError::AlreadyExists`] for a stored tag.
    pub async fn write(&self, version: NodeId) -> DalResult<DocumentRef> {
        let doc = self.document_ref(version)?;
        let schema = self.schema_of(version)?;
        let body = self.serialize(version)?;
        self.persistence.write(&doc, &schema, &body).await?;
        Ok(doc)
    }

    /// Delete a document (or the part named by `partial`) and unload it
    ///
    /// # Errors
    /// Adapter errors.
    pub async fn delete(&mut self, version: NodeId, partial: Option<&Value>) -> DalResult<DocumentRef> {
        let doc = self.document_ref(version)?;
        let schema = self.schema_of(version)?;
        self.persistence.delete(&doc, &schema, partial).await?;
        self.remove_version(version)?;
        info!(doc = %doc, "deleted and unloaded document");
        Ok(doc)
    }

    /// Evict one cached version, returning whether it was loaded
    pub fn unload(&mut self, scope: &str, reference: &str, tag: &str) -> bool {
        let Some(version) = self.cached_version(scope, reference, tag) else {
            return false;
        };
        let removed = self.remove_version(version).is_ok();
        debug!(scope, reference, tag, "unloaded document");
        removed
    }

    /// Evict every cached document
    pub fn unload_all(&mut self) {
        for scope in self.tree.children(self.root) {
            if let Err(e) = self.tree.remove(scope) {
                warn!(error = %e, "failed to unload scope");
            }
        }
    }

    /// Number of loaded document versions
    #[must_use]
    pub fn loaded(&self) -> usize {
        self.tree
            .children(self.root)
            .into_iter()
            .flat_map(|scope| self.tree.children(scope))
            .map(|instance| self.tree.child_count(instance))
            .sum()
    }

    /// Stored documents
    ///
    /// # Errors
    /// Adapter errors.
    pub async fn list_scopes(&self, scope: Option<&str>) -> DalResult<Vec<ScopeEntry>> {
        Ok(self.persistence.list_scopes(scope).await?)
    }

    /// Stored versions of a document
    ///
    /// # Errors
    /// Adapter errors.
    pub async fn list_versions(&self, scope: &str, reference: &str) -> DalResult<Vec<VersionEntry>> {
        Ok(self.persistence.list_versions(scope, reference).await?)
    }

    /// Recompute relation caches
    ///
    /// # Errors
    /// Adapter errors.
    pub async fn rebuild_indexes(&self) -> DalResult<usize> {
        Ok(self.persistence.rebuild_indexes().await?)
    }
}

/// Access to the documents of one scope
#[derive(Debug)]
pub struct ScopeHandle<'a> {
    workspace: &'a mut Workspace,
    scope: String,
}

impl ScopeHandle<'_> {
    /// Scope name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.scope
    }

    fn document(&self, reference: &str, tag: &str) -> DocumentRef {
        DocumentRef::new(&self.workspace.name, &self.scope, reference, tag)
    }

    /// Load a stored document version, or return the cached one
    ///
    /// # Errors
    /// [`DalError::NotFound`] if nothing is stored, and
    /// [`DalError::Unsupported`] for versioned tags on a workspace that does
    /// not store versions.
    pub async fn get(&mut self, reference: &str, tag: &str) -> DalResult<NodeId> {
        self.workspace.check_versioning(tag)?;
        if let Some(version) = self.workspace.cached_version(&self.scope, reference, tag) {
            return Ok(version);
        }

        let doc = self.document(reference, tag);
        let raw = self
            .workspace
            .persistence
            .read(&doc)
            .await?
            .ok_or_else(|| DalError::NotFound(doc.to_string()))?;
        let body = match unwrap_document(&doc, &raw) {
            Some(Value::Object(map)) if !map.is_empty() => Value::Object(map.clone()),
            _ => return Err(DalError::NotFound(doc.to_string())),
        };
        let schema_version = raw_schema_version(&raw).unwrap_or(DEFAULT_SCHEMA_VERSION);
        let schema = self.workspace.schemas.load(&self.scope, schema_version)?;

        let version = self.workspace.attach_version(&self.scope, reference, tag, schema)?;
        self.workspace.assign_map(version, body, Assign::Lenient)?;
        debug!(doc = %doc, schema_version, "loaded document");
        Ok(version)
    }

    /// Start a new document with the default schema version
    ///
    /// # Errors
    /// See [`ScopeHandle::create_with_schema`].
    pub async fn create(&mut self, reference: &str, tag: &str, overwrite: bool) -> DalResult<NodeId> {
        self.create_with_schema(reference, tag, overwrite, DEFAULT_SCHEMA_VERSION)
            .await
    }

    /// Start a new document bound to `schema_version`
    ///
    /// # Errors
    /// [`DalError::AlreadyExists`] if the version is loaded or stored, and
    /// [`DalError::Unsupported`] when asked to overwrite one.
    pub async fn create_with_schema(
        &mut self,
        reference: &str,
        tag: &str,
        overwrite: bool,
        schema_version: &str,
    ) -> DalResult<NodeId> {
        self.workspace.check_versioning(tag)?;
        if reference.contains([',', ':']) {
            return Err(DalError::InvalidPath(reference.to_string()));
        }
        let doc = self.document(reference, tag);
        doc.check()?;
        let exists = self.workspace.cached_version(&self.scope, reference, tag).is_some()
            || self.workspace.persistence.read(&doc).await?.is_some();
        if exists {
            return Err(if overwrite {
                DalError::Unsupported(format!("overwriting {doc}"))
            } else {
                DalError::AlreadyExists(doc.to_string())
            });
        }

        let schema = self.workspace.schemas.load(&self.scope, schema_version)?;
        let version = self.workspace.attach_version(&self.scope, reference, tag, schema)?;
        debug!(doc = %doc, schema_version, "created document");
        Ok(version)
    }
}
