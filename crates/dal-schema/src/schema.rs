//! Resolved schema for one `(scope, version)` pair

use crate::entry::{ObjectSchema, PropertySchema, SchemaEntry};
use crate::error::{SchemaError, SchemaResult};
use crate::version::SchemaVersion;
use dal_tree::{Layout, NodeId, Tree};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Relation declared by a schema
///
/// The value found at `path` (relative to the document root, `/` separated)
/// references a document of `scope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Attribute path inside the document
    pub path: String,
    /// Target scope
    pub scope: String,
}

/// Schema tree for one scope and version
///
/// The root node carries the scope name; its single child is the document
/// node, a hash object whose children are the document's attributes.
#[derive(Debug)]
pub struct Schema {
    scope: String,
    version: SchemaVersion,
    tree: Tree<SchemaEntry>,
    root: NodeId,
    document: NodeId,
    relations: Vec<RelationDef>,
}

impl Schema {
    /// Scope name
    #[inline]
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Version tag, e.g. `"1.0"`
    #[inline]
    #[must_use]
    pub fn version(&self) -> &'static str {
        self.version.as_str()
    }

    /// Definition format
    #[inline]
    #[must_use]
    pub fn schema_version(&self) -> SchemaVersion {
        self.version
    }

    /// Underlying tree
    #[inline]
    #[must_use]
    pub fn tree(&self) -> &Tree<SchemaEntry> {
        &self.tree
    }

    /// Root node of the definition
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Node describing one document of this scope
    #[inline]
    #[must_use]
    pub fn document(&self) -> NodeId {
        self.document
    }

    /// Declared relations
    #[inline]
    #[must_use]
    pub fn relations(&self) -> &[RelationDef] {
        &self.relations
    }

    /// Payload of a schema node
    #[inline]
    #[must_use]
    pub fn entry(&self, id: NodeId) -> Option<&SchemaEntry> {
        self.tree.get(id)
    }

    /// Property description of a node
    #[inline]
    #[must_use]
    pub fn property(&self, id: NodeId) -> Option<&PropertySchema> {
        self.entry(id).and_then(SchemaEntry::as_property)
    }

    /// Object description of a node
    #[inline]
    #[must_use]
    pub fn object(&self, id: NodeId) -> Option<&ObjectSchema> {
        self.entry(id).and_then(SchemaEntry::as_object)
    }

    /// Attribute name of a node
    #[inline]
    #[must_use]
    pub fn name(&self, id: NodeId) -> &str {
        self.tree.name(id).unwrap_or_default()
    }

    /// Child schema nodes in declaration order
    #[inline]
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.tree.children(id)
    }

    /// Resolve a top-level document attribute
    ///
    /// # Errors
    /// [`SchemaError::NoSuchAttribute`] if the name is not declared.
    pub fn resolve(&self, name: &str) -> SchemaResult<NodeId> {
        self.resolve_child(self.document, name)
    }

    /// Resolve an attribute under any object node
    ///
    /// # Errors
    /// [`SchemaError::NoSuchAttribute`] if `parent` does not declare `name`.
    pub fn resolve_child(&self, parent: NodeId, name: &str) -> SchemaResult<NodeId> {
        self.tree
            .child(parent, name)
            .ok_or_else(|| SchemaError::NoSuchAttribute {
                scope: self.scope.clone(),
                name: name.to_string(),
            })
    }

    /// Resolve a `/` separated attribute path from the document node
    ///
    /// Hash children share one schema, so a path never names a concrete
    /// hash key: `Links/From` addresses `From` in every link.
    ///
    /// # Errors
    /// [`SchemaError::NoSuchAttribute`] on the first unknown segment.
    pub fn resolve_path(&self, path: &str) -> SchemaResult<NodeId> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self.document, |node, segment| self.resolve_child(node, segment))
    }

    /// Path of a node relative to the document node
    #[must_use]
    pub fn attribute_path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.document || node == self.root {
                break;
            }
            segments.push(self.name(node).to_string());
            current = self.tree.parent(node);
        }
        segments.reverse();
        segments.join("/")
    }

    /// Whether some declared property has this name and accepts the value
    #[must_use]
    pub fn validate(&self, name: &str, value: &Value) -> bool {
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            if let Some(property) = self.property(node) {
                if self.name(node) == name && property.value_type.accepts(value) {
                    return true;
                }
            }
            stack.extend(self.tree.children(node));
        }
        false
    }
}

/// Incremental construction used by the version deserializers
#[derive(Debug)]
pub(crate) struct SchemaBuilder {
    scope: String,
    version: SchemaVersion,
    tree: Tree<SchemaEntry>,
    root: NodeId,
    relations: Vec<RelationDef>,
}

impl SchemaBuilder {
    pub(crate) fn new(scope: &str, version: SchemaVersion) -> Self {
        let mut tree = Tree::new();
        let root = tree.insert(
            scope,
            SchemaEntry::Root {
                scope: scope.to_string(),
            },
            Layout::Map,
        );
        Self {
            scope: scope.to_string(),
            version,
            tree,
            root,
            relations: Vec::new(),
        }
    }

    pub(crate) fn scope(&self) -> &str {
        &self.scope
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn add_object(
        &mut self,
        parent: NodeId,
        name: &str,
        object: ObjectSchema,
    ) -> SchemaResult<NodeId> {
        let id = self.tree.insert(name, SchemaEntry::Object(object), Layout::Map);
        self.tree.attach(parent, id)?;
        Ok(id)
    }

    pub(crate) fn add_property(
        &mut self,
        parent: NodeId,
        name: &str,
        property: PropertySchema,
    ) -> SchemaResult<NodeId> {
        let id = self
            .tree
            .insert(name, SchemaEntry::Property(property), Layout::Leaf);
        self.tree.attach(parent, id)?;
        Ok(id)
    }

    /// Turn an object into a hash keyed by child name
    pub(crate) fn mark_hash(&mut self, id: NodeId) {
        if let Some(SchemaEntry::Object(object)) = self.tree.get_mut(id) {
            object.is_hash = true;
            object.value_on_key = true;
        }
    }

    pub(crate) fn add_relation(&mut self, path: &str, scope: &str) {
        self.relations.push(RelationDef {
            path: path.trim_matches('/').to_string(),
            scope: scope.to_string(),
        });
    }

    /// Finish the schema; the root must declare the scope's document node
    pub(crate) fn build(self) -> SchemaResult<Schema> {
        let document = self.tree.child(self.root, &self.scope).ok_or_else(|| {
            SchemaError::invalid(&self.scope, "definition does not declare the scope object")
        })?;

        let schema = Schema {
            scope: self.scope,
            version: self.version,
            tree: self.tree,
            root: self.root,
            document,
            relations: self.relations,
        };

        for relation in &schema.relations {
            let target = schema.resolve_path(&relation.path).map_err(|_| {
                SchemaError::invalid(
                    schema.scope(),
                    format!("relation path '{}' is not declared", relation.path),
                )
            })?;
            if schema.property(target).is_none() {
                return Err(SchemaError::invalid(
                    schema.scope(),
                    format!("relation path '{}' does not name a property", relation.path),
                ));
            }
        }

        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ValueType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn flow() -> Schema {
        let mut builder = SchemaBuilder::new("Flow", SchemaVersion::V1);
        let root = builder.root();
        let doc = builder
            .add_object(root, "Flow", ObjectSchema::default())
            .unwrap();
        builder.mark_hash(doc);
        builder
            .add_property(doc, "Label", PropertySchema::new(ValueType::Str))
            .unwrap();
        let links = builder
            .add_object(doc, "Links", ObjectSchema::default())
            .unwrap();
        builder.mark_hash(links);
        builder
            .add_property(links, "From", PropertySchema::new(ValueType::Str))
            .unwrap();
        builder
            .add_property(links, "To", PropertySchema::new(ValueType::Str))
            .unwrap();
        builder.add_relation("Links/From", "Node");
        builder.build().unwrap()
    }

    #[test]
    fn schema_resolve_and_paths() {
        let schema = flow();
        let links = schema.resolve("Links").unwrap();
        assert!(schema.object(links).unwrap().is_hash);
        let from = schema.resolve_path("Links/From").unwrap();
        assert_eq!(schema.attribute_path(from), "Links/From");
        assert_eq!(schema.tree().depth(from), 3);
        assert!(schema.resolve("Nope").unwrap_err().is_not_found());
    }

    #[test]
    fn schema_validate_by_name_and_type() {
        let schema = flow();
        assert!(schema.validate("Label", &json!("x")));
        assert!(schema.validate("From", &json!("n1/p1")));
        assert!(!schema.validate("Label", &json!(3)));
        assert!(!schema.validate("Unknown", &json!("x")));
    }

    #[test]
    fn build_rejects_undeclared_relation_path() {
        let mut builder = SchemaBuilder::new("Flow", SchemaVersion::V1);
        let root = builder.root();
        builder
            .add_object(root, "Flow", ObjectSchema::default())
            .unwrap();
        builder.add_relation("Nodes/Template", "Node");
        let err = builder.build().unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefinition { .. }));
    }

    #[test]
    fn build_requires_scope_object() {
        let builder = SchemaBuilder::new("Flow", SchemaVersion::V1);
        assert!(builder.build().is_err());
    }
}
