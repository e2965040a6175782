//! Format `2.0`
//!
//! Attributes are explicit descriptors and the document object is implied
//! by the scope name:
//!
//! ```json
//! {
//!   "_version": "2.0",
//!   "attributes": {
//!     "Label": { "type": "str", "default": "untitled" },
//!     "Layer": { "type": "str", "value_on_key": true },
//!     "Links": { "kind": "hash", "attributes": { "From": { "type": "str" } } }
//!   },
//!   "relations": [ { "path": "Links/From", "scope": "Node" } ]
//! }
//! ```

use super::{expect_version, SchemaVersion};
use crate::entry::{ObjectSchema, PropertySchema, ValueType};
use crate::error::{SchemaError, SchemaResult};
use crate::schema::{Schema, SchemaBuilder};
use dal_tree::NodeId;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
struct RelationEntry {
    path: String,
    scope: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Kind {
    #[default]
    Property,
    Object,
    Hash,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    #[serde(default)]
    kind: Kind,
    #[serde(rename = "type", default)]
    value_type: Option<String>,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    value_on_key: bool,
    #[serde(default)]
    attributes: Map<String, Value>,
}

pub(super) fn deserialize(scope: &str, raw: &Value) -> SchemaResult<Schema> {
    let definition = expect_version(scope, raw, SchemaVersion::V2)?;

    let attributes = definition
        .get("attributes")
        .and_then(Value::as_object)
        .ok_or_else(|| SchemaError::invalid(scope, "missing attributes definition"))?;

    let mut builder = SchemaBuilder::new(scope, SchemaVersion::V2);
    let root = builder.root();
    let document = builder.add_object(
        root,
        scope,
        ObjectSchema {
            is_hash: true,
            value_on_key: true,
        },
    )?;
    add_attributes(&mut builder, document, attributes)?;

    if let Some(relations) = definition.get("relations") {
        let relations: Vec<RelationEntry> = serde_json::from_value(relations.clone())
            .map_err(|e| SchemaError::invalid(scope, format!("malformed relations: {e}")))?;
        for relation in relations {
            builder.add_relation(&relation.path, &relation.scope);
        }
    }

    builder.build()
}

fn add_attributes(
    builder: &mut SchemaBuilder,
    parent: NodeId,
    attributes: &Map<String, Value>,
) -> SchemaResult<()> {
    for (name, raw) in attributes {
        let descriptor: Descriptor = serde_json::from_value(raw.clone()).map_err(|e| {
            SchemaError::invalid(builder.scope(), format!("attribute '{name}': {e}"))
        })?;

        match descriptor.kind {
            Kind::Property => {
                let value_type =
                    ValueType::from_name(descriptor.value_type.as_deref().unwrap_or("any"));
                let mut property =
                    PropertySchema::new(value_type).with_value_on_key(descriptor.value_on_key);
                if let Some(default) = descriptor.default {
                    property = property.with_default(default);
                }
                builder.add_property(parent, name, property)?;
            }
            Kind::Object | Kind::Hash => {
                let is_hash = matches!(descriptor.kind, Kind::Hash);
                let object = builder.add_object(
                    parent,
                    name,
                    ObjectSchema {
                        is_hash,
                        value_on_key: is_hash,
                    },
                )?;
                add_attributes(builder, object, &descriptor.attributes)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn v2_builds_explicit_descriptors() {
        let raw = json!({
            "_version": "2.0",
            "attributes": {
                "Label": { "type": "str", "default": "untitled" },
                "Layer": { "type": "str", "value_on_key": true },
                "Links": { "kind": "hash", "attributes": { "From": { "type": "str" } } },
                "Meta": { "kind": "object", "attributes": { "Owner": { "type": "str" } } }
            },
            "relations": [ { "path": "Links/From", "scope": "Node" } ]
        });
        let schema = deserialize("Flow", &raw).unwrap();
        assert_eq!(schema.version(), "2.0");

        let label = schema.property(schema.resolve("Label").unwrap()).unwrap();
        assert_eq!(label.default, json!("untitled"));
        assert!(schema.property(schema.resolve("Layer").unwrap()).unwrap().value_on_key);
        assert!(schema.object(schema.resolve("Links").unwrap()).unwrap().is_hash);
        assert!(!schema.object(schema.resolve("Meta").unwrap()).unwrap().is_hash);
        assert!(schema.resolve_path("Meta/Owner").is_ok());
        assert_eq!(schema.relations()[0].path, "Links/From");
    }

    #[test]
    fn v2_rejects_v1_layout() {
        let raw = json!({ "_version": "2.0", "schema": { "Flow": {} } });
        let err = deserialize("Flow", &raw).unwrap_err();
        assert!(err.to_string().contains("missing attributes"));
    }
}
