//! Format `1.0`
//!
//! ```json
//! {
//!   "_version": "1.0",
//!   "schema": { "Flow": { "$name": { "Label": "str", "Links": { "$name": { "From": "str" } } } } },
//!   "relations": { "Links/From": { "scope": "Node" } }
//! }
//! ```
//!
//! A `$name` key turns its enclosing object into a hash. A leading `&` on a
//! type name stores the value on the key.

use super::{expect_version, SchemaVersion};
use crate::entry::{ObjectSchema, PropertySchema, ValueType};
use crate::error::{SchemaError, SchemaResult};
use crate::schema::{Schema, SchemaBuilder};
use dal_tree::NodeId;
use serde_json::{Map, Value};

const HASH_MARKER: &str = "$name";

pub(super) fn deserialize(scope: &str, raw: &Value) -> SchemaResult<Schema> {
    let definition = expect_version(scope, raw, SchemaVersion::V1)?;

    let attributes = definition
        .get("schema")
        .and_then(Value::as_object)
        .ok_or_else(|| SchemaError::invalid(scope, "missing schema definition"))?;

    let mut builder = SchemaBuilder::new(scope, SchemaVersion::V1);
    let root = builder.root();
    add_attributes(&mut builder, root, attributes)?;

    if let Some(relations) = definition.get("relations").and_then(Value::as_object) {
        for (path, target) in relations {
            let target_scope = target
                .get("scope")
                .and_then(Value::as_str)
                .or_else(|| target.as_str())
                .ok_or_else(|| {
                    SchemaError::invalid(scope, format!("relation '{path}' has no target scope"))
                })?;
            builder.add_relation(path, target_scope);
        }
    }

    builder.build()
}

fn add_attributes(
    builder: &mut SchemaBuilder,
    parent: NodeId,
    attributes: &Map<String, Value>,
) -> SchemaResult<()> {
    for (name, definition) in attributes {
        if name == HASH_MARKER {
            let inner = definition.as_object().ok_or_else(|| {
                SchemaError::invalid(builder.scope(), "'$name' must hold an object")
            })?;
            builder.mark_hash(parent);
            add_attributes(builder, parent, inner)?;
            continue;
        }

        match definition {
            Value::Object(inner) => {
                let object = builder.add_object(parent, name, ObjectSchema::default())?;
                add_attributes(builder, object, inner)?;
            }
            Value::String(type_name) => {
                let (value_on_key, type_name) = match type_name.strip_prefix('&') {
                    Some(rest) => (true, rest),
                    None => (false, type_name.as_str()),
                };
                let property = PropertySchema::new(ValueType::from_name(type_name))
                    .with_value_on_key(value_on_key);
                builder.add_property(parent, name, property)?;
            }
            other => {
                return Err(SchemaError::invalid(
                    builder.scope(),
                    format!("attribute '{name}' has unsupported definition {other}"),
                ))
            }
        }
    }
    Ok(())
}
