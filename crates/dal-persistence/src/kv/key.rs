//! Key grammar
//!
//! Every key of a document starts with `scope:ref`. Walking the schema from
//! the document node:
//!
//! - an object attribute appends `,name:`
//! - a hash attribute appends `,name:child` and recurses per child
//! - a property appends `,name:`, followed by the value itself when the
//!   property stores its value on the key
//!
//! So `Flow:f1,Links:abc,From:` is the `From` leaf of link `abc`.

use super::payload::render_tail;
use crate::error::{PersistenceError, PersistenceResult};
use dal_schema::{PropertySchema, Schema, SchemaEntry, StorageKind};
use dal_tree::NodeId;
use serde_json::{Map, Value};
use tracing::debug;

/// Key prefix shared by every key of a document
#[must_use]
pub fn document_prefix(scope: &str, reference: &str) -> String {
    format!("{scope}:{reference}")
}

/// Prefix that scans exactly one document's keys
#[must_use]
pub fn scan_prefix(prefix: &str) -> String {
    format!("{prefix},")
}

/// Side key holding the schema version
#[must_use]
pub fn version_key(prefix: &str) -> String {
    format!("{prefix},_schema_version:")
}

/// Side key holding the relation cache
#[must_use]
pub fn relations_key(prefix: &str) -> String {
    format!("{prefix},relations:")
}

/// Whether `key` is one of the document's side keys
#[must_use]
pub fn is_side_key(prefix: &str, key: &str) -> bool {
    key == version_key(prefix) || key == relations_key(prefix)
}

/// Split the `scope:ref` head off a key
#[must_use]
pub fn split_document(key: &str) -> Option<(&str, &str)> {
    let head = key.split_once(',').map_or(key, |(head, _)| head);
    head.split_once(':')
        .filter(|(scope, reference)| !scope.is_empty() && !reference.is_empty())
}

/// Store operation planned for one key
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    /// Value lives in the key; `prop_prefix` finds older variants
    OnKey {
        /// Key up to and including `prop:`
        prop_prefix: String,
        /// Value carried by the key
        value: Value,
    },
    /// Scalar payload
    Scalar(Value),
    /// Map payload
    Map(Map<String, Value>),
    /// Sequence payload
    Sequence(Vec<Value>),
}

/// One key computed from a document body
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPlan {
    /// Full key
    pub key: String,
    /// What to store there
    pub action: KeyAction,
}

/// Compute every key of `body` under `prefix`
///
/// Attributes the schema does not declare are skipped. An empty `hash` or
/// `list` property still gets a plan, but the store holds nothing for an
/// empty map or sequence, so the property reads back absent rather than as
/// `{}` or `[]`.
///
/// # Errors
/// [`PersistenceError::InvalidShape`] when a value does not fit its schema
/// node, or a hash child name contains `,`.
pub fn plan_keys(schema: &Schema, prefix: &str, body: &Value) -> PersistenceResult<Vec<KeyPlan>> {
    let mut out = Vec::new();
    plan_object(schema, schema.document(), prefix, body, &mut out)?;
    Ok(out)
}

fn plan_object(
    schema: &Schema,
    node: NodeId,
    base: &str,
    value: &Value,
    out: &mut Vec<KeyPlan>,
) -> PersistenceResult<()> {
    let map = value.as_object().ok_or_else(|| {
        PersistenceError::InvalidShape(format!("'{base}' expects an object, got {value}"))
    })?;

    for (name, child_value) in map {
        let Ok(child) = schema.resolve_child(node, name) else {
            debug!(key = base, attribute = %name, "skipping undeclared attribute");
            continue;
        };
        let head = format!("{base},{name}:");
        match schema.entry(child) {
            Some(SchemaEntry::Property(property)) => {
                out.push(plan_property(property, head, child_value)?);
            }
            Some(SchemaEntry::Object(object)) if object.is_hash => {
                let entries = child_value.as_object().ok_or_else(|| {
                    PersistenceError::InvalidShape(format!("'{head}' expects a map of entries"))
                })?;
                for (entry_name, entry_value) in entries {
                    check_segment(entry_name)?;
                    plan_object(schema, child, &format!("{head}{entry_name}"), entry_value, out)?;
                }
            }
            Some(SchemaEntry::Object(_)) => plan_object(schema, child, &head, child_value, out)?,
            _ => {}
        }
    }
    Ok(())
}

fn plan_property(property: &PropertySchema, head: String, value: &Value) -> PersistenceResult<KeyPlan> {
    if property.value_on_key {
        return Ok(KeyPlan {
            key: format!("{head}{}", render_tail(value)),
            action: KeyAction::OnKey {
                prop_prefix: head,
                value: value.clone(),
            },
        });
    }
    let action = match property.storage {
        StorageKind::Scalar => KeyAction::Scalar(value.clone()),
        StorageKind::Map => KeyAction::Map(
            value
                .as_object()
                .cloned()
                .ok_or_else(|| PersistenceError::InvalidShape(format!("'{head}' expects a map")))?,
        ),
        StorageKind::Sequence => KeyAction::Sequence(
            value
                .as_array()
                .cloned()
                .ok_or_else(|| PersistenceError::InvalidShape(format!("'{head}' expects a list")))?,
        ),
    };
    Ok(KeyPlan { key: head, action })
}

/// Reject names that would break the grammar
///
/// # Errors
/// [`PersistenceError::InvalidShape`] if `segment` contains `,` or is empty.
pub fn check_segment(segment: &str) -> PersistenceResult<()> {
    if segment.is_empty() || segment.contains(',') {
        return Err(PersistenceError::InvalidShape(format!(
            "'{segment}' cannot be used in a key"
        )));
    }
    Ok(())
}

/// Key resolved against a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    /// Attribute names from the document node, hash child names included
    pub path: Vec<String>,
    /// Schema property the key stores
    pub property: NodeId,
    /// Text after `prop:`
    pub tail: String,
}

/// Parse a document key structurally
///
/// # Errors
/// [`PersistenceError::InvalidShape`] if the key does not follow the grammar
/// for this schema.
pub fn parse_key(schema: &Schema, prefix: &str, key: &str) -> PersistenceResult<ParsedKey> {
    let invalid = |why: &str| PersistenceError::InvalidShape(format!("key '{key}': {why}"));

    let mut rest = key
        .strip_prefix(prefix)
        .and_then(|r| r.strip_prefix(','))
        .ok_or_else(|| invalid("outside the document"))?;
    let mut node = schema.document();
    let mut path = Vec::new();

    loop {
        let (name, after) = rest
            .split_once(':')
            .ok_or_else(|| invalid("missing ':'"))?;
        let child = schema
            .resolve_child(node, name)
            .map_err(|_| invalid("undeclared attribute"))?;
        path.push(name.to_string());

        match schema.entry(child) {
            Some(SchemaEntry::Property(property)) => {
                if !property.value_on_key && !after.is_empty() {
                    return Err(invalid("payload property with a tail"));
                }
                return Ok(ParsedKey {
                    path,
                    property: child,
                    tail: after.to_string(),
                });
            }
            Some(SchemaEntry::Object(object)) if object.is_hash => {
                let (entry, remainder) = after
                    .split_once(',')
                    .ok_or_else(|| invalid("hash entry without attributes"))?;
                if entry.is_empty() {
                    return Err(invalid("empty hash entry"));
                }
                path.push(entry.to_string());
                rest = remainder;
            }
            Some(SchemaEntry::Object(_)) => {
                rest = after
                    .strip_prefix(',')
                    .ok_or_else(|| invalid("object without attributes"))?;
            }
            _ => return Err(invalid("unexpected schema node")),
        }
        node = child;
    }
}

/// Keys named by a partial payload
///
/// Properties select their key (every value variant for value-on-key
/// properties). A non-object value at an object or hash entry selects the
/// whole subtree.
///
/// # Errors
/// [`PersistenceError::InvalidShape`] if `partial` is not an object.
pub fn delete_targets(
    schema: &Schema,
    prefix: &str,
    partial: &Value,
    existing: &[String],
) -> PersistenceResult<Vec<String>> {
    let mut out = Vec::new();
    collect_targets(schema, schema.document(), prefix, partial, existing, &mut out)?;
    out.sort();
    out.dedup();
    Ok(out)
}

fn collect_targets(
    schema: &Schema,
    node: NodeId,
    base: &str,
    value: &Value,
    existing: &[String],
    out: &mut Vec<String>,
) -> PersistenceResult<()> {
    let map = value.as_object().ok_or_else(|| {
        PersistenceError::InvalidShape(format!("partial payload at '{base}' must be an object"))
    })?;
    let under = |prefix: &str, out: &mut Vec<String>| {
        out.extend(existing.iter().filter(|k| k.starts_with(prefix)).cloned());
    };

    for (name, child_value) in map {
        let Ok(child) = schema.resolve_child(node, name) else {
            continue;
        };
        let head = format!("{base},{name}:");
        match schema.entry(child) {
            Some(SchemaEntry::Property(property)) if property.value_on_key => under(&head, out),
            Some(SchemaEntry::Property(_)) => out.push(head),
            Some(SchemaEntry::Object(object)) if object.is_hash => match child_value.as_object() {
                Some(entries) => {
                    for (entry_name, entry_value) in entries {
                        let entry_base = format!("{head}{entry_name}");
                        if entry_value.is_object() {
                            collect_targets(schema, child, &entry_base, entry_value, existing, out)?;
                        } else {
                            under(&format!("{entry_base},"), out);
                        }
                    }
                }
                None => under(&head, out),
            },
            Some(SchemaEntry::Object(_)) if child_value.is_object() => {
                collect_targets(schema, child, &head, child_value, existing, out)?;
            }
            Some(SchemaEntry::Object(_)) => under(&head, out),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dal_test_utils::fixtures;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn plan_flow_document() {
        let schema = fixtures::flow_schema();
        let body = json!({
            "Label": "demo",
            "Links": {"abc": {"From": "n1/out", "To": "n2/in"}},
            "Meta": {"Owner": "ops"},
            "Tags": ["a", "b"],
            "Bogus": 1
        });
        let plans = plan_keys(&schema, "Flow:f1", &body).unwrap();
        let keys: Vec<&str> = plans.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "Flow:f1,Label:",
                "Flow:f1,Links:abc,From:",
                "Flow:f1,Links:abc,To:",
                "Flow:f1,Meta:,Owner:",
                "Flow:f1,Tags:",
            ]
        );
        assert_eq!(plans[4].action, KeyAction::Sequence(vec![json!("a"), json!("b")]));
    }

    #[test]
    fn value_on_key_property_carries_value() {
        let schema = fixtures::node_schema();
        let plans = plan_keys(&schema, "Node:n1", &json!({"Template": "t1"})).unwrap();
        assert_eq!(plans[0].key, "Node:n1,Template:t1");
        assert!(matches!(
            &plans[0].action,
            KeyAction::OnKey { prop_prefix, .. } if prop_prefix == "Node:n1,Template:"
        ));
    }

    #[test]
    fn shape_errors() {
        let schema = fixtures::flow_schema();
        assert!(plan_keys(&schema, "Flow:f1", &json!({"Links": 3})).is_err());
        assert!(plan_keys(&schema, "Flow:f1", &json!({"Links": {"a,b": {}}})).is_err());
        assert!(plan_keys(&schema, "Flow:f1", &json!({"Tags": "x"})).is_err());
        assert!(plan_keys(&schema, "Flow:f1", &json!([1])).is_err());
    }

    #[test]
    fn parse_keys_structurally() {
        let schema = fixtures::flow_schema();
        let parsed = parse_key(&schema, "Flow:f1", "Flow:f1,Links:abc,From:").unwrap();
        assert_eq!(parsed.path, vec!["Links", "abc", "From"]);
        assert_eq!(parsed.tail, "");
        assert_eq!(schema.name(parsed.property), "From");

        let nested = parse_key(&schema, "Flow:f1", "Flow:f1,Meta:,Owner:").unwrap();
        assert_eq!(nested.path, vec!["Meta", "Owner"]);

        for bad in [
            "Flow:f1,Nope:",
            "Flow:f1,Label:tail",
            "Flow:f1,Links:abc",
            "Flow:f1,_schema_version:",
            "Flow:f2,Label:",
        ] {
            assert!(parse_key(&schema, "Flow:f1", bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn parse_value_on_key_tail_with_commas() {
        let schema = fixtures::node_schema();
        let parsed = parse_key(&schema, "Node:n1", "Node:n1,Template:a,b").unwrap();
        assert_eq!(parsed.tail, "a,b");
    }

    #[test]
    fn partial_delete_targets() {
        let schema = fixtures::flow_schema();
        let existing: Vec<String> = [
            "Flow:f1,Label:",
            "Flow:f1,Links:abc,From:",
            "Flow:f1,Links:abc,To:",
            "Flow:f1,Links:xyz,From:",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        let targets =
            delete_targets(&schema, "Flow:f1", &json!({"Links": {"abc": null}}), &existing).unwrap();
        assert_eq!(targets, vec!["Flow:f1,Links:abc,From:", "Flow:f1,Links:abc,To:"]);

        let targets = delete_targets(
            &schema,
            "Flow:f1",
            &json!({"Label": null, "Links": {"xyz": {"From": null}}}),
            &existing,
        )
        .unwrap();
        assert_eq!(targets, vec!["Flow:f1,Label:", "Flow:f1,Links:xyz,From:"]);
    }

    #[test]
    fn document_heads() {
        assert_eq!(split_document("Flow:f1,Label:"), Some(("Flow", "f1")));
        assert_eq!(split_document("Node:n1,Template:a:b"), Some(("Node", "n1")));
        assert_eq!(split_document("orphan"), None);
        assert!(is_side_key("Flow:f1", "Flow:f1,relations:"));
        assert!(!is_side_key("Flow:f1", "Flow:f1,Label:"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn planned_keys_parse_back(
                link in "[a-z0-9_]{1,8}",
                from in "[a-z0-9/]{0,12}",
                label in "[ -~]{0,12}",
            ) {
                let schema = fixtures::flow_schema();
                let body = json!({"Label": label, "Links": {link.clone(): {"From": from}}});
                for plan in plan_keys(&schema, "Flow:f1", &body).unwrap() {
                    let parsed = parse_key(&schema, "Flow:f1", &plan.key).unwrap();
                    prop_assert_eq!(parsed.tail, "");
                    if parsed.path.len() == 3 {
                        prop_assert_eq!(&parsed.path[1], &link);
                    }
                }
            }
        }
    }
}
