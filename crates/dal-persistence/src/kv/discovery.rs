//! Relation discovery over the key space
//!
//! Each declared relation path becomes a key pattern: a literal prefix used
//! for the store scan, and an anchored regex that matches only keys of that
//! path. Hash entry names are wildcards.

use super::codec::load_payload;
use super::payload::decode_tail;
use crate::error::{PersistenceError, PersistenceResult};
use crate::reference::PathDefaults;
use crate::relations::push_references;
use dal_schema::{PropertySchema, Schema, SchemaEntry};
use dal_store::KeyValueStore;
use regex::Regex;
use tracing::debug;

/// Keys matching one relation path
#[derive(Debug, Clone)]
pub struct KeyPattern {
    /// Longest literal prefix shared by every matching key
    pub literal: String,
    /// Anchored pattern; group 1 is the key tail for value-on-key leaves
    pub regex: Regex,
    /// Property found at the end of the path
    pub property: PropertySchema,
}

impl KeyPattern {
    /// Build the pattern of `path` for the document at `prefix`
    ///
    /// # Errors
    /// Schema errors for undeclared segments, and
    /// [`PersistenceError::InvalidShape`] if the path does not end at a
    /// property.
    pub fn for_path(schema: &Schema, prefix: &str, path: &str) -> PersistenceResult<Self> {
        let mut node = schema.document();
        let mut literal = prefix.to_string();
        let mut pattern = regex::escape(prefix);
        let mut open = true;
        let mut property = None;

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if property.is_some() {
                return Err(PersistenceError::InvalidShape(format!(
                    "relation path '{path}' continues past a property"
                )));
            }
            let child = schema.resolve_child(node, segment)?;
            let piece = format!(",{segment}:");
            pattern.push_str(&regex::escape(&piece));
            if open {
                literal.push_str(&piece);
            }
            match schema.entry(child) {
                Some(SchemaEntry::Property(p)) => {
                    if p.value_on_key {
                        pattern.push_str("(.*)");
                    }
                    property = Some(p.clone());
                }
                Some(SchemaEntry::Object(object)) if object.is_hash => {
                    pattern.push_str("[^,]*");
                    open = false;
                }
                _ => {}
            }
            node = child;
        }

        let property = property.ok_or_else(|| {
            PersistenceError::InvalidShape(format!("relation path '{path}' does not end at a property"))
        })?;
        let regex = Regex::new(&format!("^{pattern}$"))
            .map_err(|e| PersistenceError::InvalidShape(format!("relation pattern: {e}")))?;

        Ok(Self {
            literal,
            regex,
            property,
        })
    }
}

/// Walk every declared relation path of one stored document
///
/// Ignores any relation cache. Values that cannot be decoded or resolved are
/// skipped.
pub async fn discover(
    store: &dyn KeyValueStore,
    schema: &Schema,
    prefix: &str,
) -> PersistenceResult<Vec<String>> {
    let mut out: Vec<String> = Vec::new();

    for relation in schema.relations() {
        let pattern = KeyPattern::for_path(schema, prefix, &relation.path)?;
        let defaults = PathDefaults::new().with_scope(&relation.scope);

        for key in store.scan(&pattern.literal).await? {
            let Some(captures) = pattern.regex.captures(&key) else {
                continue;
            };
            let value = match captures.get(1) {
                Some(tail) => decode_tail(&pattern.property, tail.as_str()),
                None => load_payload(store, &key, &pattern.property).await.and_then(|v| {
                    v.ok_or_else(|| PersistenceError::NotFound(key.clone()))
                }),
            };
            match value {
                Ok(value) => {
                    let mut found = Vec::new();
                    push_references(&value, &defaults, &mut found);
                    for reference in found {
                        if !out.contains(&reference) {
                            out.push(reference);
                        }
                    }
                }
                Err(e) if e.is_decode_failure() || e.is_not_found() => {
                    debug!(key = %key, error = %e, "skipping relation key");
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::payload::encode;
    use dal_store::MemoryStore;
    use dal_test_utils::fixtures;
    use serde_json::json;

    #[test]
    fn pattern_of_hash_path() {
        let schema = fixtures::flow_schema();
        let pattern = KeyPattern::for_path(&schema, "Flow:f1", "Nodes/Node").unwrap();
        assert_eq!(pattern.literal, "Flow:f1,Nodes:");
        assert!(pattern.regex.is_match("Flow:f1,Nodes:first,Node:"));
        assert!(!pattern.regex.is_match("Flow:f1,Nodes:first,Label:"));
        assert!(!pattern.regex.is_match("Flow:f1,Nodes:a,b,Node:"));
    }

    #[test]
    fn pattern_of_value_on_key_path() {
        let schema = fixtures::node_schema();
        let pattern = KeyPattern::for_path(&schema, "Node:n1", "Template").unwrap();
        assert_eq!(pattern.literal, "Node:n1,Template:");
        let caps = pattern.regex.captures("Node:n1,Template:n2").unwrap();
        assert_eq!(&caps[1], "n2");
    }

    #[tokio::test]
    async fn discover_reads_tails_and_payloads() {
        let store = MemoryStore::new();
        store.set("Node:n1,Template:n2", Vec::new()).await.unwrap();
        store.set("Node:n1,Callback:", encode(&json!("c1"))).await.unwrap();
        store.set("Node:n1,Label:", encode(&json!("x"))).await.unwrap();

        let schema = fixtures::node_schema();
        let found = discover(&store, &schema, "Node:n1").await.unwrap();
        assert_eq!(
            found,
            vec![
                "global/Node/n2/__UNVERSIONED__",
                "global/Callback/c1/__UNVERSIONED__"
            ]
        );
    }

    #[tokio::test]
    async fn discover_skips_wrong_kinds() {
        let store = MemoryStore::new();
        store.append_sequence("Node:n1,Callback:", b"c1".to_vec()).await.unwrap();

        let schema = fixtures::node_schema();
        assert!(discover(&store, &schema, "Node:n1").await.unwrap().is_empty());
    }
}
