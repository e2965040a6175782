//! Transitive relation walks

use crate::adapter::RelationSource;
use crate::error::PersistenceResult;
use crate::reference::{DocumentRef, PathDefaults};
use dal_schema::{Schema, SchemaEntry};
use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use tracing::debug;

/// Bounds of a relation walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationQuery {
    /// Levels to follow; `0` and `1` both mean direct relations only
    pub depth: u32,
    /// Target scopes to include and follow; `None` admits all
    ///
    /// The walk does not pass through filtered-out documents: with
    /// `["Callback"]`, a Callback reachable only through a Node is not found.
    pub filter: Option<BTreeSet<String>>,
}

impl RelationQuery {
    /// Direct relations, no filter
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow up to `depth` levels
    #[must_use]
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Restrict to target scopes
    #[must_use]
    pub fn with_filter<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Whether a related document passes the filter
    #[must_use]
    pub fn allows(&self, doc: &DocumentRef) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |scopes| scopes.contains(&doc.scope))
    }
}

/// Collect relations of `root` breadth first
///
/// Documents reached at level `n` are expanded while `n < depth`. Every
/// document is expanded at most once, so cyclic graphs terminate. The root
/// itself is never part of the result.
pub async fn collect_relations(
    source: &dyn RelationSource,
    root: &DocumentRef,
    query: &RelationQuery,
) -> PersistenceResult<BTreeSet<String>> {
    let mut found = BTreeSet::new();
    let mut visited = BTreeSet::from([root.to_string()]);
    let mut queue = VecDeque::from([(root.clone(), 1u32)]);

    while let Some((doc, level)) = queue.pop_front() {
        for raw in source.direct_relations(&doc).await? {
            let Ok(target) = DocumentRef::parse(&raw) else {
                debug!(relation = %raw, from = %doc, "skipping unparsable relation");
                continue;
            };
            if !query.allows(&target) {
                continue;
            }
            let key = target.to_string();
            if key != root.to_string() {
                found.insert(key.clone());
            }
            if level < query.depth && visited.insert(key) {
                queue.push_back((target, level + 1));
            }
        }
    }

    Ok(found)
}

/// Relations held by an in-memory attribute map
///
/// Walks each declared relation path through objects and hashes. String
/// values and arrays of strings are resolved with the relation's scope as
/// the default; anything else is ignored.
#[must_use]
pub fn relations_from_body(schema: &Schema, body: &Value) -> Vec<String> {
    let mut out = Vec::new();
    for relation in schema.relations() {
        let segments: Vec<&str> = relation.path.split('/').filter(|s| !s.is_empty()).collect();
        let defaults = PathDefaults::new().with_scope(&relation.scope);
        let mut values = Vec::new();
        collect_at_path(schema, schema.document(), body, &segments, &mut values);
        for value in values {
            push_references(value, &defaults, &mut out);
        }
    }
    out
}

fn collect_at_path<'a>(
    schema: &Schema,
    node: dal_tree::NodeId,
    value: &'a Value,
    segments: &[&str],
    out: &mut Vec<&'a Value>,
) {
    let Some((first, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    let Ok(child) = schema.resolve_child(node, first) else {
        return;
    };
    let Some(inner) = value.get(*first) else {
        return;
    };
    match schema.entry(child) {
        Some(SchemaEntry::Object(object)) if object.is_hash => {
            if let Some(map) = inner.as_object() {
                for element in map.values() {
                    collect_at_path(schema, child, element, rest, out);
                }
            }
        }
        _ => collect_at_path(schema, child, inner, rest, out),
    }
}

/// Resolve a relation value into formatted references
pub(crate) fn push_references(value: &Value, defaults: &PathDefaults, out: &mut Vec<String>) {
    let candidates: Vec<&str> = match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    for candidate in candidates {
        match DocumentRef::parse_with(candidate, defaults) {
            Ok(reference) => out.push(reference.to_string()),
            Err(e) => debug!(value = candidate, error = %e, "skipping relation value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct Graph(HashMap<String, Vec<String>>);

    #[async_trait]
    impl RelationSource for Graph {
        async fn direct_relations(&self, doc: &DocumentRef) -> PersistenceResult<Vec<String>> {
            Ok(self.0.get(&doc.to_string()).cloned().unwrap_or_default())
        }
    }

    fn graph() -> Graph {
        let edge = |from: &str, to: &[&str]| {
            (
                format!("global/{from}/__UNVERSIONED__"),
                to.iter()
                    .map(|t| format!("global/{t}/__UNVERSIONED__"))
                    .collect(),
            )
        };
        Graph(HashMap::from([
            edge("Flow/f1", &["Node/n1", "Callback/c1"]),
            edge("Node/n1", &["Node/n2", "Flow/f1"]),
            edge("Node/n2", &["Node/n3"]),
        ]))
    }

    #[tokio::test]
    async fn depth_bounds_the_walk() {
        let g = graph();
        let root = DocumentRef::global("Flow", "f1");

        let direct = collect_relations(&g, &root, &RelationQuery::new()).await.unwrap();
        assert_eq!(direct.len(), 2);

        let same = collect_relations(&g, &root, &RelationQuery::new().with_depth(1))
            .await
            .unwrap();
        assert_eq!(same, direct);

        let two = collect_relations(&g, &root, &RelationQuery::new().with_depth(2))
            .await
            .unwrap();
        assert!(two.contains("global/Node/n2/__UNVERSIONED__"));
        assert!(!two.contains("global/Node/n3/__UNVERSIONED__"));
        assert!(!two.contains("global/Flow/f1/__UNVERSIONED__"));
    }

    #[tokio::test]
    async fn cycles_terminate() {
        let g = graph();
        let root = DocumentRef::global("Flow", "f1");
        let all = collect_relations(&g, &root, &RelationQuery::new().with_depth(99))
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn filter_limits_included_and_followed() {
        let g = graph();
        let root = DocumentRef::global("Flow", "f1");
        let query = RelationQuery::new().with_depth(5).with_filter(["Callback"]);
        let found = collect_relations(&g, &root, &query).await.unwrap();
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["global/Callback/c1/__UNVERSIONED__"]
        );
    }

    #[test]
    fn references_from_strings_and_arrays() {
        let defaults = PathDefaults::new().with_scope("Node");
        let mut out = Vec::new();
        push_references(&serde_json::json!(["n1", 3, "bad,ref"]), &defaults, &mut out);
        push_references(&serde_json::json!("n2"), &defaults, &mut out);
        assert_eq!(
            out,
            vec![
                "global/Node/n1/__UNVERSIONED__",
                "global/Node/n2/__UNVERSIONED__"
            ]
        );
    }
}
