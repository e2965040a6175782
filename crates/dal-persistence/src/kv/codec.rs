//! Document encode / decode against the key space

use super::discovery::discover;
use super::key::{
    delete_targets, document_prefix, is_side_key, parse_key, plan_keys, relations_key,
    scan_prefix, version_key, KeyAction,
};
use super::payload::{decode, decode_tail, encode};
use super::KvPersistence;
use crate::adapter::wrap_document;
use crate::error::{PersistenceError, PersistenceResult};
use crate::reference::{DocumentRef, DEFAULT_SCHEMA_VERSION};
use dal_schema::{PropertySchema, Schema, StorageKind};
use dal_store::KeyValueStore;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Decoded payload of a value-in-payload leaf, `None` if the key is gone
pub(crate) async fn load_payload(
    store: &dyn KeyValueStore,
    key: &str,
    property: &PropertySchema,
) -> PersistenceResult<Option<Value>> {
    match property.storage {
        StorageKind::Scalar => match store.get(key).await? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        },
        StorageKind::Map => {
            let fields = store.get_map(key).await?;
            let mut map = Map::with_capacity(fields.len());
            for (field, bytes) in fields {
                map.insert(field, decode(&bytes)?);
            }
            Ok(Some(Value::Object(map)))
        }
        StorageKind::Sequence => {
            let items = store.get_sequence(key).await?;
            let values = items
                .iter()
                .map(|bytes| decode(bytes))
                .collect::<PersistenceResult<Vec<_>>>()?;
            Ok(Some(Value::Array(values)))
        }
    }
}

fn insert_at(body: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = body;
    for segment in parents {
        let slot = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
    current.insert(last.clone(), value);
}

pub(crate) fn require_unversioned(doc: &DocumentRef, operation: &str) -> PersistenceResult<()> {
    if doc.is_unversioned() {
        Ok(())
    } else {
        Err(PersistenceError::Unsupported(format!(
            "{operation} of version '{}' on an unversioned store",
            doc.version
        )))
    }
}

impl KvPersistence {
    /// Schema version stored for the document at `prefix`
    pub(crate) async fn stored_version(&self, prefix: &str) -> PersistenceResult<Option<String>> {
        match self.store.get(&version_key(prefix)).await? {
            Some(bytes) => match decode(&bytes)? {
                Value::String(version) => Ok(Some(version)),
                other => Ok(Some(other.to_string())),
            },
            None => Ok(None),
        }
    }

    pub(crate) async fn read_document(&self, doc: &DocumentRef) -> PersistenceResult<Option<Value>> {
        require_unversioned(doc, "read")?;
        let prefix = document_prefix(&doc.scope, &doc.reference);
        let keys = self.store.scan(&scan_prefix(&prefix)).await?;
        if keys.is_empty() {
            return Ok(None);
        }

        let version = self
            .stored_version(&prefix)
            .await?
            .unwrap_or_else(|| DEFAULT_SCHEMA_VERSION.to_string());
        let schema = self.schemas.load(&doc.scope, &version)?;

        let mut body = Map::new();
        let mut leaves = 0usize;
        for key in &keys {
            if is_side_key(&prefix, key) {
                continue;
            }
            match self.decode_key(&schema, &prefix, key).await {
                Ok(Some((path, value))) => {
                    insert_at(&mut body, &path, value);
                    leaves += 1;
                }
                Ok(None) => {}
                Err(e) if e.is_decode_failure() => {
                    debug!(key = %key, error = %e, "skipping undecodable key");
                }
                Err(e) => return Err(e),
            }
        }

        debug!(doc = %doc, keys = keys.len(), leaves, "read document");
        if leaves == 0 {
            return Ok(None);
        }
        Ok(Some(wrap_document(doc, &version, Value::Object(body))))
    }

    async fn decode_key(
        &self,
        schema: &Schema,
        prefix: &str,
        key: &str,
    ) -> PersistenceResult<Option<(Vec<String>, Value)>> {
        let parsed = parse_key(schema, prefix, key)?;
        let property = schema.property(parsed.property).ok_or_else(|| {
            PersistenceError::InvalidShape(format!("key '{key}' does not end at a property"))
        })?;
        let value = if property.value_on_key {
            Some(decode_tail(property, &parsed.tail)?)
        } else {
            load_payload(self.store.as_ref(), key, property).await?
        };
        Ok(value.map(|v| (parsed.path, v)))
    }

    pub(crate) async fn write_document(
        &self,
        doc: &DocumentRef,
        schema: &Schema,
        body: &Value,
    ) -> PersistenceResult<()> {
        require_unversioned(doc, "write")?;
        super::key::check_segment(&doc.reference)?;
        let store = self.store.as_ref();
        let prefix = document_prefix(&doc.scope, &doc.reference);

        // 1. existing keys
        let existing: BTreeSet<String> = store.scan(&scan_prefix(&prefix)).await?.into_iter().collect();

        // 2. computed keys
        let plans = plan_keys(schema, &prefix, body)?;
        let mut touched = BTreeSet::new();
        for plan in &plans {
            match &plan.action {
                KeyAction::OnKey { prop_prefix, value } => {
                    let outdated: Vec<String> = existing
                        .iter()
                        .filter(|k| k.starts_with(prop_prefix.as_str()) && **k != plan.key)
                        .cloned()
                        .collect();
                    if !outdated.is_empty() {
                        store.delete(&outdated).await?;
                    }
                    store.set(&plan.key, encode(value)).await?;
                }
                KeyAction::Scalar(value) => store.set(&plan.key, encode(value)).await?,
                KeyAction::Map(fields) => {
                    store.delete(std::slice::from_ref(&plan.key)).await?;
                    for (field, value) in fields {
                        store.set_map_field(&plan.key, field, encode(value)).await?;
                    }
                }
                KeyAction::Sequence(items) => {
                    store.delete(std::slice::from_ref(&plan.key)).await?;
                    for item in items {
                        store.append_sequence(&plan.key, encode(item)).await?;
                    }
                }
            }
            touched.insert(plan.key.clone());
        }

        // 3. stale keys
        let stale: Vec<String> = existing
            .iter()
            .filter(|k| !touched.contains(*k) && !is_side_key(&prefix, k))
            .cloned()
            .collect();
        let removed = if stale.is_empty() {
            0
        } else {
            store.delete(&stale).await?
        };

        // 4. schema version
        store
            .set(&version_key(&prefix), encode(&Value::String(schema.version().into())))
            .await?;

        // 5. relation cache; readers may see fresh leaves with stale relations until here
        let relations = self.refresh_relations(schema, &prefix).await?;

        info!(
            doc = %doc,
            keys = plans.len(),
            stale = removed,
            relations,
            "wrote document"
        );
        Ok(())
    }

    /// Replace the relation cache of one document, returning its length
    pub(crate) async fn refresh_relations(
        &self,
        schema: &Schema,
        prefix: &str,
    ) -> PersistenceResult<usize> {
        let store = self.store.as_ref();
        let cache = relations_key(prefix);
        store.delete(std::slice::from_ref(&cache)).await?;
        let relations = discover(store, schema, prefix).await?;
        for relation in &relations {
            store
                .append_sequence(&cache, encode(&Value::String(relation.clone())))
                .await?;
        }
        Ok(relations.len())
    }

    pub(crate) async fn delete_document(
        &self,
        doc: &DocumentRef,
        schema: &Schema,
        partial: Option<&Value>,
    ) -> PersistenceResult<()> {
        require_unversioned(doc, "delete")?;
        let prefix = document_prefix(&doc.scope, &doc.reference);
        let existing = self.store.scan(&scan_prefix(&prefix)).await?;

        let mut targets = match partial {
            Some(partial) => delete_targets(schema, &prefix, partial, &existing)?,
            None => existing
                .iter()
                .filter(|key| parse_key(schema, &prefix, key).is_ok())
                .cloned()
                .collect(),
        };
        targets.push(version_key(&prefix));
        targets.push(relations_key(&prefix));

        let removed = self.store.delete(&targets).await?;
        info!(doc = %doc, partial = partial.is_some(), removed, "deleted document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn insert_builds_nested_objects() {
        let mut body = Map::new();
        insert_at(&mut body, &["Links".into(), "abc".into(), "From".into()], json!("x"));
        insert_at(&mut body, &["Links".into(), "abc".into(), "To".into()], json!("y"));
        insert_at(&mut body, &["Label".into()], json!("l"));
        assert_eq!(
            Value::Object(body),
            json!({"Links": {"abc": {"From": "x", "To": "y"}}, "Label": "l"})
        );
    }

    #[test]
    fn versioned_documents_are_rejected() {
        let doc = DocumentRef::new("global", "Flow", "f1", "v1");
        let err = require_unversioned(&doc, "write").unwrap_err();
        assert!(matches!(err, PersistenceError::Unsupported(_)));
        assert!(require_unversioned(&DocumentRef::global("Flow", "f1"), "write").is_ok());
    }
}
