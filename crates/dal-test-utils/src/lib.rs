//! Testing utilities for the data access workspace
//!
//! Fixture schemas for three scopes and ready-made stores.
//!
//! - `Flow` (format 1.0): links, nested metadata, node and callback references
//! - `Node` (format 1.0): value-on-key template reference, ports
//! - `Callback` (format 2.0): leaf scope without relations

#![allow(missing_docs)]

pub mod fixtures {
    use dal_schema::{Schema, SchemaRegistry, StaticSource};
    use serde_json::{json, Value};
    use std::path::Path;
    use std::sync::Arc;

    pub fn flow_definition() -> Value {
        json!({
            "_version": "1.0",
            "schema": {
                "Flow": {
                    "$name": {
                        "Label": "str",
                        "Enabled": "bool",
                        "Links": { "$name": { "From": "str", "To": "str" } },
                        "Meta": { "Owner": "str", "Revision": "int" },
                        "Tags": "list",
                        "Extra": "hash",
                        "Nodes": { "$name": { "Node": "str", "Label": "str" } },
                        "Callbacks": "list"
                    }
                }
            },
            "relations": {
                "Nodes/Node": { "scope": "Node" },
                "Callbacks": "Callback"
            }
        })
    }

    pub fn node_definition() -> Value {
        json!({
            "_version": "1.0",
            "schema": {
                "Node": {
                    "$name": {
                        "Label": "str",
                        "Template": "&str",
                        "Priority": "&int",
                        "Ports": { "$name": { "Type": "str", "Value": "any" } },
                        "Callback": "str"
                    }
                }
            },
            "relations": {
                "Template": "Node",
                "Callback": { "scope": "Callback" }
            }
        })
    }

    pub fn callback_definition() -> Value {
        json!({
            "_version": "2.0",
            "attributes": {
                "Label": { "type": "str", "default": "unnamed" },
                "Code": { "type": "str" },
                "Options": { "type": "hash" }
            }
        })
    }

    /// Every fixture definition as `(scope, version, definition)`
    pub fn definitions() -> Vec<(&'static str, &'static str, Value)> {
        vec![
            ("Flow", "1.0", flow_definition()),
            ("Node", "1.0", node_definition()),
            ("Callback", "2.0", callback_definition()),
        ]
    }

    pub fn static_source() -> StaticSource {
        definitions()
            .into_iter()
            .fold(StaticSource::new(), |source, (scope, version, definition)| {
                source.with_definition(scope, version, definition)
            })
    }

    pub fn registry() -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::new(static_source()))
    }

    pub fn flow_schema() -> Arc<Schema> {
        registry().load("Flow", "1.0").unwrap()
    }

    pub fn node_schema() -> Arc<Schema> {
        registry().load("Node", "1.0").unwrap()
    }

    pub fn callback_schema() -> Arc<Schema> {
        registry().load("Callback", "2.0").unwrap()
    }

    /// Lay the fixtures out as `<dir>/<version>/<scope>.json`
    pub fn write_schema_dir(dir: &Path) {
        for (scope, version, definition) in definitions() {
            let folder = dir.join(version);
            std::fs::create_dir_all(&folder).unwrap();
            std::fs::write(
                folder.join(format!("{scope}.json")),
                serde_json::to_vec_pretty(&definition).unwrap(),
            )
            .unwrap();
        }
    }

    /// Flow body with one link, referencing `Node/n1` and `Callback/c1`
    pub fn sample_flow() -> Value {
        json!({
            "Label": "pick and place",
            "Links": { "abc": { "From": "n1/p1/out", "To": "n2/p2/in" } },
            "Meta": { "Owner": "ops", "Revision": 3 },
            "Nodes": { "first": { "Node": "n1", "Label": "gripper" } },
            "Callbacks": ["c1"]
        })
    }

    /// Node body whose template is `Node/<template>`
    pub fn sample_node(template: &str) -> Value {
        json!({
            "Label": "gripper",
            "Template": template,
            "Priority": 2,
            "Ports": { "out": { "Type": "bool", "Value": true } }
        })
    }

    pub fn sample_callback() -> Value {
        json!({ "Label": "on done", "Code": "notify()", "Options": { "retries": 3 } })
    }
}

pub mod stores {
    use dal_store::{MemoryStore, SqliteStore};
    use std::sync::Arc;

    pub fn memory_store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    pub fn sqlite_store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::in_memory().unwrap())
    }
}
