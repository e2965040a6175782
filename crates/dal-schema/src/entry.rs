//! Schema node payloads
//!
//! Schema nodes carry type descriptions, not data.

use dal_tree::NodeKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Expected runtime type of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// UTF-8 text
    Str,
    /// Boolean
    Bool,
    /// Integer
    Int,
    /// Any JSON number
    Float,
    /// Name-keyed map
    Hash,
    /// Ordered sequence
    List,
    /// Anything, including null
    Any,
}

impl ValueType {
    /// Parse a definition type name
    ///
    /// Unknown names fall back to [`ValueType::Str`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "bool" => Self::Bool,
            "int" => Self::Int,
            "float" => Self::Float,
            "hash" | "dict" => Self::Hash,
            "list" | "array" => Self::List,
            "any" | "object" => Self::Any,
            _ => Self::Str,
        }
    }

    /// Definition type name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Hash => "hash",
            Self::List => "list",
            Self::Any => "any",
        }
    }

    /// Value a freshly materialized property starts with
    #[must_use]
    pub fn default_value(self) -> Value {
        match self {
            Self::Str => Value::String(String::new()),
            Self::Bool => Value::Bool(false),
            Self::Int => Value::from(0),
            Self::Float => Value::from(0.0),
            Self::Hash => Value::Object(serde_json::Map::new()),
            Self::List => Value::Array(Vec::new()),
            Self::Any => Value::Null,
        }
    }

    /// Whether a runtime value matches this type
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Str => value.is_string(),
            Self::Bool => value.is_boolean(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Hash => value.is_object(),
            Self::List => value.is_array(),
            Self::Any => true,
        }
    }

    /// Physical payload kind used by key-value stores
    #[must_use]
    pub fn storage(self) -> StorageKind {
        match self {
            Self::Hash => StorageKind::Map,
            Self::List => StorageKind::Sequence,
            _ => StorageKind::Scalar,
        }
    }
}

/// Physical payload kind of a value-in-payload leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Single value
    Scalar,
    /// Field map
    Map,
    /// Ordered list
    Sequence,
}

/// Object attribute description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectSchema {
    /// Zero-or-more same-shaped children keyed by name
    pub is_hash: bool,
    /// Child names are part of the key
    pub value_on_key: bool,
}

/// Leaf attribute description
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySchema {
    /// Expected runtime type
    pub value_type: ValueType,
    /// Value used on first materialization
    pub default: Value,
    /// Value stored as the key tail instead of a payload
    pub value_on_key: bool,
    /// Payload kind when not stored on the key
    pub storage: StorageKind,
}

impl PropertySchema {
    /// Property with the type's default value and storage
    #[must_use]
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            default: value_type.default_value(),
            value_on_key: false,
            storage: value_type.storage(),
        }
    }

    /// Mark value as encoded in the key
    #[must_use]
    pub fn with_value_on_key(mut self, value_on_key: bool) -> Self {
        self.value_on_key = value_on_key;
        self
    }

    /// Override the default value
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }
}

/// Payload of a schema tree node
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaEntry {
    /// Root of one `(scope, version)` definition
    Root {
        /// Scope name
        scope: String,
    },
    /// Object or hash attribute
    Object(ObjectSchema),
    /// Leaf attribute
    Property(PropertySchema),
}

impl SchemaEntry {
    /// Property description, if this is a leaf
    #[inline]
    #[must_use]
    pub fn as_property(&self) -> Option<&PropertySchema> {
        match self {
            Self::Property(p) => Some(p),
            _ => None,
        }
    }

    /// Object description, if this is an object
    #[inline]
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl NodeKind for SchemaEntry {
    fn node_type(&self) -> &'static str {
        match self {
            Self::Root { .. } => "schema",
            Self::Object(_) => "schema_object",
            Self::Property(_) => "schema_property",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn value_type_defaults() {
        assert_eq!(ValueType::Str.default_value(), json!(""));
        assert_eq!(ValueType::Bool.default_value(), json!(false));
        assert_eq!(ValueType::Float.default_value(), json!(0.0));
        assert_eq!(ValueType::Hash.default_value(), json!({}));
        assert_eq!(ValueType::Any.default_value(), Value::Null);
    }

    #[test]
    fn value_type_accepts() {
        assert!(ValueType::Str.accepts(&json!("x")));
        assert!(!ValueType::Str.accepts(&json!(1)));
        assert!(ValueType::Float.accepts(&json!(1)));
        assert!(!ValueType::Int.accepts(&json!(1.5)));
        assert!(ValueType::Any.accepts(&Value::Null));
        assert!(ValueType::Hash.accepts(&json!({"a": 1})));
    }

    #[test]
    fn unknown_type_name_is_str() {
        assert_eq!(ValueType::from_name("whatever"), ValueType::Str);
        assert_eq!(ValueType::from_name("hash").storage(), StorageKind::Map);
        assert_eq!(ValueType::from_name("list").storage(), StorageKind::Sequence);
    }
}
