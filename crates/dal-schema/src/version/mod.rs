//! Version-dispatched schema deserialization
//!
//! Each known definition format has its own deserializer module. Adding a
//! format means adding a variant and a module; existing ones stay untouched.

mod v1;
mod v2;

use crate::error::{SchemaError, SchemaResult};
use crate::schema::Schema;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Known schema definition formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    /// `"1.0"`: nested type-name maps with `$name` hash markers
    V1,
    /// `"2.0"`: explicit attribute descriptors
    V2,
}

impl SchemaVersion {
    /// Every supported version
    pub const ALL: [Self; 2] = [Self::V1, Self::V2];

    /// Version tag
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "1.0",
            Self::V2 => "2.0",
        }
    }

    /// Build a schema tree from a raw definition in this format
    ///
    /// # Errors
    /// [`SchemaError::InvalidDefinition`] if the definition does not match
    /// the format.
    pub fn deserialize(self, scope: &str, raw: &Value) -> SchemaResult<Schema> {
        match self {
            Self::V1 => v1::deserialize(scope, raw),
            Self::V2 => v2::deserialize(scope, raw),
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| SchemaError::UnknownVersion(s.to_string()))
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check the `_version` marker of a raw definition
fn expect_version<'a>(
    scope: &str,
    raw: &'a Value,
    version: SchemaVersion,
) -> SchemaResult<&'a serde_json::Map<String, Value>> {
    let object = raw
        .as_object()
        .ok_or_else(|| SchemaError::invalid(scope, "definition must be a JSON object"))?;

    match object.get("_version").and_then(Value::as_str) {
        Some(found) if found == version.as_str() => Ok(object),
        Some(found) => Err(SchemaError::invalid(
            scope,
            format!("expected version {version}, found {found}"),
        )),
        None => Err(SchemaError::invalid(scope, "missing version definition")),
    }
}
