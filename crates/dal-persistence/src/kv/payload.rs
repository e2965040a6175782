//! Leaf value encoding
//!
//! Strings are stored as raw UTF-8. Any other JSON value is stored as the
//! marker byte `0xFF` followed by its JSON text; `0xFF` never occurs in
//! valid UTF-8, so the two forms cannot collide.

use crate::error::{PersistenceError, PersistenceResult};
use dal_schema::{PropertySchema, ValueType};
use serde_json::Value;

const JSON_MARKER: u8 = 0xFF;

/// Encode a leaf value as a payload
#[must_use]
pub fn encode(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.as_bytes().to_vec(),
        other => {
            let text = other.to_string();
            let mut bytes = Vec::with_capacity(text.len() + 1);
            bytes.push(JSON_MARKER);
            bytes.extend_from_slice(text.as_bytes());
            bytes
        }
    }
}

/// Decode a payload produced by [`encode`]
///
/// # Errors
/// [`PersistenceError::InvalidShape`] for bytes that are neither marked JSON
/// nor UTF-8.
pub fn decode(bytes: &[u8]) -> PersistenceResult<Value> {
    match bytes.split_first() {
        Some((&JSON_MARKER, json)) => serde_json::from_slice(json)
            .map_err(|e| PersistenceError::InvalidShape(format!("marked payload: {e}"))),
        _ => std::str::from_utf8(bytes)
            .map(|s| Value::String(s.to_string()))
            .map_err(|e| PersistenceError::InvalidShape(format!("payload is not UTF-8: {e}"))),
    }
}

/// Text appended to a value-on-key property key
#[must_use]
pub fn render_tail(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Value of a value-on-key property from its key tail
///
/// # Errors
/// [`PersistenceError::InvalidShape`] if a typed tail is not valid JSON.
pub fn decode_tail(property: &PropertySchema, tail: &str) -> PersistenceResult<Value> {
    match property.value_type {
        ValueType::Str | ValueType::Any => Ok(Value::String(tail.to_string())),
        other => serde_json::from_str(tail).map_err(|e| {
            PersistenceError::InvalidShape(format!(
                "key tail '{tail}' is not a {}: {e}",
                other.as_str()
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_are_raw() {
        assert_eq!(encode(&json!("n1/p1")), b"n1/p1".to_vec());
        assert_eq!(decode(b"n1/p1").unwrap(), json!("n1/p1"));
    }

    #[test]
    fn other_values_are_marked_json() {
        for value in [json!(1), json!(2.5), json!(true), json!(null), json!({"a": [1]})] {
            let bytes = encode(&value);
            assert_eq!(bytes[0], JSON_MARKER);
            assert_eq!(decode(&bytes).unwrap(), value);
        }
        // A string that looks like JSON stays a string
        assert_eq!(decode(&encode(&json!("42"))).unwrap(), json!("42"));
    }

    #[test]
    fn undecodable_bytes_are_invalid_shape() {
        assert!(decode(&[0xC3, 0x28]).unwrap_err().is_decode_failure());
        assert!(decode(&[JSON_MARKER, b'{']).unwrap_err().is_decode_failure());
    }

    #[test]
    fn tails_decode_by_type() {
        let int = PropertySchema::new(ValueType::Int).with_value_on_key(true);
        let text = PropertySchema::new(ValueType::Str).with_value_on_key(true);
        assert_eq!(decode_tail(&int, "42").unwrap(), json!(42));
        assert_eq!(decode_tail(&text, "42").unwrap(), json!("42"));
        assert!(decode_tail(&int, "x").is_err());
        assert_eq!(render_tail(&json!(42)), "42");
        assert_eq!(render_tail(&json!("a,b")), "a,b");
    }
}
