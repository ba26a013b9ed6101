//! # Canonical Encoding
//!
//! The byte sequence that goes under an Ed25519 signature must be
//! reproducible bit-for-bit on both the signer's and the verifier's
//! machine. We get that by re-serializing through a `BTreeMap`, which
//! sorts object keys lexicographically, and `serde_json::to_string`,
//! which never inserts whitespace between tokens.
//!
//! Binary fields on [`crate::persistence::models::Message`] (nonce,
//! ciphertext) are already base64 strings by the time they reach this
//! module, so no extra encode step happens here — canonicalization only
//! has to worry about key order and whitespace.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonicalError {
    #[error("value could not be serialized to JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Serialize `value` to its canonical form: JSON object with
/// lexicographically sorted keys and no whitespace.
///
/// Recurses into nested objects and arrays so that canonicalization is
/// stable regardless of how deeply the signable fields are nested.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let raw = serde_json::to_value(value)?;
    let sorted = sort_value(raw);
    Ok(serde_json::to_string(&sorted)?)
}

fn sort_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_value(v))).collect();
            // Re-emitting through serde_json::Map preserves BTreeMap's
            // sorted iteration order because `Value::Object` is built
            // from an iterator here, not mutated in place.
            let mut out = serde_json::Map::with_capacity(sorted.len());
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_top_level_keys() {
        let value = json!({"b": 1, "a": 2, "c": 3});
        let canonical = to_canonical_json(&value).unwrap();
        assert_eq!(canonical, r#"{"a":2,"b":1,"c":3}"#);
    }

    #[test]
    fn sorts_nested_object_keys() {
        let value = json!({"outer": {"z": 1, "a": 2}});
        let canonical = to_canonical_json(&value).unwrap();
        assert_eq!(canonical, r#"{"outer":{"a":2,"z":1}}"#);
    }

    #[test]
    fn emits_no_whitespace() {
        let value = json!({"a": 1, "b": [1, 2, 3]});
        let canonical = to_canonical_json(&value).unwrap();
        assert!(!canonical.contains(' '));
        assert!(!canonical.contains('\n'));
    }

    #[test]
    fn canonical_is_idempotent() {
        // canonical(parse(canonical(x))) == canonical(x)
        let value = json!({"z": "last", "a": "first", "nested": {"y": 1, "x": 2}});
        let once = to_canonical_json(&value).unwrap();
        let reparsed: Value = serde_json::from_str(&once).unwrap();
        let twice = to_canonical_json(&reparsed).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn array_order_is_preserved() {
        // Canonicalization sorts object keys, never array element order.
        let value = json!({"items": [3, 1, 2]});
        let canonical = to_canonical_json(&value).unwrap();
        assert_eq!(canonical, r#"{"items":[3,1,2]}"#);
    }
}
