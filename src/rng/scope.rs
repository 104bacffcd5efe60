//! Canonical scope encoding for stream derivation
//!
//! A scope is any serializable value naming *what* a draw is for, e.g.
//! `{"ward_id": 3, "org_id": 17, "day": 9}`. Two scopes that are
//! semantically equal must encode to identical bytes no matter how the
//! caller ordered the keys, so mapping keys are sorted before encoding.
//! Values that cannot be expressed in the JSON data model fail with
//! `ScopeEncoding` rather than being coerced; a silently coerced scope
//! would corrupt determinism invisibly.

use serde::Serialize;
use serde_json::Value;

use crate::core::error::{KernelError, Result};

/// Encode a scope value into canonical bytes
pub fn encode_scope(scope: &(impl Serialize + ?Sized)) -> Result<Vec<u8>> {
    let value = serde_json::to_value(scope)
        .map_err(|e| KernelError::ScopeEncoding(e.to_string()))?;
    let mut buf = Vec::new();
    encode_value(&value, &mut buf);
    Ok(buf)
}

/// Type-tagged, length-prefixed encoding
///
/// Tags keep `1`, `"1"`, and `[1]` distinct; length prefixes keep
/// concatenations unambiguous (`["ab","c"]` vs `["a","bc"]`).
fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Null => buf.push(b'n'),
        Value::Bool(b) => {
            buf.push(b'b');
            buf.push(*b as u8);
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                buf.push(b'i');
                buf.extend_from_slice(&i.to_le_bytes());
            } else if let Some(u) = n.as_u64() {
                buf.push(b'u');
                buf.extend_from_slice(&u.to_le_bytes());
            } else {
                // serde_json numbers are finite by construction
                let f = n.as_f64().unwrap_or(0.0);
                buf.push(b'f');
                buf.extend_from_slice(&f.to_bits().to_le_bytes());
            }
        }
        Value::String(s) => {
            buf.push(b's');
            buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(items) => {
            buf.push(b'a');
            buf.extend_from_slice(&(items.len() as u64).to_le_bytes());
            for item in items {
                encode_value(item, buf);
            }
        }
        Value::Object(map) => {
            buf.push(b'o');
            buf.extend_from_slice(&(map.len() as u64).to_le_bytes());
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                buf.extend_from_slice(&(key.len() as u64).to_le_bytes());
                buf.extend_from_slice(key.as_bytes());
                encode_value(&map[key], buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_affect_encoding() {
        let a = json!({"ward_id": 3, "org_id": 17, "day": 9});
        let b = json!({"day": 9, "ward_id": 3, "org_id": 17});
        assert_eq!(encode_scope(&a).unwrap(), encode_scope(&b).unwrap());
    }

    #[test]
    fn test_different_scopes_encode_differently() {
        let a = json!({"ward_id": 3});
        let b = json!({"ward_id": 4});
        assert_ne!(encode_scope(&a).unwrap(), encode_scope(&b).unwrap());
    }

    #[test]
    fn test_type_tags_keep_values_distinct() {
        assert_ne!(
            encode_scope(&json!(1)).unwrap(),
            encode_scope(&json!("1")).unwrap()
        );
        assert_ne!(
            encode_scope(&json!([1])).unwrap(),
            encode_scope(&json!(1)).unwrap()
        );
    }

    #[test]
    fn test_nested_scopes_are_canonical() {
        let a = json!({"outer": {"b": 2, "a": 1}, "list": [1, 2]});
        let b = json!({"list": [1, 2], "outer": {"a": 1, "b": 2}});
        assert_eq!(encode_scope(&a).unwrap(), encode_scope(&b).unwrap());
    }

    #[test]
    fn test_unencodable_scope_fails_fast() {
        use std::collections::HashMap;
        // tuple keys have no JSON representation
        let mut scope: HashMap<(u32, u32), u32> = HashMap::new();
        scope.insert((1, 2), 3);
        let err = encode_scope(&scope).unwrap_err();
        assert!(matches!(err, KernelError::ScopeEncoding(_)));
    }

    #[test]
    fn test_plain_values_are_accepted() {
        assert!(encode_scope("labor-district").is_ok());
        assert!(encode_scope(&42u64).is_ok());
        assert!(encode_scope(&vec![1, 2, 3]).is_ok());
    }
}
