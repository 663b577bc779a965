//! Value-tree normalization.
//!
//! * [`flatten`] – nested objects become dot-path keys; arrays and scalars
//!   are leaves, and an empty object is kept as a leaf under its own key.
//! * [`with_update_mask`] – attaches field-mask paths to a request payload
//!   as `update_mask: {"paths": [...]}`.

use serde_json::{Map, Value, json};
use vsim_types::BridgeError;

/// Key under which field-mask paths are merged into a request.
pub const UPDATE_MASK_FIELD: &str = "update_mask";

/// Flatten nested objects of `value` into a single object keyed by dot paths.
///
/// A non-object `value` is returned unchanged.
///
/// ```
/// use serde_json::json;
/// use vsim_runtime::normalize::flatten;
///
/// let nested = json!({"a": {"b": 1, "c": 2}});
/// assert_eq!(flatten(&nested), json!({"a.b": 1, "a.c": 2}));
/// ```
pub fn flatten(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut flat = Map::new();
            flatten_into(&mut flat, None, fields);
            Value::Object(flat)
        }
        other => other.clone(),
    }
}

fn flatten_into(flat: &mut Map<String, Value>, prefix: Option<&str>, fields: &Map<String, Value>) {
    for (key, value) in fields {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(flat, Some(&path), inner),
            leaf => {
                flat.insert(path, leaf.clone());
            }
        }
    }
}

/// Merge `paths` into `payload` under [`UPDATE_MASK_FIELD`].
///
/// A `null` payload is treated as an empty object.
///
/// # Errors
///
/// [`BridgeError::Mapping`] when `payload` is neither an object nor `null`.
pub fn with_update_mask(payload: Value, paths: &[String]) -> Result<Value, BridgeError> {
    let mut fields = match payload {
        Value::Object(fields) => fields,
        Value::Null => Map::new(),
        other => {
            return Err(BridgeError::Mapping(format!(
                "field mask needs an object payload, got {other}"
            )));
        }
    };
    fields.insert(UPDATE_MASK_FIELD.to_string(), json!({ "paths": paths }));
    Ok(Value::Object(fields))
}
