//! Small JSON helpers shared by the engine and session manager.
//!
//! Payloads flowing through the graph are JSON objects that accumulate
//! fields as they pass each node (availability, credentials, routing
//! decisions). [`merge_fields`] implements that accumulation without
//! clobbering non-object payloads.

use serde_json::{Map, Value};

/// Merge `fields` into `payload`, returning the combined object.
///
/// Non-object payloads are wrapped under `"value"` first so field
/// attachment never loses the original data. Right-hand fields win on key
/// collision.
pub fn merge_fields(payload: Value, fields: impl IntoIterator<Item = (String, Value)>) -> Value {
    let mut map = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    for (key, value) in fields {
        map.insert(key, value);
    }
    Value::Object(map)
}

/// Fetch a string field from a JSON object, if present.
pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}
