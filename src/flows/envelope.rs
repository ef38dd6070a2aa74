//! The uniform `{success, ...fields, error?}` response shape.

use serde_json::{Map, Value};

fn into_map(fields: Value) -> Map<String, Value> {
    match fields {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}

pub fn success(fields: Value) -> Value {
    let mut map = into_map(fields);
    map.insert("success".to_string(), Value::Bool(true));
    Value::Object(map)
}

pub fn failure(error: impl Into<String>) -> Value {
    failure_with(error, Value::Null)
}

pub fn failure_with(error: impl Into<String>, fields: Value) -> Value {
    let mut map = into_map(fields);
    map.insert("success".to_string(), Value::Bool(false));
    map.insert("error".to_string(), Value::String(error.into()));
    Value::Object(map)
}

pub fn is_success(envelope: &Value) -> bool {
    envelope
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
