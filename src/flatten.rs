use serde_json::{Map, Value};

/// Flattens nested objects and arrays into a single level. Keys are joined
/// with `.`; array items use their position as key.
pub fn flatten(value: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    for (key, value) in value {
        push(&mut flat, key.clone(), value);
    }
    flat
}

/// All scalar leaves of a JSON value, nulls excluded.
pub fn leaves(value: &Value) -> Vec<&Value> {
    match value {
        Value::Object(map) => map.values().flat_map(leaves).collect(),
        Value::Array(items) => items.iter().flat_map(leaves).collect(),
        Value::Null => Vec::new(),
        scalar => vec![scalar],
    }
}

fn push(flat: &mut Map<String, Value>, prefix: String, value: &Value) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, value) in map {
                push(flat, format!("{prefix}.{key}"), value);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (position, value) in items.iter().enumerate() {
                push(flat, format!("{prefix}.{position}"), value);
            }
        }
        other => {
            flat.insert(prefix, other.clone());
        }
    }
}
