use std::collections::HashMap;

use serde_json::{Map, Value};

/// Flattens JSON metadata sent by the SDK bridges into snapshot metadata.
/// Returns `None` for an empty map.
pub fn metadata_from_json(map: Map<String, Value>) -> Option<HashMap<String, String>> {
    let metadata: HashMap<String, String> = map
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (sanitize(k), value_to_string(v)))
        .collect();
    (!metadata.is_empty()).then_some(metadata)
}

/// Convert arbitrary JSON values into sanitized strings.
pub fn value_to_string(value: Value) -> String {
    let raw = match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    sanitize(raw)
}

fn sanitize(s: String) -> String {
    s.chars().filter(|c| !c.is_control()).collect()
}
