use cmdx_types::{Hash, Result, Value};

use super::failure;
use crate::coercion::CoercionOptions;

fn parse_json(text: &str, type_name: &str) -> Result<Value> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .map_err(|err| {
            tracing::debug!(error = %err, coercion = type_name, "json parse failed");
            failure(type_name)
        })
}

/// JSON text starting with `[` is parsed; everything else is wrapped.
pub fn array(value: &Value, _options: &CoercionOptions) -> Result<Value> {
    match value {
        Value::String(s) if s.starts_with('[') => match parse_json(s, "array")? {
            parsed @ Value::Array(_) => Ok(parsed),
            _ => Err(failure("array")),
        },
        Value::Nil => Ok(Value::Array(Vec::new())),
        Value::Array(_) => Ok(value.clone()),
        Value::Hash(map) => Ok(Value::Array(
            map.iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                .collect(),
        )),
        other => Ok(Value::Array(vec![other.clone()])),
    }
}

/// Accepts hashes, pair lists, flat even-length arrays, and JSON object
/// text.
pub fn hash(value: &Value, _options: &CoercionOptions) -> Result<Value> {
    match value {
        Value::Hash(_) => Ok(value.clone()),
        Value::Nil => Ok(Value::Hash(Hash::new())),
        Value::String(s) if s.starts_with('{') => match parse_json(s, "hash")? {
            parsed @ Value::Hash(_) => Ok(parsed),
            _ => Err(failure("hash")),
        },
        Value::Array(items) => pairs(items).map(Value::Hash).ok_or_else(|| failure("hash")),
        _ => Err(failure("hash")),
    }
}

fn pairs(items: &[Value]) -> Option<Hash> {
    let all_pairs = items
        .iter()
        .all(|item| item.as_array().is_some_and(|pair| pair.len() == 2));
    if all_pairs && !items.is_empty() {
        return Some(
            items
                .iter()
                .filter_map(Value::as_array)
                .map(|pair| (pair[0].to_string(), pair[1].clone()))
                .collect(),
        );
    }
    if items.len() % 2 != 0 {
        return None;
    }
    Some(
        items
            .chunks(2)
            .map(|chunk| (chunk[0].to_string(), chunk[1].clone()))
            .collect(),
    )
}
