use once_cell::sync::Lazy;
use regex::Regex;

use cmdx_types::{Result, Value};

use super::failure;
use crate::coercion::CoercionOptions;

static FALSEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(false|f|no|n|0)$").unwrap());
static TRUTHY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(true|t|yes|y|1)$").unwrap());

/// Strict textual boolean: anything outside the two word lists is rejected.
pub fn boolean(value: &Value, _options: &CoercionOptions) -> Result<Value> {
    let text = value.to_string();
    if FALSEY.is_match(&text) {
        Ok(Value::Bool(false))
    } else if TRUTHY.is_match(&text) {
        Ok(Value::Bool(true))
    } else {
        Err(failure("boolean"))
    }
}

pub fn string(value: &Value, _options: &CoercionOptions) -> Result<Value> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Object(_) => Err(failure("string")),
        other => Ok(Value::String(other.to_string())),
    }
}

pub fn symbol(value: &Value, _options: &CoercionOptions) -> Result<Value> {
    match value {
        Value::Symbol(_) => Ok(value.clone()),
        Value::String(s) => Ok(Value::Symbol(s.clone())),
        _ => Err(failure("symbol")),
    }
}

/// Identity; always succeeds.
pub fn virtual_(value: &Value, _options: &CoercionOptions) -> Result<Value> {
    Ok(value.clone())
}
