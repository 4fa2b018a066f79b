use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

use cmdx_types::{CmdxError, Message, Result, Value};

use crate::validator::ValidatorOptions;

static PATTERNS: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn is_match(pattern: &Value, text: &str) -> Result<bool> {
    let source = pattern.as_str().ok_or_else(|| {
        CmdxError::Argument(format!("format pattern must be text, got {}", pattern.type_name()))
    })?;
    let mut cache = PATTERNS.lock();
    if let Some(regex) = cache.get(source) {
        return Ok(regex.is_match(text));
    }
    let regex = Regex::new(source)
        .map_err(|err| CmdxError::Argument(format!("invalid format pattern '{source}': {err}")))?;
    let matched = regex.is_match(text);
    cache.insert(source.to_string(), regex);
    Ok(matched)
}

/// `with` must match and `without` must not. Only text is checked; any
/// other value fails.
pub fn format(value: &Value, options: &ValidatorOptions) -> Result<()> {
    let with = options.get("with");
    let without = options.get("without");
    if with.is_none() && without.is_none() {
        return Err(CmdxError::Argument(
            "format validator requires a 'with' or 'without' pattern".into(),
        ));
    }

    let valid = match value.as_str() {
        Some(text) => {
            let matches_with = match with {
                Some(pattern) => is_match(pattern, text)?,
                None => true,
            };
            let matches_without = match without {
                Some(pattern) => is_match(pattern, text)?,
                None => false,
            };
            matches_with && !matches_without
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        let message = options
            .message_for(&[])
            .unwrap_or_else(|| Message::key("cmdx.validators.format"));
        Err(CmdxError::validation("format", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMAIL: &str = r"\A[^@\s]+@[^@\s]+\z";

    #[test]
    fn with_pattern() {
        let opts = ValidatorOptions::new().set("with", EMAIL);
        assert!(format(&Value::from("a@b.io"), &opts).is_ok());
        let err = format(&Value::from("nope"), &opts).unwrap_err();
        assert_eq!(err.to_string(), "is an invalid format");
    }

    #[test]
    fn without_pattern() {
        let opts = ValidatorOptions::new().set("without", r"\d");
        assert!(format(&Value::from("abc"), &opts).is_ok());
        assert!(format(&Value::from("a1c"), &opts).is_err());
    }

    #[test]
    fn both_patterns_must_hold() {
        let opts = ValidatorOptions::new()
            .set("with", r"^[a-z]+$")
            .set("without", r"^admin$");
        assert!(format(&Value::from("guest"), &opts).is_ok());
        assert!(format(&Value::from("admin"), &opts).is_err());
    }

    #[test]
    fn non_text_fails() {
        let opts = ValidatorOptions::new().set("with", ".*");
        assert!(format(&Value::Integer(5), &opts).is_err());
    }

    #[test]
    fn invalid_pattern_is_an_argument_error() {
        let opts = ValidatorOptions::new().set("with", "(");
        let err = format(&Value::from("x"), &opts).unwrap_err();
        assert!(matches!(err, CmdxError::Argument(_)));
    }
}
