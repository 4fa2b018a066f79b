//! Message resolution.
//!
//! Coercion and validation failures carry a dotted lookup key plus
//! interpolation arguments; the final wording comes from a
//! [`MessageResolver`]. [`EnglishMessages`] is the built-in fallback.

use std::fmt;

/// Interpolation arguments, substituted into `%{name}` placeholders.
pub type Args = Vec<(String, String)>;

pub trait MessageResolver: Send + Sync {
    fn translate(&self, key: &str, args: &[(String, String)]) -> String;
}

/// Hard-coded English message table.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishMessages;

impl EnglishMessages {
    fn template(key: &str) -> Option<&'static str> {
        let template = match key {
            "cmdx.attributes.required" => "is required",
            "cmdx.attributes.undefined" => "delegates to undefined method %{method}",
            "cmdx.coercions.into_a" => "could not coerce into a %{type}",
            "cmdx.coercions.into_an" => "could not coerce into an %{type}",
            "cmdx.coercions.into_any" => "could not coerce into any of: %{types}",
            "cmdx.coercions.unknown" => "unknown %{type} coercion type",
            "cmdx.validators.unknown" => "unknown %{type} validator type",
            "cmdx.validators.presence" => "cannot be empty",
            "cmdx.validators.format" => "is an invalid format",
            "cmdx.validators.inclusion.of" => "must be one of: %{values}",
            "cmdx.validators.inclusion.within" => "must be within %{min} and %{max}",
            "cmdx.validators.exclusion.of" => "must not be one of: %{values}",
            "cmdx.validators.exclusion.within" => "must not be within %{min} and %{max}",
            "cmdx.validators.length.is" => "length must be %{is}",
            "cmdx.validators.length.is_not" => "length must not be %{is_not}",
            "cmdx.validators.length.min" => "length must be at least %{min}",
            "cmdx.validators.length.max" => "length must be at most %{max}",
            "cmdx.validators.length.within" => "length must be within %{min} and %{max}",
            "cmdx.validators.length.not_within" => "length must not be within %{min} and %{max}",
            "cmdx.validators.length.nil_value" => "length cannot be determined for %{type}",
            "cmdx.validators.numeric.is" => "must be %{is}",
            "cmdx.validators.numeric.is_not" => "must not be %{is_not}",
            "cmdx.validators.numeric.min" => "must be at least %{min}",
            "cmdx.validators.numeric.max" => "must be at most %{max}",
            "cmdx.validators.numeric.within" => "must be within %{min} and %{max}",
            "cmdx.validators.numeric.not_within" => "must not be within %{min} and %{max}",
            "cmdx.validators.numeric.nil_value" => "must be a number",
            "cmdx.faults.invalid" => "Invalid",
            "cmdx.faults.unspecified" => "Unspecified",
            _ => return None,
        };
        Some(template)
    }
}

impl MessageResolver for EnglishMessages {
    fn translate(&self, key: &str, args: &[(String, String)]) -> String {
        match Self::template(key) {
            Some(template) => interpolate(template, args),
            None => format!("translation missing: {key}"),
        }
    }
}

/// Replace every `%{name}` placeholder with its argument. Placeholders with
/// no matching argument are left untouched.
pub fn interpolate(template: &str, args: &[(String, String)]) -> String {
    let mut out = template.to_string();
    for (name, value) in args {
        out = out.replace(&format!("%{{{name}}}"), value);
    }
    out
}

// ---------------------------------------------------------------------------
// Message: an unresolved failure message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Looked up through a resolver.
    Key { key: String, args: Args },
    /// Literal text supplied by the declaration (e.g. a validator's `message`).
    Text(String),
}

impl Message {
    pub fn key(key: impl Into<String>) -> Self {
        Message::Key {
            key: key.into(),
            args: Vec::new(),
        }
    }

    /// Add an interpolation argument.
    pub fn with(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        if let Message::Key { args, .. } = &mut self {
            args.push((name.into(), value.to_string()));
        }
        self
    }

    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(text.into())
    }

    pub fn resolve(&self, resolver: &dyn MessageResolver) -> String {
        match self {
            Message::Key { key, args } => resolver.translate(key, args),
            Message::Text(text) => text.clone(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resolve(&EnglishMessages))
    }
}
