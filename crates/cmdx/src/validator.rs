//! Validator trait, per-validator options, and the name → handler registry.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use cmdx_types::{CmdxError, Message, Result, Value};

use crate::condition::{Condition, Conditions};
use crate::validators;

// ---------------------------------------------------------------------------
// ValidatorOptions
// ---------------------------------------------------------------------------

/// Configuration for one validator on one attribute.
///
/// `params` holds the validator-specific keys (`in`, `with`, `min`, ...).
/// The remaining fields are honoured by the evaluator for every validator.
#[derive(Debug, Clone, Default)]
pub struct ValidatorOptions {
    params: IndexMap<String, Value>,
    allow_nil: bool,
    conditions: Conditions,
    message: Option<String>,
}

impl ValidatorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Skip the validator when the value is nil.
    pub fn allow_nil(mut self) -> Self {
        self.allow_nil = true;
        self
    }

    pub fn when(mut self, condition: impl Into<Condition>) -> Self {
        self.conditions = self.conditions.when(condition);
        self
    }

    pub fn unless(mut self, condition: impl Into<Condition>) -> Self {
        self.conditions = self.conditions.unless(condition);
        self
    }

    /// Replace the built-in failure message.
    pub fn message(mut self, text: impl Into<String>) -> Self {
        self.message = Some(text.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// First present key among aliases.
    pub fn get_any(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().find_map(|key| self.get(key))
    }

    pub fn allows_nil(&self) -> bool {
        self.allow_nil
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    /// Custom message for a rule: `<rule>_message` for the first matching
    /// rule, then the generic `message`.
    pub fn message_for(&self, rules: &[&str]) -> Option<Message> {
        rules
            .iter()
            .find_map(|rule| self.get(&format!("{rule}_message")))
            .map(|text| Message::text(text.to_string()))
            .or_else(|| self.message.clone().map(Message::text))
    }
}

// ---------------------------------------------------------------------------
// Validator trait
// ---------------------------------------------------------------------------

/// Asserts a predicate on a coerced value, failing with
/// [`CmdxError::Validation`].
pub trait Validator: Send + Sync {
    fn call(&self, value: &Value, options: &ValidatorOptions) -> Result<()>;
}

impl<F> Validator for F
where
    F: Fn(&Value, &ValidatorOptions) -> Result<()> + Send + Sync,
{
    fn call(&self, value: &Value, options: &ValidatorOptions) -> Result<()> {
        self(value, options)
    }
}

// ---------------------------------------------------------------------------
// ValidatorRegistry
// ---------------------------------------------------------------------------

/// Validator name → handler map. Cloning yields an independent mapping.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    handlers: IndexMap<String, Arc<dyn Validator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: impl Validator + 'static) -> &mut Self {
        let name = name.into();
        tracing::trace!(validator = %name, "registering validator");
        self.handlers.insert(name, Arc::new(handler));
        self
    }

    pub fn deregister(&mut self, name: &str) -> &mut Self {
        tracing::trace!(validator = %name, "deregistering validator");
        self.handlers.shift_remove(name);
        self
    }

    pub fn dup(&self) -> Self {
        self.clone()
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Run the validator registered under `name`.
    pub fn validate(&self, name: &str, value: &Value, options: &ValidatorOptions) -> Result<()> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| CmdxError::UnknownValidator(name.to_string()))?;
        handler.call(value, options)
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

/// Registry holding every built-in validator.
pub fn default_validators() -> ValidatorRegistry {
    let mut reg = ValidatorRegistry::new();
    reg.register("exclusion", validators::exclusion)
        .register("format", validators::format)
        .register("inclusion", validators::inclusion)
        .register("length", validators::length)
        .register("numeric", validators::numeric)
        .register("presence", validators::presence);
    reg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn even(value: &Value, options: &ValidatorOptions) -> Result<()> {
        match value.as_i64() {
            Some(i) if i % 2 == 0 => Ok(()),
            _ => Err(CmdxError::validation(
                "even",
                options.message_for(&[]).unwrap_or_else(|| Message::text("must be even")),
            )),
        }
    }

    #[test]
    fn default_registry_has_builtins() {
        let reg = default_validators();
        let names: Vec<&str> = reg.names().collect();
        assert_eq!(
            names,
            ["exclusion", "format", "inclusion", "length", "numeric", "presence"]
        );
    }

    #[test]
    fn custom_validator_runs() {
        let mut reg = default_validators();
        reg.register("even", even);
        assert!(reg.validate("even", &Value::Integer(4), &ValidatorOptions::new()).is_ok());

        let err = reg
            .validate("even", &Value::Integer(3), &ValidatorOptions::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "must be even");
    }

    #[test]
    fn unknown_validator_is_a_registry_error() {
        let err = ValidatorRegistry::new()
            .validate("presence", &Value::Nil, &ValidatorOptions::new())
            .unwrap_err();
        assert!(matches!(err, CmdxError::UnknownValidator(ref name) if name == "presence"));
        assert!(err.is_registry_error());
    }

    #[test]
    fn dup_is_independent() {
        let original = default_validators();
        let mut copy = original.dup();
        copy.deregister("format");
        assert!(!copy.has("format"));
        assert!(original.has("format"));
    }

    #[test]
    fn rule_message_wins_over_generic_message() {
        let opts = ValidatorOptions::new()
            .set("min_message", "too small")
            .message("bad");
        assert_eq!(opts.message_for(&["min"]), Some(Message::text("too small")));
        assert_eq!(opts.message_for(&["max"]), Some(Message::text("bad")));
        assert_eq!(ValidatorOptions::new().message_for(&["min"]), None);
    }

    #[test]
    fn aliases_resolve_in_order() {
        let opts = ValidatorOptions::new().set("within", Value::range(1, 5));
        assert_eq!(opts.get_any(&["in", "within"]), Some(&Value::range(1, 5)));
    }
}
