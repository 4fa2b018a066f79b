//! Coercion trait and the name → handler registry.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use cmdx_types::{CmdxError, Result, Value};

use crate::coercions;

// ---------------------------------------------------------------------------
// Coercion trait
// ---------------------------------------------------------------------------

/// Options a declaration passes through to its coercions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoercionOptions {
    /// Exact `strptime`-style format for date/datetime/time parsing.
    pub format: Option<String>,
    /// Significant digits for big decimal conversion of floats and rationals.
    pub precision: Option<usize>,
}

/// Converts a raw value into a target type, or fails with
/// [`CmdxError::Coercion`].
pub trait Coercion: Send + Sync {
    fn call(&self, value: &Value, options: &CoercionOptions) -> Result<Value>;
}

impl<F> Coercion for F
where
    F: Fn(&Value, &CoercionOptions) -> Result<Value> + Send + Sync,
{
    fn call(&self, value: &Value, options: &CoercionOptions) -> Result<Value> {
        self(value, options)
    }
}

// ---------------------------------------------------------------------------
// CoercionRegistry
// ---------------------------------------------------------------------------

/// Type tag → coercion map.
///
/// Cloning produces an independent registry: handlers are shared, the
/// mapping is not, so registering on a copy never touches the original.
#[derive(Clone, Default)]
pub struct CoercionRegistry {
    handlers: IndexMap<String, Arc<dyn Coercion>>,
}

impl CoercionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `name`.
    pub fn register(&mut self, name: impl Into<String>, handler: impl Coercion + 'static) -> &mut Self {
        let name = name.into();
        tracing::trace!(coercion = %name, "registering coercion");
        self.handlers.insert(name, Arc::new(handler));
        self
    }

    pub fn deregister(&mut self, name: &str) -> &mut Self {
        tracing::trace!(coercion = %name, "deregistering coercion");
        self.handlers.shift_remove(name);
        self
    }

    /// Independent copy of this registry.
    pub fn dup(&self) -> Self {
        self.clone()
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Coerce `value` with the handler registered under `name`.
    ///
    /// An unregistered name yields [`CmdxError::UnknownCoercion`], which is
    /// distinct from the handler rejecting the value.
    pub fn coerce(&self, name: &str, value: &Value, options: &CoercionOptions) -> Result<Value> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| CmdxError::UnknownCoercion(name.to_string()))?;
        handler.call(value, options)
    }
}

impl fmt::Debug for CoercionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

// ---------------------------------------------------------------------------
// Default registry factory
// ---------------------------------------------------------------------------

/// Registry holding every built-in coercion.
pub fn default_coercions() -> CoercionRegistry {
    let mut reg = CoercionRegistry::new();
    reg.register("array", coercions::array)
        .register("big_decimal", coercions::big_decimal)
        .register("boolean", coercions::boolean)
        .register("complex", coercions::complex)
        .register("date", coercions::date)
        .register("datetime", coercions::datetime)
        .register("float", coercions::float)
        .register("hash", coercions::hash)
        .register("integer", coercions::integer)
        .register("rational", coercions::rational)
        .register("string", coercions::string)
        .register("symbol", coercions::symbol)
        .register("time", coercions::time)
        .register("virtual", coercions::virtual_);
    reg
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cmdx_types::Message;

    fn money(value: &Value, _options: &CoercionOptions) -> Result<Value> {
        match value.as_str().and_then(|s| s.strip_prefix('$')) {
            Some(amount) => Ok(Value::Decimal(amount.to_string())),
            None => Err(CmdxError::coercion(
                "money",
                Message::key("cmdx.coercions.into_a").with("type", "money"),
            )),
        }
    }

    #[test]
    fn default_registry_has_builtins() {
        let reg = default_coercions();
        for name in [
            "array", "big_decimal", "boolean", "complex", "date", "datetime", "float", "hash",
            "integer", "rational", "string", "symbol", "time", "virtual",
        ] {
            assert!(reg.has(name), "missing {name}");
        }
        assert!(!CoercionRegistry::new().has("integer"));
    }

    #[test]
    fn register_custom_coercion() {
        let mut reg = default_coercions();
        reg.register("money", money);
        let out = reg
            .coerce("money", &Value::from("$12.50"), &CoercionOptions::default())
            .unwrap();
        assert_eq!(out, Value::Decimal("12.50".into()));
    }

    #[test]
    fn deregistered_name_is_unknown_not_a_failure() {
        let mut reg = default_coercions();
        reg.deregister("integer");
        let err = reg
            .coerce("integer", &Value::from("1"), &CoercionOptions::default())
            .unwrap_err();
        assert!(matches!(err, CmdxError::UnknownCoercion(ref name) if name == "integer"));
        assert!(err.is_registry_error());
    }

    #[test]
    fn dup_is_independent() {
        let original = default_coercions();
        let mut copy = original.dup();
        copy.register("money", money).deregister("float");

        assert!(copy.has("money"));
        assert!(!copy.has("float"));
        assert!(!original.has("money"));
        assert!(original.has("float"));
    }

    #[test]
    fn register_overwrites_existing_handler() {
        let mut reg = default_coercions();
        reg.register("string", |_: &Value, _: &CoercionOptions| -> Result<Value> {
            Ok(Value::from("fixed"))
        });
        let out = reg
            .coerce("string", &Value::Integer(5), &CoercionOptions::default())
            .unwrap();
        assert_eq!(out, Value::from("fixed"));
    }
}
