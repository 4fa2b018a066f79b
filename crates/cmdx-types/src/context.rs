use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::value::{Hash, Value};

/// Shared key-value store a task is invoked with.
///
/// Cloning a `Context` yields another handle to the **same** inner map, so a
/// sub-task handed the caller's context observes and makes the same writes.
/// Use [`clone_isolated`](Context::clone_isolated) for an independent copy.
#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<RwLock<Hash>>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a key.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.write().insert(key.into(), value.into());
    }

    /// Read a value by key (cloned).
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Read a value, falling back to `default` when the key is absent.
    pub fn fetch(&self, key: &str, default: impl Into<Value>) -> Value {
        self.get(key).unwrap_or_else(|| default.into())
    }

    pub fn delete(&self, key: &str) -> Option<Value> {
        self.inner.write().shift_remove(key)
    }

    /// Merge `updates` into the context. Existing keys not present in
    /// `updates` are preserved.
    pub fn merge(&self, updates: Hash) {
        self.inner.write().extend(updates);
    }

    /// Shallow copy of the current values map.
    pub fn snapshot(&self) -> Hash {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Deep copy that is fully independent of the original context.
    pub fn clone_isolated(&self) -> Context {
        Context::from(self.snapshot())
    }

    /// Whether both handles point at the same underlying store.
    pub fn same_as(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn to_json(&self) -> serde_json::Value {
        Value::Hash(self.snapshot()).to_json()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.inner.read().iter()).finish()
    }
}

impl From<Hash> for Context {
    fn from(values: Hash) -> Self {
        Self {
            inner: Arc::new(RwLock::new(values)),
        }
    }
}

/// JSON objects become the context's entries; any other JSON value yields an
/// empty context.
impl From<serde_json::Value> for Context {
    fn from(json: serde_json::Value) -> Self {
        match Value::from(json) {
            Value::Hash(map) => Context::from(map),
            _ => Context::new(),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Context
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Context::from(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect::<Hash>(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_and_get_round_trip() {
        let ctx = Context::new();
        ctx.set("key", "hello");
        assert_eq!(ctx.get("key"), Some(Value::from("hello")));
        assert!(ctx.contains_key("key"));
    }

    #[test]
    fn fetch_returns_default_when_missing() {
        let ctx = Context::new();
        assert_eq!(ctx.fetch("missing", "fallback"), Value::from("fallback"));
    }

    #[test]
    fn clones_share_state() {
        let ctx = Context::new();
        let other = ctx.clone();
        other.set("a", 1);
        assert_eq!(ctx.get("a"), Some(Value::Integer(1)));
        assert!(ctx.same_as(&other));
    }

    #[test]
    fn clone_isolated_is_independent() {
        let ctx: Context = [("a", 1)].into_iter().collect();
        let isolated = ctx.clone_isolated();
        isolated.set("a", 999);
        isolated.set("b", 2);

        assert_eq!(ctx.get("a"), Some(Value::Integer(1)));
        assert_eq!(ctx.get("b"), None);
        assert!(!ctx.same_as(&isolated));
    }

    #[test]
    fn merge_keeps_existing_keys() {
        let ctx = Context::from(json!({"keep": "old", "overwrite": "old"}));
        let mut updates = Hash::new();
        updates.insert("overwrite".into(), Value::from("new"));
        updates.insert("added".into(), Value::from("fresh"));
        ctx.merge(updates);

        assert_eq!(ctx.to_json(), json!({"keep": "old", "overwrite": "new", "added": "fresh"}));
    }

    #[test]
    fn non_object_json_yields_empty_context() {
        assert!(Context::from(json!([1, 2])).is_empty());
    }
}
