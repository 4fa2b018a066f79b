use std::fmt;

use indexmap::{IndexMap, IndexSet};

/// Messages collected per attribute key.
///
/// Each key holds an ordered set: a message added twice for the same key is
/// kept once, and display order follows first insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Errors {
    messages: IndexMap<String, IndexSet<String>>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.messages
            .entry(key.into())
            .or_default()
            .insert(message.into());
    }

    /// Union `other` into `self`, key by key.
    pub fn merge(&mut self, other: &Errors) {
        for (key, messages) in &other.messages {
            let entry = self.messages.entry(key.clone()).or_default();
            entry.extend(messages.iter().cloned());
        }
    }

    pub fn is_valid(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_invalid(&self) -> bool {
        !self.is_valid()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.messages.contains_key(key)
    }

    /// Messages recorded for `key`, in insertion order.
    pub fn messages_for(&self, key: &str) -> Vec<&str> {
        self.messages
            .get(key)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }

    /// Number of keys with at least one message.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Structured `key => [message, ...]` view.
    pub fn to_map(&self) -> IndexMap<String, Vec<String>> {
        self.messages
            .iter()
            .map(|(k, set)| (k.clone(), set.iter().cloned().collect()))
            .collect()
    }

    /// Messages prefixed with their key, e.g. `email is required`.
    pub fn full_messages(&self) -> IndexMap<String, Vec<String>> {
        self.messages
            .iter()
            .map(|(k, set)| (k.clone(), set.iter().map(|m| format!("{k} {m}")).collect()))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.to_map()
                .into_iter()
                .map(|(k, msgs)| (k, serde_json::Value::from(msgs)))
                .collect(),
        )
    }
}

/// Sentence form: every full message joined by `. `, with a closing period.
impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sentences: Vec<String> = self.full_messages().into_values().flatten().collect();
        if sentences.is_empty() {
            return Ok(());
        }
        write!(f, "{}.", sentences.join(". "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_messages_are_deduplicated() {
        let mut errors = Errors::new();
        errors.add("email", "is required");
        errors.add("email", "is required");
        errors.add("email", "is an invalid format");
        assert_eq!(
            errors.messages_for("email"),
            vec!["is required", "is an invalid format"]
        );
    }

    #[test]
    fn validity_tracks_emptiness() {
        let mut errors = Errors::new();
        assert!(errors.is_valid());
        errors.add("age", "must be at least 13");
        assert!(errors.is_invalid());
        errors.clear();
        assert!(errors.is_valid());
    }

    #[test]
    fn merge_unions_per_key() {
        let mut a = Errors::new();
        a.add("name", "is required");
        let mut b = Errors::new();
        b.add("name", "is required");
        b.add("name", "cannot be empty");
        b.add("age", "is required");

        a.merge(&b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.messages_for("name"), vec!["is required", "cannot be empty"]);
    }

    #[test]
    fn sentence_display() {
        let mut errors = Errors::new();
        errors.add("email", "is required");
        errors.add("age", "must be greater than 13");
        assert_eq!(
            errors.to_string(),
            "email is required. age must be greater than 13."
        );
        assert_eq!(Errors::new().to_string(), "");
    }

    #[test]
    fn json_view_keeps_insertion_order() {
        let mut errors = Errors::new();
        errors.add("b", "one");
        errors.add("a", "two");
        assert_eq!(errors.to_json(), json!({"b": ["one"], "a": ["two"]}));
        assert_eq!(errors.keys().collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
