//! `if`/`unless` gates.
//!
//! A gate is built from up to two [`Condition`]s and evaluates to a single
//! boolean against a task:
//! ```text
//! if + unless   => if && !unless
//! if            => if
//! unless        => !unless
//! neither       => default (true unless overridden)
//! ```

use std::fmt;
use std::sync::Arc;

use cmdx_types::Result;

use crate::task::Task;

pub type Predicate = Arc<dyn Fn(&Task) -> bool + Send + Sync>;

/// One side of a gate.
#[derive(Clone)]
pub enum Condition {
    /// Sent as a message to the task; the answer's truthiness is used.
    Method(String),
    /// Invoked with the task.
    Callable(Predicate),
    Literal(bool),
}

impl Condition {
    pub fn method(name: impl Into<String>) -> Self {
        Condition::Method(name.into())
    }

    pub fn callable(f: impl Fn(&Task) -> bool + Send + Sync + 'static) -> Self {
        Condition::Callable(Arc::new(f))
    }

    fn is_true(&self, task: &Task) -> Result<bool> {
        match self {
            Condition::Method(name) => Ok(task.send(name)?.is_truthy()),
            Condition::Callable(f) => Ok(f(task)),
            Condition::Literal(b) => Ok(*b),
        }
    }
}

impl From<bool> for Condition {
    fn from(b: bool) -> Self {
        Condition::Literal(b)
    }
}

impl From<&str> for Condition {
    fn from(name: &str) -> Self {
        Condition::Method(name.to_owned())
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Method(name) => write!(f, "Method({name})"),
            Condition::Callable(_) => f.write_str("Callable"),
            Condition::Literal(b) => write!(f, "Literal({b})"),
        }
    }
}

/// The `if`/`unless`/`default` options of a gated feature.
#[derive(Clone, Debug, Default)]
pub struct Conditions {
    pub when: Option<Condition>,
    pub unless: Option<Condition>,
    pub default: Option<bool>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, condition: impl Into<Condition>) -> Self {
        self.when = Some(condition.into());
        self
    }

    pub fn unless(mut self, condition: impl Into<Condition>) -> Self {
        self.unless = Some(condition.into());
        self
    }

    pub fn default_to(mut self, default: bool) -> Self {
        self.default = Some(default);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.when.is_none() && self.unless.is_none()
    }
}

/// Evaluate a gate against `task`.
///
/// Fails only when a method condition names something the task does not
/// respond to.
pub fn evaluate(task: &Task, conditions: &Conditions) -> Result<bool> {
    match (&conditions.when, &conditions.unless) {
        (Some(when), Some(unless)) => Ok(when.is_true(task)? && !unless.is_true(task)?),
        (Some(when), None) => when.is_true(task),
        (None, Some(unless)) => Ok(!unless.is_true(task)?),
        (None, None) => Ok(conditions.default.unwrap_or(true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::with_task;
    use cmdx_types::{CmdxError, Value};

    #[test]
    fn neither_side_passes_by_default() {
        with_task(|task| {
            assert!(evaluate(task, &Conditions::new()).unwrap());
            assert!(!evaluate(task, &Conditions::new().default_to(false)).unwrap());
        });
    }

    #[test]
    fn if_alone_uses_truthiness() {
        with_task(|task| {
            assert!(evaluate(task, &Conditions::new().when(true)).unwrap());
            assert!(!evaluate(task, &Conditions::new().when(false)).unwrap());
        });
    }

    #[test]
    fn unless_alone_negates() {
        with_task(|task| {
            assert!(!evaluate(task, &Conditions::new().unless(true)).unwrap());
            assert!(evaluate(task, &Conditions::new().unless(false)).unwrap());
        });
    }

    #[test]
    fn both_sides_use_and_semantics() {
        with_task(|task| {
            let yes = Condition::callable(|_| true);
            let gate = Conditions::new().when(yes.clone()).unless(yes);
            assert!(!evaluate(task, &gate).unwrap());

            let gate = Conditions::new()
                .when(Condition::callable(|_| true))
                .unless(Condition::callable(|_| false));
            assert!(evaluate(task, &gate).unwrap());
        });
    }

    #[test]
    fn default_is_ignored_when_a_side_is_present() {
        with_task(|task| {
            let gate = Conditions::new().when(true).default_to(false);
            assert!(evaluate(task, &gate).unwrap());
        });
    }

    #[test]
    fn method_conditions_are_sent_to_the_task() {
        with_task(|task| {
            task.context().set("admin", true);
            // `flag` is a method on the sample definition reading context["admin"].
            assert!(evaluate(task, &Conditions::new().when("flag")).unwrap());
            task.context().set("admin", Value::Nil);
            assert!(!evaluate(task, &Conditions::new().when("flag")).unwrap());
        });
    }

    #[test]
    fn undefined_method_is_an_error() {
        with_task(|task| {
            let err = evaluate(task, &Conditions::new().unless("missing")).unwrap_err();
            assert!(matches!(err, CmdxError::UndefinedMethod(name) if name == "missing"));
        });
    }
}
