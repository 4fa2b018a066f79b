//! Lifecycle callbacks.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::condition::{self, Conditions};
use crate::task::{Task, WorkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    BeforeValidation,
    BeforeExecution,
    OnComplete,
    OnInterrupted,
    OnExecuted,
    OnSuccess,
    OnSkipped,
    OnFailed,
    OnGood,
    OnBad,
}

impl CallbackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallbackKind::BeforeValidation => "before_validation",
            CallbackKind::BeforeExecution => "before_execution",
            CallbackKind::OnComplete => "on_complete",
            CallbackKind::OnInterrupted => "on_interrupted",
            CallbackKind::OnExecuted => "on_executed",
            CallbackKind::OnSuccess => "on_success",
            CallbackKind::OnSkipped => "on_skipped",
            CallbackKind::OnFailed => "on_failed",
            CallbackKind::OnGood => "on_good",
            CallbackKind::OnBad => "on_bad",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type CallbackFn = Arc<dyn Fn(&Task) -> WorkResult + Send + Sync>;

#[derive(Clone)]
pub struct Callback {
    f: CallbackFn,
    conditions: Conditions,
}

/// Ordered callbacks per kind.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: IndexMap<CallbackKind, Vec<Callback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind: CallbackKind,
        f: impl Fn(&Task) -> WorkResult + Send + Sync + 'static,
        conditions: Conditions,
    ) -> &mut Self {
        tracing::trace!(kind = %kind, "registering callback");
        self.callbacks.entry(kind).or_default().push(Callback {
            f: Arc::new(f),
            conditions,
        });
        self
    }

    /// Remove every callback of `kind`.
    pub fn deregister(&mut self, kind: CallbackKind) -> &mut Self {
        self.callbacks.shift_remove(&kind);
        self
    }

    pub fn has(&self, kind: CallbackKind) -> bool {
        self.callbacks.get(&kind).is_some_and(|list| !list.is_empty())
    }

    pub fn count(&self, kind: CallbackKind) -> usize {
        self.callbacks.get(&kind).map_or(0, Vec::len)
    }

    /// Append every callback of `other` after this registry's own.
    pub fn extend(&mut self, other: &CallbackRegistry) {
        for (kind, list) in &other.callbacks {
            self.callbacks.entry(*kind).or_default().extend(list.iter().cloned());
        }
    }

    /// Run the callbacks of `kind` in order. The first halt stops the rest.
    pub fn invoke(&self, kind: CallbackKind, task: &Task) -> WorkResult {
        let Some(list) = self.callbacks.get(&kind) else {
            return Ok(());
        };
        for callback in list {
            if !condition::evaluate(task, &callback.conditions)? {
                continue;
            }
            (callback.f)(task)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.callbacks.iter().map(|(kind, list)| (kind.as_str(), list.len())))
            .finish()
    }
}
