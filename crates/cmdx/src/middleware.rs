//! Middleware wrapping task execution.
//!
//! Middlewares nest in registration order: the first registered is the
//! outermost and sees the task before and after everything else.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::condition::{self, Conditions};
use crate::correlator::Correlator;
use crate::task::Task;

pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    /// Wrap the rest of the execution. Not calling `next` leaves the task's
    /// work unexecuted.
    fn call(&self, task: &Task, next: &mut dyn FnMut(&Task));
}

#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    entries: Vec<(Arc<dyn Middleware>, Conditions)>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, middleware: impl Middleware + 'static, conditions: Conditions) -> &mut Self {
        tracing::trace!(middleware = middleware.name(), "registering middleware");
        self.entries.push((Arc::new(middleware), conditions));
        self
    }

    /// Remove every middleware called `name`.
    pub fn deregister(&mut self, name: &str) -> &mut Self {
        self.entries.retain(|(middleware, _)| middleware.name() != name);
        self
    }

    pub fn extend(&mut self, other: &MiddlewareRegistry) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(middleware, _)| middleware.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run `work` inside every enabled middleware.
    pub fn call(&self, task: &Task, work: &mut dyn FnMut(&Task)) {
        self.call_at(0, task, work);
    }

    fn call_at(&self, index: usize, task: &Task, work: &mut dyn FnMut(&Task)) {
        let Some((middleware, conditions)) = self.entries.get(index) else {
            work(task);
            return;
        };
        let enabled = condition::evaluate(task, conditions).unwrap_or_else(|err| {
            tracing::warn!(middleware = middleware.name(), error = %err, "middleware condition failed, skipping");
            false
        });
        if enabled {
            middleware.call(task, &mut |task: &Task| self.call_at(index + 1, task, &mut *work));
        } else {
            self.call_at(index + 1, task, work);
        }
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in middlewares
// ---------------------------------------------------------------------------

/// Runs the task under a correlation id and records it as
/// `correlation_id` metadata.
///
/// The id is the configured one, else the thread's current correlation id,
/// else the chain id.
#[derive(Debug, Clone, Default)]
pub struct Correlate {
    id: Option<String>,
}

impl Correlate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()) }
    }
}

impl Middleware for Correlate {
    fn name(&self) -> &str {
        "correlate"
    }

    fn call(&self, task: &Task, next: &mut dyn FnMut(&Task)) {
        let id = self
            .id
            .clone()
            .or_else(Correlator::id)
            .unwrap_or_else(|| task.chain().id());
        task.insert_metadata("correlation_id", id.clone());
        Correlator::use_id(id, || next(task));
    }
}

/// Records `started_at`, `ended_at` (RFC 3339) and `duration_ms` metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct Runtime;

impl Middleware for Runtime {
    fn name(&self) -> &str {
        "runtime"
    }

    fn call(&self, task: &Task, next: &mut dyn FnMut(&Task)) {
        let started_at = chrono::Utc::now();
        let clock = Instant::now();
        next(task);
        let duration_ms = clock.elapsed().as_millis() as i64;
        task.insert_metadata("started_at", started_at.to_rfc3339());
        task.insert_metadata("ended_at", chrono::Utc::now().to_rfc3339());
        task.insert_metadata("duration_ms", duration_ms);
    }
}
