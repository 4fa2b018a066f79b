//! Process-wide defaults that every task definition starts from.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use cmdx_types::{EnglishMessages, MessageResolver, Status};

use crate::callback::CallbackRegistry;
use crate::coercion::{default_coercions, CoercionRegistry};
use crate::middleware::MiddlewareRegistry;
use crate::retry::BackoffPolicy;
use crate::validator::{default_validators, ValidatorRegistry};

#[derive(Clone)]
pub struct Configuration {
    /// Statuses that make strict execution return a fault.
    pub task_breakpoints: Vec<Status>,
    /// Statuses that stop a workflow.
    pub workflow_breakpoints: Vec<Status>,
    pub coercions: CoercionRegistry,
    pub validators: ValidatorRegistry,
    /// Run before each definition's own callbacks.
    pub callbacks: CallbackRegistry,
    /// Wrap each definition's own middlewares.
    pub middlewares: MiddlewareRegistry,
    pub messages: Arc<dyn MessageResolver>,
    /// Times work failing with an error is re-run.
    pub retries: u32,
    pub backoff: BackoffPolicy,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            task_breakpoints: vec![Status::Failed],
            workflow_breakpoints: vec![Status::Failed],
            coercions: default_coercions(),
            validators: default_validators(),
            callbacks: CallbackRegistry::new(),
            middlewares: MiddlewareRegistry::new(),
            messages: Arc::new(EnglishMessages),
            retries: 0,
            backoff: BackoffPolicy::None,
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("task_breakpoints", &self.task_breakpoints)
            .field("workflow_breakpoints", &self.workflow_breakpoints)
            .field("coercions", &self.coercions)
            .field("validators", &self.validators)
            .field("callbacks", &self.callbacks)
            .field("middlewares", &self.middlewares)
            .field("retries", &self.retries)
            .field("backoff", &self.backoff)
            .finish()
    }
}

static CONFIGURATION: Lazy<RwLock<Configuration>> = Lazy::new(|| RwLock::new(Configuration::default()));

/// Snapshot of the global configuration.
pub fn configuration() -> Configuration {
    CONFIGURATION.read().clone()
}

/// Mutate the global configuration. Definitions built afterwards see the
/// change; existing ones keep their snapshot.
pub fn configure(f: impl FnOnce(&mut Configuration)) {
    f(&mut CONFIGURATION.write());
}

pub fn reset_configuration() {
    *CONFIGURATION.write() = Configuration::default();
}
