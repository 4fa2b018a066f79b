//! Command objects with declarative attributes, halting results and chain
//! tracking.
//!
//! A [`TaskDefinition`] declares typed attributes read from a [`Context`],
//! optional callbacks and middlewares, and a unit of work. Executing it
//! produces an [`Outcome`]:
//!
//! ```text
//! context ─► attributes (source → derive → transform → coerce → validate)
//!         ─► work ─► outcome (success | skipped | failed) ─► chain
//! ```
//!
//! Coercions and validators are pluggable through name → handler registries
//! seeded from the process-wide [`Configuration`].

pub mod attribute;
pub mod callback;
pub mod chain;
pub mod coercion;
pub mod coercions;
pub mod condition;
pub mod config;
pub mod correlator;
pub mod definition;
mod evaluator;
pub mod executor;
pub mod middleware;
pub mod retry;
pub mod task;
pub mod validator;
pub mod validators;
pub mod workflow;

pub use attribute::{AttrId, AttributeBuilder, AttributeSpec, Schema};
pub use callback::{CallbackKind, CallbackRegistry};
pub use chain::Chain;
pub use coercion::{default_coercions, Coercion, CoercionOptions, CoercionRegistry};
pub use condition::{Condition, Conditions};
pub use config::{configuration, configure, reset_configuration, Configuration};
pub use correlator::Correlator;
pub use definition::{TaskDefinition, TaskDefinitionBuilder, Work};
pub use middleware::{Correlate, Middleware, MiddlewareRegistry, Runtime};
pub use retry::BackoffPolicy;
pub use task::{Halt, Task, WorkResult};
pub use validator::{default_validators, Validator, ValidatorOptions, ValidatorRegistry};
pub use workflow::{Workflow, WorkflowBuilder};

pub use cmdx_types::{
    CmdxError, Context, EnglishMessages, Errors, Hash, Message, MessageResolver, Outcome, Result, State,
    Status, Value,
};

#[cfg(test)]
pub(crate) mod testing {
    use cmdx_types::{Context, Value};

    use crate::chain::Chain;
    use crate::definition::TaskDefinition;
    use crate::task::Task;

    /// Run `f` against a fresh task whose `flag` method answers the
    /// context's `admin` key.
    pub(crate) fn with_task<R>(f: impl FnOnce(&Task) -> R) -> R {
        let definition = TaskDefinition::builder("SampleTask")
            .method("flag", |task| task.context().fetch("admin", Value::Nil))
            .build()
            .expect("sample definition builds");
        let task = Task::new(definition, Context::new(), Chain::new());
        f(&task)
    }
}
