//! Task definitions: the immutable description a task is executed from.
//!
//! A definition bundles the attribute schema, named methods and transforms,
//! registries, callbacks, middlewares and the work itself. It is built once
//! through [`TaskDefinitionBuilder`] and shared behind an `Arc`.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use cmdx_types::{MessageResolver, Result, Status, Value};

use crate::attribute::{AttributeBuilder, IntoNames, MethodFn, Schema, TransformFn};
use crate::callback::{CallbackKind, CallbackRegistry};
use crate::coercion::{Coercion, CoercionRegistry};
use crate::condition::Conditions;
use crate::config::configuration;
use crate::middleware::{Middleware, MiddlewareRegistry};
use crate::retry::BackoffPolicy;
use crate::task::{Task, WorkResult};
use crate::validator::{Validator, ValidatorRegistry};

// ---------------------------------------------------------------------------
// Work trait
// ---------------------------------------------------------------------------

/// A task's business logic.
pub trait Work: Send + Sync {
    fn work(&self, task: &Task) -> WorkResult;
}

impl<F> Work for F
where
    F: Fn(&Task) -> WorkResult + Send + Sync,
{
    fn work(&self, task: &Task) -> WorkResult {
        self(task)
    }
}

// ---------------------------------------------------------------------------
// TaskDefinition
// ---------------------------------------------------------------------------

pub struct TaskDefinition {
    name: String,
    tags: Vec<String>,
    schema: Schema,
    methods: IndexMap<String, MethodFn>,
    transforms: IndexMap<String, TransformFn>,
    coercions: CoercionRegistry,
    validators: ValidatorRegistry,
    callbacks: CallbackRegistry,
    middlewares: MiddlewareRegistry,
    messages: Arc<dyn MessageResolver>,
    task_breakpoints: Vec<Status>,
    retries: u32,
    backoff: BackoffPolicy,
    work: Arc<dyn Work>,
}

impl TaskDefinition {
    pub fn builder(name: impl Into<String>) -> TaskDefinitionBuilder {
        TaskDefinitionBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn method(&self, name: &str) -> Option<&MethodFn> {
        self.methods.get(name)
    }

    pub fn transform(&self, name: &str) -> Option<&TransformFn> {
        self.transforms.get(name)
    }

    pub fn coercions(&self) -> &CoercionRegistry {
        &self.coercions
    }

    pub fn validators(&self) -> &ValidatorRegistry {
        &self.validators
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub fn middlewares(&self) -> &MiddlewareRegistry {
        &self.middlewares
    }

    pub fn messages(&self) -> &dyn MessageResolver {
        self.messages.as_ref()
    }

    /// Statuses that make strict execution return a fault.
    pub fn task_breakpoints(&self) -> &[Status] {
        &self.task_breakpoints
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    pub(crate) fn work(&self) -> &dyn Work {
        self.work.as_ref()
    }

    /// Name, tags and the declared attribute tree.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "tags": self.tags,
            "attributes": self.schema.to_json(),
        })
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("attributes", &self.schema.len())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("callbacks", &self.callbacks)
            .field("middlewares", &self.middlewares)
            .field("task_breakpoints", &self.task_breakpoints)
            .field("retries", &self.retries)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TaskDefinitionBuilder
// ---------------------------------------------------------------------------

/// Builder starting from a snapshot of the global configuration.
///
/// Registries are copies: registering a coercion or validator here never
/// affects the configuration or other definitions.
pub struct TaskDefinitionBuilder {
    name: String,
    tags: Vec<String>,
    declarations: Vec<AttributeBuilder>,
    methods: IndexMap<String, MethodFn>,
    transforms: IndexMap<String, TransformFn>,
    coercions: CoercionRegistry,
    validators: ValidatorRegistry,
    callbacks: CallbackRegistry,
    middlewares: MiddlewareRegistry,
    messages: Arc<dyn MessageResolver>,
    task_breakpoints: Vec<Status>,
    retries: u32,
    backoff: BackoffPolicy,
    work: Arc<dyn Work>,
}

impl TaskDefinitionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let config = configuration();
        Self {
            name: name.into(),
            tags: Vec::new(),
            declarations: Vec::new(),
            methods: IndexMap::new(),
            transforms: IndexMap::new(),
            coercions: config.coercions,
            validators: config.validators,
            callbacks: config.callbacks,
            middlewares: config.middlewares,
            messages: config.messages,
            task_breakpoints: config.task_breakpoints,
            retries: config.retries,
            backoff: config.backoff,
            work: Arc::new(|_: &Task| -> WorkResult { Ok(()) }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(mut self, tags: impl IntoNames) -> Self {
        self.tags = tags.into_names();
        self
    }

    // --- methods ---

    /// Named method answering sources, defaults and conditions by name.
    pub fn method(mut self, name: impl Into<String>, f: impl Fn(&Task) -> Value + Send + Sync + 'static) -> Self {
        self.methods.insert(name.into(), Arc::new(f));
        self
    }

    /// Named transform, referenced from `AttributeBuilder::transform`.
    pub fn transform(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Task, Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.transforms.insert(name.into(), Arc::new(f));
        self
    }

    // --- attributes ---

    pub fn declare(mut self, attribute: AttributeBuilder) -> Self {
        self.declarations.push(attribute);
        self
    }

    pub fn required(self, names: impl IntoNames, f: impl FnOnce(AttributeBuilder) -> AttributeBuilder) -> Self {
        self.declare(f(AttributeBuilder::new(names, true)))
    }

    pub fn optional(self, names: impl IntoNames, f: impl FnOnce(AttributeBuilder) -> AttributeBuilder) -> Self {
        self.declare(f(AttributeBuilder::new(names, false)))
    }

    /// Same as [`optional`](Self::optional).
    pub fn attribute(self, names: impl IntoNames, f: impl FnOnce(AttributeBuilder) -> AttributeBuilder) -> Self {
        self.optional(names, f)
    }

    // --- registries ---

    pub fn coercion(mut self, name: impl Into<String>, handler: impl Coercion + 'static) -> Self {
        self.coercions.register(name, handler);
        self
    }

    pub fn deregister_coercion(mut self, name: &str) -> Self {
        self.coercions.deregister(name);
        self
    }

    pub fn validator(mut self, name: impl Into<String>, handler: impl Validator + 'static) -> Self {
        self.validators.register(name, handler);
        self
    }

    pub fn deregister_validator(mut self, name: &str) -> Self {
        self.validators.deregister(name);
        self
    }

    pub fn messages(mut self, resolver: impl MessageResolver + 'static) -> Self {
        self.messages = Arc::new(resolver);
        self
    }

    // --- callbacks ---

    pub fn callback(self, kind: CallbackKind, f: impl Fn(&Task) -> WorkResult + Send + Sync + 'static) -> Self {
        self.callback_when(kind, f, Conditions::new())
    }

    pub fn callback_when(
        mut self,
        kind: CallbackKind,
        f: impl Fn(&Task) -> WorkResult + Send + Sync + 'static,
        conditions: Conditions,
    ) -> Self {
        self.callbacks.register(kind, f, conditions);
        self
    }

    pub fn deregister_callbacks(mut self, kind: CallbackKind) -> Self {
        self.callbacks.deregister(kind);
        self
    }

    // --- middlewares ---

    pub fn middleware(self, middleware: impl Middleware + 'static) -> Self {
        self.middleware_when(middleware, Conditions::new())
    }

    pub fn middleware_when(mut self, middleware: impl Middleware + 'static, conditions: Conditions) -> Self {
        self.middlewares.register(middleware, conditions);
        self
    }

    pub fn deregister_middleware(mut self, name: &str) -> Self {
        self.middlewares.deregister(name);
        self
    }

    // --- execution settings ---

    pub fn breakpoints(mut self, statuses: impl IntoIterator<Item = Status>) -> Self {
        self.task_breakpoints = statuses.into_iter().collect();
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    pub fn work(mut self, work: impl Work + 'static) -> Self {
        self.work = Arc::new(work);
        self
    }

    /// Validate the declarations and freeze the definition.
    pub fn build(self) -> Result<Arc<TaskDefinition>> {
        let schema = Schema::build(self.declarations, self.methods.keys().map(String::as_str))?;
        tracing::debug!(
            task = %self.name,
            attributes = schema.len(),
            methods = self.methods.len(),
            "built task definition"
        );
        Ok(Arc::new(TaskDefinition {
            name: self.name,
            tags: self.tags,
            schema,
            methods: self.methods,
            transforms: self.transforms,
            coercions: self.coercions,
            validators: self.validators,
            callbacks: self.callbacks,
            middlewares: self.middlewares,
            messages: self.messages,
            task_breakpoints: self.task_breakpoints,
            retries: self.retries,
            backoff: self.backoff,
            work: self.work,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coercion::CoercionOptions;
    use cmdx_types::CmdxError;

    #[test]
    fn builder_starts_from_configuration() {
        let def = TaskDefinition::builder("Plain").build().unwrap();
        assert_eq!(def.name(), "Plain");
        assert_eq!(def.task_breakpoints(), [Status::Failed]);
        assert!(def.coercions().has("integer"));
        assert!(def.validators().has("length"));
        assert_eq!(def.retries(), 0);
        assert!(def.schema().is_empty());
    }

    #[test]
    fn local_registries_are_independent() {
        let def = TaskDefinition::builder("Money")
            .coercion("money", |v: &Value, _: &CoercionOptions| -> Result<Value> { Ok(v.clone()) })
            .deregister_validator("format")
            .build()
            .unwrap();
        assert!(def.coercions().has("money"));
        assert!(!def.validators().has("format"));

        let other = TaskDefinition::builder("Other").build().unwrap();
        assert!(!other.coercions().has("money"));
        assert!(other.validators().has("format"));
    }

    #[test]
    fn attribute_accessor_may_not_shadow_method() {
        let err = TaskDefinition::builder("Clash")
            .method("total", |_| Value::Integer(1))
            .required("total", |a| a)
            .build()
            .unwrap_err();
        assert!(matches!(err, CmdxError::Argument(_)));
    }

    #[test]
    fn duplicate_attributes_are_rejected() {
        let err = TaskDefinition::builder("Dup")
            .required("email", |a| a)
            .optional("email", |a| a)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("already defined"));
    }

    #[test]
    fn json_lists_attributes() {
        let def = TaskDefinition::builder("Signup")
            .tags(["accounts"])
            .required("email", |a| a.types("string"))
            .build()
            .unwrap();
        let json = def.to_json();
        assert_eq!(json["name"], "Signup");
        assert_eq!(json["tags"][0], "accounts");
        assert!(json["attributes"].is_array());
    }
}
