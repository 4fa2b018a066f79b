//! A task instance: one definition bound to one context for one execution.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::sync::Arc;

use once_cell::unsync::OnceCell;

use cmdx_types::{Cause, CmdxError, Context, Errors, Hash, Outcome, Result, Value};

use crate::attribute::AttrId;
use crate::chain::Chain;
use crate::definition::TaskDefinition;
use crate::evaluator;

static NIL: Value = Value::Nil;

// ---------------------------------------------------------------------------
// Halt: early exit from work and callbacks
// ---------------------------------------------------------------------------

/// How a task's work (or a callback) stops early.
///
/// Any `std::error::Error` converts into [`Halt::Error`], so `?` works on
/// ordinary fallible calls inside work.
#[derive(Debug)]
pub enum Halt {
    Skip { reason: Option<String>, metadata: Hash },
    Fail { reason: Option<String>, metadata: Hash },
    /// Adopt a sub-task's interruption.
    Throw { outcome: Box<Outcome>, metadata: Hash },
    Error(Cause),
}

/// Return type of task work.
pub type WorkResult = std::result::Result<(), Halt>;

impl Halt {
    pub fn skip(reason: impl Into<String>) -> Self {
        Halt::Skip {
            reason: Some(reason.into()),
            metadata: Hash::new(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Halt::Fail {
            reason: Some(reason.into()),
            metadata: Hash::new(),
        }
    }

    pub fn throw(outcome: &Outcome) -> Self {
        Halt::Throw {
            outcome: Box::new(outcome.clone()),
            metadata: Hash::new(),
        }
    }

    /// Attach a metadata entry. Errors carry no metadata.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        match &mut self {
            Halt::Skip { metadata, .. } | Halt::Fail { metadata, .. } | Halt::Throw { metadata, .. } => {
                metadata.insert(key.into(), value.into());
            }
            Halt::Error(_) => {}
        }
        self
    }
}

impl<E> From<E> for Halt
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Halt::Error(Arc::new(err))
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Per-execution state: the context, the outcome being built, and memoized
/// attribute values.
///
/// A task lives on one thread; its chain handle is not `Send`.
pub struct Task {
    id: String,
    definition: Arc<TaskDefinition>,
    context: Context,
    chain: Chain,
    outcome: RefCell<Outcome>,
    values: Vec<OnceCell<Value>>,
    in_progress: Vec<Cell<bool>>,
    errors: RefCell<Errors>,
    raised: RefCell<Option<Cause>>,
    misconfigured: RefCell<Option<CmdxError>>,
}

impl Task {
    pub(crate) fn new(definition: Arc<TaskDefinition>, context: Context, chain: Chain) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let mut outcome = Outcome::new(id.clone(), definition.name());
        outcome.set_tags(definition.tags().to_vec());
        let slots = definition.schema().len();
        Self {
            id,
            definition,
            context,
            chain,
            outcome: RefCell::new(outcome),
            values: (0..slots).map(|_| OnceCell::new()).collect(),
            in_progress: (0..slots).map(|_| Cell::new(false)).collect(),
            errors: RefCell::new(Errors::new()),
            raised: RefCell::new(None),
            misconfigured: RefCell::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn definition(&self) -> &Arc<TaskDefinition> {
        &self.definition
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn outcome(&self) -> Ref<'_, Outcome> {
        self.outcome.borrow()
    }

    pub(crate) fn outcome_mut(&self) -> RefMut<'_, Outcome> {
        self.outcome.borrow_mut()
    }

    /// Attribute errors collected so far.
    pub fn errors(&self) -> Ref<'_, Errors> {
        self.errors.borrow()
    }

    /// Record a metadata entry on the outcome.
    pub fn insert_metadata(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.outcome.borrow_mut().insert_metadata(key, value);
    }

    pub(crate) fn set_raised(&self, cause: Cause) {
        *self.raised.borrow_mut() = Some(cause);
    }

    pub(crate) fn take_raised(&self) -> Option<Cause> {
        self.raised.borrow_mut().take()
    }

    /// Keep the first configuration error hit while evaluating attributes.
    pub(crate) fn set_misconfigured(&self, err: CmdxError) {
        self.misconfigured.borrow_mut().get_or_insert(err);
    }

    pub(crate) fn take_misconfigured(&self) -> Option<CmdxError> {
        self.misconfigured.borrow_mut().take()
    }

    /// Value of the attribute whose accessor (or dotted path) is
    /// `method_name`, evaluating it on first access. `None` only when no such accessor is declared; a
    /// failed evaluation yields nil and records its errors.
    pub fn attribute(&self, method_name: &str) -> Option<&Value> {
        let id = self.definition.schema().accessor(method_name)?;
        Some(self.resolve(id))
    }

    pub(crate) fn resolve(&self, id: AttrId) -> &Value {
        if let Some(value) = self.values[id].get() {
            return value;
        }
        // A source that reads back into an attribute still being evaluated.
        if self.in_progress[id].get() {
            return &NIL;
        }

        self.in_progress[id].set(true);
        let spec = self.definition.schema().node(id);
        let (value, errors) = evaluator::evaluate(self, spec);
        self.errors.borrow_mut().merge(&errors);
        let value = self.values[id].get_or_init(|| value);

        // Children are only meaningful when the parent resolved to something.
        if !value.is_nil() {
            for &child in &spec.children {
                if !self.in_progress[child].get() {
                    self.resolve(child);
                }
            }
        }
        self.in_progress[id].set(false);
        value
    }

    /// Evaluate every root attribute (and, through them, their children)
    /// so that all attribute errors are collected.
    pub fn verify_attributes(&self) {
        for &root in self.definition.schema().roots() {
            self.resolve(root);
        }
    }

    /// Send a message to the task: `context`, an attribute accessor, or a
    /// definition method, in that order.
    pub fn send(&self, name: &str) -> Result<Value> {
        if name == "context" {
            return Ok(Value::Hash(self.context.snapshot()));
        }
        if let Some(value) = self.attribute(name) {
            return Ok(value.clone());
        }
        if let Some(method) = self.definition.method(name) {
            return Ok(method(self));
        }
        Err(CmdxError::UndefinedMethod(name.to_string()))
    }

    pub fn responds_to(&self, name: &str) -> bool {
        name == "context"
            || self.definition.schema().accessor(name).is_some()
            || self.definition.method(name).is_some()
    }

    /// Run `definition` as a sub-task in this task's chain.
    pub fn call(&self, definition: &Arc<TaskDefinition>, context: impl Into<Context>) -> Outcome {
        definition.execute_in(&self.chain, context)
    }

    /// Strict variant of [`call`](Self::call).
    pub fn call_strict(
        &self,
        definition: &Arc<TaskDefinition>,
        context: impl Into<Context>,
    ) -> Result<Outcome> {
        definition.execute_strict_in(&self.chain, context)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("definition", &self.definition.name())
            .field("context", &self.context)
            .field("outcome", &*self.outcome.borrow())
            .finish()
    }
}
