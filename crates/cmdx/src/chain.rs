//! In-process grouping of the outcomes of one invocation tree.
//!
//! A chain handle is `Rc`-based and therefore bound to the thread that
//! created it. Each thread additionally has a "current" chain that top-level
//! executions join or create.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use cmdx_types::{Outcome, State, Status};

use crate::correlator::Correlator;

thread_local! {
    static CURRENT: RefCell<Option<Chain>> = const { RefCell::new(None) };
}

struct ChainInner {
    id: String,
    outcomes: Vec<Outcome>,
}

/// Shared handle; clones refer to the same chain.
#[derive(Clone)]
pub struct Chain {
    inner: Rc<RefCell<ChainInner>>,
}

impl Chain {
    /// New chain with the current correlation id, or a fresh UUID.
    pub fn new() -> Self {
        Self::with_id(Correlator::id().unwrap_or_else(Correlator::generate))
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ChainInner {
                id: id.into(),
                outcomes: Vec::new(),
            })),
        }
    }

    // --- thread-local current chain ---

    pub fn current() -> Option<Chain> {
        CURRENT.with(|current| current.borrow().clone())
    }

    pub fn set_current(chain: Chain) {
        CURRENT.with(|current| *current.borrow_mut() = Some(chain));
    }

    pub fn clear() {
        CURRENT.with(|current| *current.borrow_mut() = None);
    }

    // --- outcomes ---

    pub fn id(&self) -> String {
        self.inner.borrow().id.clone()
    }

    /// Append an outcome, returning its index.
    pub(crate) fn push(&self, outcome: Outcome) -> usize {
        let mut inner = self.inner.borrow_mut();
        inner.outcomes.push(outcome);
        inner.outcomes.len() - 1
    }

    /// Replace the snapshot stored at `index`.
    pub(crate) fn update(&self, index: usize, outcome: Outcome) {
        if let Some(slot) = self.inner.borrow_mut().outcomes.get_mut(index) {
            *slot = outcome;
        }
    }

    /// Snapshot of every outcome, in execution order.
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.inner.borrow().outcomes.clone()
    }

    pub fn get(&self, index: usize) -> Option<Outcome> {
        self.inner.borrow().outcomes.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().outcomes.is_empty()
    }

    /// The outermost outcome; the chain reports its state and status.
    pub fn first(&self) -> Option<Outcome> {
        self.get(0)
    }

    pub fn state(&self) -> Option<State> {
        self.inner.borrow().outcomes.first().map(Outcome::state)
    }

    pub fn status(&self) -> Option<Status> {
        self.inner.borrow().outcomes.first().map(Outcome::status)
    }

    pub fn same_as(&self, other: &Chain) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let inner = self.inner.borrow();
        let first = inner.outcomes.first();
        serde_json::json!({
            "id": inner.id,
            "state": first.map(Outcome::state),
            "status": first.map(Outcome::status),
            "outcomes": inner.outcomes.iter().map(Outcome::to_json).collect::<Vec<_>>(),
        })
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Chain")
            .field("id", &inner.id)
            .field("outcomes", &inner.outcomes.len())
            .finish()
    }
}
