use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::value::{Hash, Value};
use crate::{CmdxError, Result};

/// Error captured as the cause of a failed outcome.
pub type Cause = Arc<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// State / Status
// ---------------------------------------------------------------------------

/// Execution lifecycle of an outcome. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Initialized,
    Executing,
    Complete,
    Interrupted,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::Initialized => "initialized",
            State::Executing => "executing",
            State::Complete => "complete",
            State::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Skipped,
    Failed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Skipped => "skipped",
            Status::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Status::Success),
            "skipped" => Some(Status::Skipped),
            "failed" => Some(Status::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Outcome: the result of one task execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Outcome {
    task_id: String,
    task_name: String,
    tags: Vec<String>,
    chain_id: Option<String>,
    index: Option<usize>,
    state: State,
    status: Status,
    reason: Option<String>,
    cause: Option<Cause>,
    metadata: Hash,
    retries: u32,
    runtime_ms: Option<u64>,
    thrown: Option<Box<Outcome>>,
}

impl Outcome {
    pub fn new(task_id: impl Into<String>, task_name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            task_name: task_name.into(),
            tags: Vec::new(),
            chain_id: None,
            index: None,
            state: State::Initialized,
            status: Status::Success,
            reason: None,
            cause: None,
            metadata: Hash::new(),
            retries: 0,
            runtime_ms: None,
            thrown: None,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn chain_id(&self) -> Option<&str> {
        self.chain_id.as_deref()
    }

    /// Position of this outcome within its chain.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    pub fn metadata(&self) -> &Hash {
        &self.metadata
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn runtime_ms(&self) -> Option<u64> {
        self.runtime_ms
    }

    // --- bookkeeping (allowed in any state) ---

    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.tags = tags;
    }

    pub fn set_chain(&mut self, chain_id: impl Into<String>, index: usize) {
        self.chain_id = Some(chain_id.into());
        self.index = Some(index);
    }

    pub fn set_retries(&mut self, retries: u32) {
        self.retries = retries;
    }

    pub fn set_runtime_ms(&mut self, runtime_ms: u64) {
        self.runtime_ms = Some(runtime_ms);
    }

    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    // --- state predicates ---

    pub fn is_initialized(&self) -> bool {
        self.state == State::Initialized
    }

    pub fn is_executing(&self) -> bool {
        self.state == State::Executing
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    pub fn is_interrupted(&self) -> bool {
        self.state == State::Interrupted
    }

    pub fn is_executed(&self) -> bool {
        self.is_complete() || self.is_interrupted()
    }

    // --- status predicates ---

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn is_skipped(&self) -> bool {
        self.status == Status::Skipped
    }

    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }

    /// Anything but failed.
    pub fn is_good(&self) -> bool {
        !self.is_failed()
    }

    /// Anything but success.
    pub fn is_bad(&self) -> bool {
        !self.is_success()
    }

    /// Failed here, rather than receiving a failure thrown by a sub-task.
    pub fn is_caused_failure(&self) -> bool {
        self.is_failed() && self.thrown.is_none()
    }

    /// Failed because a sub-task's failure was thrown into this outcome.
    pub fn is_threw_failure(&self) -> bool {
        self.is_failed() && self.thrown.is_some()
    }

    /// The deepest outcome in the throw chain that originated the failure.
    pub fn caused_failure(&self) -> Option<&Outcome> {
        if !self.is_failed() {
            return None;
        }
        let mut current = self;
        while let Some(next) = current.thrown.as_deref() {
            current = next;
        }
        Some(current)
    }

    /// The sub-task outcome thrown into this one, if any.
    pub fn threw_failure(&self) -> Option<&Outcome> {
        self.thrown.as_deref()
    }

    /// Status once executed, the state otherwise.
    pub fn outcome_label(&self) -> &'static str {
        if self.is_executed() {
            self.status.as_str()
        } else {
            self.state.as_str()
        }
    }

    // --- state transitions ---

    fn transition(&mut self, from: State, to: State) -> Result<()> {
        if self.state != from {
            return Err(CmdxError::InvalidState {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn executing(&mut self) -> Result<()> {
        self.transition(State::Initialized, State::Executing)
    }

    pub fn complete(&mut self) -> Result<()> {
        if self.is_complete() {
            return Ok(());
        }
        self.transition(State::Executing, State::Complete)
    }

    pub fn interrupt(&mut self) -> Result<()> {
        if self.is_interrupted() {
            return Ok(());
        }
        self.transition(State::Executing, State::Interrupted)
    }

    /// Complete on success, interrupt otherwise.
    pub fn executed(&mut self) -> Result<()> {
        if self.is_success() {
            self.complete()
        } else {
            self.interrupt()
        }
    }

    // --- status transitions ---

    fn halt(&mut self, to: Status, reason: Option<String>, metadata: Hash) -> Result<()> {
        if self.is_executed() {
            return Err(CmdxError::InvalidState {
                from: self.state,
                to: State::Interrupted,
            });
        }
        if self.status != Status::Success {
            return Err(CmdxError::InvalidStatus {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.reason = reason;
        self.metadata.extend(metadata);
        Ok(())
    }

    /// Mark the outcome skipped. Repeating a skip is a no-op.
    pub fn skip(&mut self, reason: Option<String>, metadata: Hash) -> Result<()> {
        if self.is_skipped() {
            return Ok(());
        }
        self.halt(Status::Skipped, reason, metadata)
    }

    /// Mark the outcome failed. Repeating a failure is a no-op.
    pub fn fail(&mut self, reason: Option<String>, metadata: Hash, cause: Option<Cause>) -> Result<()> {
        if self.is_failed() {
            return Ok(());
        }
        self.halt(Status::Failed, reason, metadata)?;
        self.cause = cause;
        Ok(())
    }

    /// Adopt the halt of a sub-task outcome. Successful outcomes are ignored.
    pub fn throw(&mut self, other: &Outcome, metadata: Hash) -> Result<()> {
        let mut merged = other.metadata.clone();
        merged.extend(metadata);
        match other.status {
            Status::Success => Ok(()),
            Status::Skipped => self.skip(other.reason.clone(), merged),
            Status::Failed => {
                self.fail(other.reason.clone(), merged, other.cause.clone())?;
                self.thrown = Some(Box::new(other.clone()));
                Ok(())
            }
        }
    }

    // --- status handlers ---

    pub fn on_success(&self, f: impl FnOnce(&Outcome)) -> &Self {
        if self.is_success() {
            f(self);
        }
        self
    }

    pub fn on_skipped(&self, f: impl FnOnce(&Outcome)) -> &Self {
        if self.is_skipped() {
            f(self);
        }
        self
    }

    pub fn on_failed(&self, f: impl FnOnce(&Outcome)) -> &Self {
        if self.is_failed() {
            f(self);
        }
        self
    }

    pub fn on_good(&self, f: impl FnOnce(&Outcome)) -> &Self {
        if self.is_good() {
            f(self);
        }
        self
    }

    pub fn on_bad(&self, f: impl FnOnce(&Outcome)) -> &Self {
        if self.is_bad() {
            f(self);
        }
        self
    }

    pub fn on_executed(&self, f: impl FnOnce(&Outcome)) -> &Self {
        if self.is_executed() {
            f(self);
        }
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut json = serde_json::json!({
            "task": self.task_name,
            "id": self.task_id,
            "tags": self.tags,
            "chain_id": self.chain_id,
            "index": self.index,
            "state": self.state,
            "status": self.status,
            "outcome": self.outcome_label(),
            "metadata": Value::Hash(self.metadata.clone()).to_json(),
            "retries": self.retries,
            "runtime": self.runtime_ms,
        });
        if let Some(obj) = json.as_object_mut() {
            if let Some(reason) = &self.reason {
                obj.insert("reason".into(), reason.clone().into());
            }
            if let Some(cause) = &self.cause {
                obj.insert("cause".into(), cause.to_string().into());
            }
            if let Some(thrown) = &self.thrown {
                obj.insert("threw_failure".into(), thrown.task_name.clone().into());
            }
        }
        json
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task={} id={} state={} status={} outcome={}",
            self.task_name,
            self.task_id,
            self.state,
            self.status,
            self.outcome_label()
        )?;
        if let Some(index) = self.index {
            write!(f, " index={index}")?;
        }
        if let Some(reason) = &self.reason {
            write!(f, " reason={reason:?}")?;
        }
        Ok(())
    }
}
