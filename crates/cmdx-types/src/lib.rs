//! Shared values, errors, context, and outcome for the CMDx task framework.
//!
//! This crate provides the foundational types used across the CMDx crates:
//! - `CmdxError`: unified error taxonomy
//! - `Value`: dynamic datum flowing through attribute evaluation
//! - `Context`: shared key-value store a task is invoked with
//! - `Errors`: per-attribute message sets
//! - `Outcome`: state/status record of one task execution
//! - `MessageResolver`: lookup of user-facing failure messages

pub mod context;
pub mod errors;
pub mod messages;
pub mod outcome;
pub mod value;

pub use context::Context;
pub use errors::Errors;
pub use messages::{EnglishMessages, Message, MessageResolver};
pub use outcome::{Cause, Outcome, State, Status};
pub use value::{Hash, Object, Value};

/// Unified error type for all CMDx subsystems.
#[derive(Debug, thiserror::Error)]
pub enum CmdxError {
    // === Declaration Errors ===
    #[error("{0}")]
    Argument(String),

    #[error("unknown coercion type '{0}'")]
    UnknownCoercion(String),

    #[error("unknown validator type '{0}'")]
    UnknownValidator(String),

    #[error("undefined method '{0}'")]
    UndefinedMethod(String),

    // === Data Errors ===
    #[error("{message}")]
    Coercion { type_name: String, message: Message },

    #[error("{message}")]
    Validation { validator: String, message: Message },

    // === Outcome Errors ===
    #[error("cannot transition state from {from} to {to}")]
    InvalidState { from: State, to: State },

    #[error("cannot transition status from {from} to {to}")]
    InvalidStatus { from: Status, to: Status },

    // === Faults ===
    #[error("{}", .0.reason().unwrap_or("Unspecified"))]
    SkipFault(Box<Outcome>),

    #[error("{}", .0.reason().unwrap_or("Unspecified"))]
    FailFault(Box<Outcome>),

    /// An error returned by task work, re-raised by strict execution.
    #[error(transparent)]
    Raised(Cause),

    // === Generic ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CmdxError {
    pub fn coercion(type_name: impl Into<String>, message: Message) -> Self {
        CmdxError::Coercion {
            type_name: type_name.into(),
            message,
        }
    }

    pub fn validation(validator: impl Into<String>, message: Message) -> Self {
        CmdxError::Validation {
            validator: validator.into(),
            message,
        }
    }

    /// Returns `true` for the skip/fail faults raised by strict execution.
    pub fn is_fault(&self) -> bool {
        matches!(self, CmdxError::SkipFault(_) | CmdxError::FailFault(_))
    }

    /// Returns `true` when a coercion or validator name was not registered.
    /// These are configuration mistakes rather than bad input.
    pub fn is_registry_error(&self) -> bool {
        matches!(
            self,
            CmdxError::UnknownCoercion(_) | CmdxError::UnknownValidator(_)
        )
    }

    /// Returns `true` when input data failed coercion or validation.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            CmdxError::Coercion { .. } | CmdxError::Validation { .. }
        )
    }

    /// The outcome carried by a fault.
    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            CmdxError::SkipFault(outcome) | CmdxError::FailFault(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// The unresolved failure message of a data error.
    pub fn message(&self) -> Option<&Message> {
        match self {
            CmdxError::Coercion { message, .. } | CmdxError::Validation { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, CmdxError>`.
pub type Result<T> = std::result::Result<T, CmdxError>;
