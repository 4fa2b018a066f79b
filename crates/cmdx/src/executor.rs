//! Task execution lifecycle.
//!
//! ```text
//! join/create chain → executing
//!   → middlewares ( before_validation → verify attributes
//!                   → before_execution → work (with retries) )
//!   → executed → status callbacks → log → chain update
//! ```
//!
//! `execute` never fails; every problem ends up in the returned outcome.
//! `execute_strict` turns breakpoint statuses into faults and hands work
//! errors back to the caller.

use std::sync::Arc;
use std::time::Instant;

use cmdx_types::{Cause, CmdxError, Context, Hash, Message, Outcome, Result, Status, Value};

use crate::callback::CallbackKind;
use crate::chain::Chain;
use crate::definition::TaskDefinition;
use crate::retry;
use crate::task::{Halt, Task, WorkResult};

/// Clears the thread's current chain when the outermost task finishes,
/// including by unwinding.
struct CurrentChain {
    installed: bool,
}

impl CurrentChain {
    /// The chain to run in: `explicit`, else the thread's current chain,
    /// else a new one. Whichever is used becomes current for the run when
    /// nothing else is, so nested plain executions join it.
    fn join(explicit: Option<&Chain>) -> (Chain, Self) {
        let current = Chain::current();
        let chain = match (explicit, &current) {
            (Some(chain), _) => chain.clone(),
            (None, Some(chain)) => chain.clone(),
            (None, None) => Chain::new(),
        };
        if current.is_some() {
            return (chain, Self { installed: false });
        }
        Chain::set_current(chain.clone());
        (chain, Self { installed: true })
    }
}

impl Drop for CurrentChain {
    fn drop(&mut self) {
        if self.installed {
            Chain::clear();
        }
    }
}

impl TaskDefinition {
    /// Run the task in the thread's current chain (or a new one).
    pub fn execute(self: &Arc<Self>, context: impl Into<Context>) -> Outcome {
        self.run(None, context.into()).0
    }

    /// Like [`execute`](Self::execute), but a status listed in the task
    /// breakpoints becomes a [`CmdxError::SkipFault`] or
    /// [`CmdxError::FailFault`], and an error returned by the work is handed
    /// back as [`CmdxError::Raised`].
    pub fn execute_strict(self: &Arc<Self>, context: impl Into<Context>) -> Result<Outcome> {
        let (outcome, raised) = self.run(None, context.into());
        self.strict(outcome, raised)
    }

    /// Run within an explicit chain.
    pub fn execute_in(self: &Arc<Self>, chain: &Chain, context: impl Into<Context>) -> Outcome {
        self.run(Some(chain), context.into()).0
    }

    pub fn execute_strict_in(self: &Arc<Self>, chain: &Chain, context: impl Into<Context>) -> Result<Outcome> {
        let (outcome, raised) = self.run(Some(chain), context.into());
        self.strict(outcome, raised)
    }

    fn strict(&self, outcome: Outcome, raised: Option<Cause>) -> Result<Outcome> {
        if let Some(cause) = raised {
            return Err(CmdxError::Raised(cause));
        }
        if !self.task_breakpoints().contains(&outcome.status()) {
            return Ok(outcome);
        }
        match outcome.status() {
            Status::Skipped => Err(CmdxError::SkipFault(Box::new(outcome))),
            Status::Failed => Err(CmdxError::FailFault(Box::new(outcome))),
            Status::Success => Ok(outcome),
        }
    }

    fn run(self: &Arc<Self>, explicit: Option<&Chain>, context: Context) -> (Outcome, Option<Cause>) {
        let (chain, _current) = CurrentChain::join(explicit);
        let task = Task::new(Arc::clone(self), context, chain.clone());

        let index = chain.push(task.outcome().clone());
        {
            let mut outcome = task.outcome_mut();
            outcome.set_chain(chain.id(), index);
            if let Err(err) = outcome.executing() {
                tracing::warn!(task = %self.name(), error = %err, "could not start task");
            }
        }
        chain.update(index, task.outcome().clone());

        let clock = Instant::now();
        self.middlewares().call(&task, &mut |task: &Task| {
            if let Err(halt) = self.perform(task) {
                self.apply(task, halt);
            }
        });

        {
            let mut outcome = task.outcome_mut();
            outcome.set_runtime_ms(clock.elapsed().as_millis() as u64);
            if let Err(err) = outcome.executed() {
                tracing::warn!(task = %self.name(), error = %err, "could not finish task");
            }
        }
        chain.update(index, task.outcome().clone());

        self.finalize(&task);
        log_outcome(&task.outcome());
        chain.update(index, task.outcome().clone());

        let outcome = task.outcome().clone();
        (outcome, task.take_raised())
    }

    /// Everything the middlewares wrap.
    fn perform(&self, task: &Task) -> WorkResult {
        let callbacks = self.callbacks();
        callbacks.invoke(CallbackKind::BeforeValidation, task)?;

        task.verify_attributes();
        if let Some(err) = task.take_misconfigured() {
            return Err(Halt::Error(Arc::new(err)));
        }
        let errors = task.errors().clone();
        if errors.is_invalid() {
            return Err(Halt::Fail {
                reason: Some(errors.to_string()),
                metadata: Hash::from_iter([("messages".to_string(), Value::from(errors.to_json()))]),
            });
        }

        callbacks.invoke(CallbackKind::BeforeExecution, task)?;

        let (result, retries) = retry::run_with_retries(
            || self.work().work(task),
            self.retries(),
            self.backoff(),
            self.name(),
        );
        if retries > 0 {
            task.outcome_mut().set_retries(retries);
        }
        result
    }

    /// Record a halt on the task's outcome.
    fn apply(&self, task: &Task, halt: Halt) {
        let unspecified = || Message::key("cmdx.faults.unspecified").resolve(self.messages());
        let applied = match halt {
            Halt::Skip { reason, metadata } => task
                .outcome_mut()
                .skip(Some(reason.unwrap_or_else(unspecified)), metadata),
            Halt::Fail { reason, metadata } => task
                .outcome_mut()
                .fail(Some(reason.unwrap_or_else(unspecified)), metadata, None),
            Halt::Throw { outcome, metadata } => task.outcome_mut().throw(&outcome, metadata),
            Halt::Error(cause) => match fault_outcome(&cause) {
                // A strict sub-task's fault: adopt its outcome.
                Some(outcome) => task.outcome_mut().throw(outcome, Hash::new()),
                None => {
                    tracing::debug!(task = %self.name(), error = %cause, "work returned an error");
                    task.set_raised(Arc::clone(&cause));
                    task.outcome_mut()
                        .fail(Some(cause.to_string()), Hash::new(), Some(cause))
                }
            },
        };
        if let Err(err) = applied {
            tracing::warn!(task = %self.name(), error = %err, "could not record halt");
        }
    }

    /// Status callbacks, run once the outcome is final.
    fn finalize(&self, task: &Task) {
        let (state_kind, status_kind, quality_kind) = {
            let outcome = task.outcome();
            let state_kind = if outcome.is_complete() {
                CallbackKind::OnComplete
            } else {
                CallbackKind::OnInterrupted
            };
            let status_kind = match outcome.status() {
                Status::Success => CallbackKind::OnSuccess,
                Status::Skipped => CallbackKind::OnSkipped,
                Status::Failed => CallbackKind::OnFailed,
            };
            let quality_kind = if outcome.is_good() {
                CallbackKind::OnGood
            } else {
                CallbackKind::OnBad
            };
            (state_kind, status_kind, quality_kind)
        };

        let mut kinds = vec![state_kind, CallbackKind::OnExecuted, status_kind, quality_kind];
        // A skip is both good and bad.
        if quality_kind == CallbackKind::OnGood && task.outcome().is_bad() {
            kinds.push(CallbackKind::OnBad);
        }
        for kind in kinds {
            if let Err(halt) = self.callbacks().invoke(kind, task) {
                tracing::warn!(task = %self.name(), callback = %kind, halt = ?halt, "callback halted after execution");
            }
        }
    }
}

fn fault_outcome(cause: &Cause) -> Option<&Outcome> {
    cause
        .downcast_ref::<CmdxError>()
        .filter(|err| err.is_fault())
        .and_then(CmdxError::outcome)
}

fn log_outcome(outcome: &Outcome) {
    macro_rules! emit {
        ($level:ident) => {
            tracing::$level!(
                task = %outcome.task_name(),
                task_id = %outcome.task_id(),
                chain_id = outcome.chain_id().unwrap_or_default(),
                index = outcome.index().unwrap_or_default(),
                state = %outcome.state(),
                status = %outcome.status(),
                outcome = outcome.outcome_label(),
                reason = outcome.reason().unwrap_or_default(),
                runtime_ms = outcome.runtime_ms().unwrap_or_default(),
                "task executed"
            )
        };
    }
    match outcome.status() {
        Status::Success => emit!(info),
        Status::Skipped => emit!(warn),
        Status::Failed => emit!(error),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::task::Halt;

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct Reset;

    fn definition(work: impl crate::definition::Work + 'static) -> Arc<TaskDefinition> {
        TaskDefinition::builder("Exec").work(work).build().unwrap()
    }

    #[test]
    fn success_completes() {
        let outcome = definition(|_: &Task| -> WorkResult { Ok(()) }).execute(Context::new());
        assert!(outcome.is_complete());
        assert!(outcome.is_success());
        assert_eq!(outcome.index(), Some(0));
        assert!(outcome.runtime_ms().is_some());
        assert!(Chain::current().is_none());
    }

    #[test]
    fn skip_interrupts() {
        let outcome = definition(|_: &Task| -> WorkResult { Err(Halt::skip("Order already processed")) })
            .execute(Context::new());
        assert!(outcome.is_interrupted());
        assert!(outcome.is_skipped());
        assert_eq!(outcome.reason(), Some("Order already processed"));
        assert!(outcome.is_good());
        assert!(outcome.is_bad());
    }

    #[test]
    fn halt_without_reason_is_unspecified() {
        let outcome = definition(|_: &Task| -> WorkResult {
            Err(Halt::Fail {
                reason: None,
                metadata: Hash::new(),
            })
        })
        .execute(Context::new());
        assert_eq!(outcome.reason(), Some("Unspecified"));
    }

    #[test]
    fn work_error_fails_and_is_raised_strictly() {
        let def = definition(|_: &Task| -> WorkResult { Err(Reset.into()) });
        let outcome = def.execute(Context::new());
        assert!(outcome.is_failed());
        assert_eq!(outcome.reason(), Some("connection reset"));
        assert!(outcome.cause().is_some());

        let err = def.execute_strict(Context::new()).unwrap_err();
        assert!(matches!(err, CmdxError::Raised(_)));
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn strict_breakpoints() {
        let skipping = TaskDefinition::builder("Skipper")
            .work(|_: &Task| -> WorkResult { Err(Halt::skip("later")) })
            .build()
            .unwrap();
        assert!(skipping.execute_strict(Context::new()).is_ok());

        let strict_skipping = TaskDefinition::builder("StrictSkipper")
            .breakpoints([Status::Skipped, Status::Failed])
            .work(|_: &Task| -> WorkResult { Err(Halt::skip("later")) })
            .build()
            .unwrap();
        let err = strict_skipping.execute_strict(Context::new()).unwrap_err();
        assert!(matches!(err, CmdxError::SkipFault(_)));
        assert_eq!(err.to_string(), "later");
    }

    #[test]
    fn invalid_attributes_fail_before_work() {
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let def = TaskDefinition::builder("Signup")
            .required("email", |a| a.presence())
            .required("age", |a| a.types("integer"))
            .work(move |_: &Task| -> WorkResult {
                *flag.lock().unwrap() = true;
                Ok(())
            })
            .build()
            .unwrap();
        let outcome = def.execute(serde_json::json!({"age": "abc"}));
        assert!(outcome.is_failed());
        assert_eq!(
            outcome.reason(),
            Some("email is required. age could not coerce into an integer.")
        );
        let messages = outcome.metadata().get("messages").unwrap();
        assert_eq!(messages.get("email"), Some(&Value::from(vec!["is required"])));
        assert!(!*ran.lock().unwrap());
    }

    #[test]
    fn retries_are_recorded() {
        let attempts = Arc::new(Mutex::new(0));
        let counter = attempts.clone();
        let def = TaskDefinition::builder("Flaky")
            .retries(2)
            .work(move |_: &Task| -> WorkResult {
                let mut n = counter.lock().unwrap();
                *n += 1;
                if *n < 3 {
                    Err(Reset.into())
                } else {
                    Ok(())
                }
            })
            .build()
            .unwrap();
        let outcome = def.execute(Context::new());
        assert!(outcome.is_success());
        assert_eq!(outcome.retries(), 2);
        assert_eq!(*attempts.lock().unwrap(), 3);
    }

    #[test]
    fn status_callbacks_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = TaskDefinition::builder("Hooks")
            .work(|_: &Task| -> WorkResult { Err(Halt::skip("nothing to do")) });
        for kind in [
            CallbackKind::BeforeValidation,
            CallbackKind::BeforeExecution,
            CallbackKind::OnComplete,
            CallbackKind::OnInterrupted,
            CallbackKind::OnExecuted,
            CallbackKind::OnSuccess,
            CallbackKind::OnSkipped,
            CallbackKind::OnFailed,
            CallbackKind::OnGood,
            CallbackKind::OnBad,
        ] {
            let log = log.clone();
            builder = builder.callback(kind, move |_| {
                log.lock().unwrap().push(kind.as_str());
                Ok(())
            });
        }
        builder.build().unwrap().execute(Context::new());
        assert_eq!(
            *log.lock().unwrap(),
            [
                "before_validation",
                "before_execution",
                "on_interrupted",
                "on_executed",
                "on_skipped",
                "on_good",
                "on_bad",
            ]
        );
    }

    #[test]
    fn sub_tasks_share_the_chain() {
        let inner = TaskDefinition::builder("Inner")
            .work(|_: &Task| -> WorkResult { Err(Halt::fail("declined")) })
            .build()
            .unwrap();
        let outer = TaskDefinition::builder("Outer")
            .work(move |task: &Task| -> WorkResult {
                let outcome = task.call(&inner, task.context().clone());
                assert!(outcome.is_failed());
                Ok(())
            })
            .build()
            .unwrap();

        let outcome = outer.execute(Context::new());
        assert!(outcome.is_success());
        assert!(Chain::current().is_none());
    }

    #[test]
    fn thrown_failure_is_traced_to_its_origin() {
        let inner = TaskDefinition::builder("Charge")
            .work(|_: &Task| -> WorkResult { Err(Halt::fail("card declined").with("code", 402)) })
            .build()
            .unwrap();
        let outer = TaskDefinition::builder("Checkout")
            .work(move |task: &Task| -> WorkResult {
                let outcome = task.call(&inner, task.context().clone());
                if outcome.is_failed() {
                    return Err(Halt::throw(&outcome));
                }
                Ok(())
            })
            .build()
            .unwrap();

        let chain = Chain::with_id("checkout-1");
        let outcome = outer.execute_in(&chain, Context::new());
        assert!(outcome.is_threw_failure());
        assert_eq!(outcome.reason(), Some("card declined"));
        assert_eq!(outcome.metadata().get("code"), Some(&Value::Integer(402)));
        assert_eq!(outcome.caused_failure().map(Outcome::task_name), Some("Charge"));

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.status(), Some(Status::Failed));
        assert_eq!(chain.get(1).map(|o| o.task_name().to_string()).as_deref(), Some("Charge"));
    }

    #[test]
    fn explicit_chain_is_joined_by_nested_executions() {
        let inner = TaskDefinition::builder("Inner")
            .work(|_: &Task| -> WorkResult { Ok(()) })
            .build()
            .unwrap();
        let seen = Arc::new(Mutex::new(None));
        let record = seen.clone();
        let outer = TaskDefinition::builder("Outer")
            .work(move |task: &Task| -> WorkResult {
                *record.lock().unwrap() = Chain::current().map(|chain| chain.id().to_string());
                inner.execute(task.context().clone());
                Ok(())
            })
            .build()
            .unwrap();

        let chain = Chain::with_id("explicit");
        let outcome = outer.execute_in(&chain, Context::new());
        assert!(outcome.is_success());
        assert_eq!(seen.lock().unwrap().as_deref(), Some("explicit"));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.get(1).map(|o| o.task_name().to_string()).as_deref(), Some("Inner"));
        assert!(Chain::current().is_none());
    }

    #[test]
    fn misconfigured_validator_fails_without_attribute_messages() {
        let def = TaskDefinition::builder("Ranged")
            .required("age", |a| {
                a.types("integer")
                    .numeric(crate::validator::ValidatorOptions::new().set("within", 5))
            })
            .work(|_: &Task| -> WorkResult { Ok(()) })
            .build()
            .unwrap();

        let outcome = def.execute(serde_json::json!({"age": "30"}));
        assert!(outcome.is_failed());
        assert_eq!(
            outcome.reason(),
            Some("numeric option 'within' must be a range, got integer")
        );
        assert!(outcome.metadata().get("messages").is_none());

        let err = def.execute_strict(serde_json::json!({"age": "30"})).unwrap_err();
        assert!(matches!(err, CmdxError::Raised(_)));
    }

    #[test]
    fn strict_sub_task_fault_is_adopted() {
        let inner = TaskDefinition::builder("Inner")
            .work(|_: &Task| -> WorkResult { Err(Halt::fail("boom")) })
            .build()
            .unwrap();
        let outer = TaskDefinition::builder("Outer")
            .work(move |task: &Task| -> WorkResult {
                task.call_strict(&inner, Context::new())?;
                Ok(())
            })
            .build()
            .unwrap();
        let outcome = outer.execute(Context::new());
        assert!(outcome.is_threw_failure());
        assert_eq!(outcome.reason(), Some("boom"));
        assert!(outer.execute_strict(Context::new()).is_err_and(|e| e.is_fault()));
    }
}
