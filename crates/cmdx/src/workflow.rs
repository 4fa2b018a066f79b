//! Workflows: a task whose work runs other tasks in order.
//!
//! Steps share the workflow's context and chain. A step whose status is in
//! the step's breakpoints stops the workflow and its outcome is thrown into
//! the workflow's own.

use std::sync::Arc;

use cmdx_types::{Result, Status};

use crate::condition::{self, Conditions};
use crate::config::configuration;
use crate::definition::{TaskDefinition, TaskDefinitionBuilder};
use crate::task::{Halt, Task, WorkResult};

struct Step {
    definition: Arc<TaskDefinition>,
    conditions: Conditions,
    breakpoints: Option<Vec<Status>>,
}

pub struct Workflow;

impl Workflow {
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder {
            task: TaskDefinition::builder(name),
            steps: Vec::new(),
            breakpoints: configuration().workflow_breakpoints,
        }
    }
}

pub struct WorkflowBuilder {
    task: TaskDefinitionBuilder,
    steps: Vec<Step>,
    breakpoints: Vec<Status>,
}

impl WorkflowBuilder {
    pub fn step(self, definition: &Arc<TaskDefinition>) -> Self {
        self.push(definition, Conditions::new(), None)
    }

    /// Step gated by conditions evaluated against the workflow task.
    pub fn step_when(self, definition: &Arc<TaskDefinition>, conditions: Conditions) -> Self {
        self.push(definition, conditions, None)
    }

    /// Step with its own breakpoints.
    pub fn step_with(
        self,
        definition: &Arc<TaskDefinition>,
        conditions: Conditions,
        breakpoints: impl IntoIterator<Item = Status>,
    ) -> Self {
        self.push(definition, conditions, Some(breakpoints.into_iter().collect()))
    }

    fn push(mut self, definition: &Arc<TaskDefinition>, conditions: Conditions, breakpoints: Option<Vec<Status>>) -> Self {
        self.steps.push(Step {
            definition: Arc::clone(definition),
            conditions,
            breakpoints,
        });
        self
    }

    /// Breakpoints for steps that declare none.
    pub fn breakpoints(mut self, statuses: impl IntoIterator<Item = Status>) -> Self {
        self.breakpoints = statuses.into_iter().collect();
        self
    }

    /// Configure the workflow's own task definition: attributes, callbacks,
    /// middlewares and so on. Its work is replaced by the steps.
    pub fn configure(mut self, f: impl FnOnce(TaskDefinitionBuilder) -> TaskDefinitionBuilder) -> Self {
        self.task = f(self.task);
        self
    }

    pub fn build(self) -> Result<Arc<TaskDefinition>> {
        let steps = self.steps;
        let default_breakpoints = self.breakpoints;
        self.task
            .work(move |task: &Task| -> WorkResult {
                for step in &steps {
                    if !condition::evaluate(task, &step.conditions)? {
                        tracing::debug!(
                            workflow = %task.definition().name(),
                            step = %step.definition.name(),
                            "step skipped by condition"
                        );
                        continue;
                    }
                    let outcome = task.call(&step.definition, task.context().clone());
                    let breakpoints = step.breakpoints.as_ref().unwrap_or(&default_breakpoints);
                    if breakpoints.contains(&outcome.status()) {
                        return Err(Halt::throw(&outcome));
                    }
                }
                Ok(())
            })
            .build()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use cmdx_types::{Context, Value};

    fn recorder(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<TaskDefinition> {
        let log = log.clone();
        let label = name.to_string();
        TaskDefinition::builder(name)
            .work(move |task: &Task| -> WorkResult {
                log.lock().unwrap().push(label.clone());
                task.context().set(label.to_lowercase(), true);
                Ok(())
            })
            .build()
            .unwrap()
    }

    #[test]
    fn steps_share_context_and_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let workflow = Workflow::builder("Onboard")
            .step(&recorder("Create", &log))
            .step(&recorder("Notify", &log))
            .build()
            .unwrap();

        let context = Context::new();
        let outcome = workflow.execute(context.clone());
        assert!(outcome.is_success());
        assert_eq!(*log.lock().unwrap(), ["Create", "Notify"]);
        assert_eq!(context.get("notify"), Some(Value::Bool(true)));
    }

    #[test]
    fn failed_step_stops_the_workflow() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing = TaskDefinition::builder("Charge")
            .work(|_: &Task| -> WorkResult { Err(Halt::fail("declined")) })
            .build()
            .unwrap();
        let workflow = Workflow::builder("Checkout")
            .step(&failing)
            .step(&recorder("Ship", &log))
            .build()
            .unwrap();

        let outcome = workflow.execute(Context::new());
        assert!(outcome.is_threw_failure());
        assert_eq!(outcome.reason(), Some("declined"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn skipped_step_continues_unless_it_is_a_breakpoint() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let skipping = TaskDefinition::builder("Maybe")
            .work(|_: &Task| -> WorkResult { Err(Halt::skip("not needed")) })
            .build()
            .unwrap();

        let lenient = Workflow::builder("Lenient")
            .step(&skipping)
            .step(&recorder("After", &log))
            .build()
            .unwrap();
        assert!(lenient.execute(Context::new()).is_success());
        assert_eq!(log.lock().unwrap().len(), 1);

        let strict = Workflow::builder("Strict")
            .step_with(&skipping, Conditions::new(), [Status::Skipped])
            .step(&recorder("After", &log))
            .build()
            .unwrap();
        let outcome = strict.execute(Context::new());
        assert!(outcome.is_skipped());
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn gated_steps() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let workflow = Workflow::builder("Gated")
            .configure(|t| t.method("premium", |task| task.context().fetch("premium", false)))
            .step_when(&recorder("Bonus", &log), Conditions::new().when("premium"))
            .step(&recorder("Always", &log))
            .build()
            .unwrap();

        workflow.execute(Context::new());
        assert_eq!(*log.lock().unwrap(), ["Always"]);

        workflow.execute(serde_json::json!({"premium": true}));
        assert_eq!(*log.lock().unwrap(), ["Always", "Bonus", "Always"]);
    }
}
