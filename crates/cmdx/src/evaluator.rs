//! The five-stage attribute pipeline: source → derive → transform → coerce →
//! validate.
//!
//! A failing stage records its message under the attribute's error key and
//! stops the pipeline; the attribute then resolves to nil. Validation is the
//! exception: every validator runs and each failure is recorded. A validator
//! rejecting its own options is a configuration error, not a data error: it is
//! handed to the task instead of being recorded as a message.

use cmdx_types::{CmdxError, Errors, Message, Value};

use crate::attribute::{AttributeSpec, DefaultValue, Source, Transform};
use crate::coercions::type_label;
use crate::condition;
use crate::task::Task;

/// Marker for "an error was recorded, stop here".
struct Stop;

type Stage<T> = std::result::Result<T, Stop>;

/// What stage 1 produced.
enum Sourced {
    Context,
    Value(Value),
}

/// Run the pipeline for `spec` against `task`.
pub(crate) fn evaluate(task: &Task, spec: &AttributeSpec) -> (Value, Errors) {
    let mut evaluation = Evaluation {
        task,
        spec,
        errors: Errors::new(),
    };
    let value = evaluation.run().unwrap_or(Value::Nil);
    let value = if evaluation.errors.is_empty() { value } else { Value::Nil };
    (value, evaluation.errors)
}

struct Evaluation<'a> {
    task: &'a Task,
    spec: &'a AttributeSpec,
    errors: Errors,
}

impl Evaluation<'_> {
    fn run(&mut self) -> Stage<Value> {
        let sourced = self.source()?;
        let derived = self.derive(sourced)?;
        let transformed = self.transform(derived)?;
        let coerced = self.coerce(transformed)?;
        self.validate(&coerced);
        Ok(coerced)
    }

    fn record(&mut self, stage: &str, message: Message) -> Stop {
        let text = message.resolve(self.task.definition().messages());
        tracing::debug!(
            task = %self.task.definition().name(),
            attribute = %self.spec.error_key,
            stage,
            message = %text,
            "attribute stage failed"
        );
        self.errors.add(self.spec.error_key.clone(), text);
        Stop
    }

    fn required(&mut self, stage: &str) -> Stop {
        self.record(stage, Message::key("cmdx.attributes.required"))
    }

    fn undefined(&mut self, stage: &str, method: &str) -> Stop {
        self.record(
            stage,
            Message::key("cmdx.attributes.undefined").with("method", method),
        )
    }

    /// Message for an error that carries none of its own.
    fn record_error(&mut self, stage: &str, err: &CmdxError) -> Stop {
        match err {
            CmdxError::UndefinedMethod(method) => self.undefined(stage, method),
            other => self.record(stage, message_of(other)),
        }
    }

    /// Send `name` to the task, recording an undefined method.
    fn send(&mut self, stage: &str, name: &str) -> Stage<Value> {
        self.task
            .send(name)
            .map_err(|err| self.record_error(stage, &err))
    }

    // --- stage 1 ---

    fn source(&mut self) -> Stage<Sourced> {
        let (task, spec) = (self.task, self.spec);
        let value = match &spec.source {
            Source::Context => return Ok(Sourced::Context),
            Source::Method(name) => self.send("source", name)?,
            Source::Parent { id, .. } => task.resolve(*id).clone(),
            Source::Callable(f) => f(task),
        };
        if value.is_nil() && task.definition().schema().required_in_scope(spec.id) {
            return Err(self.required("source"));
        }
        Ok(Sourced::Value(value))
    }

    // --- stage 2 ---

    fn derive(&mut self, sourced: Sourced) -> Stage<Value> {
        let (task, spec) = (self.task, self.spec);
        let name = spec.name.as_str();
        let derived = match sourced {
            Sourced::Context => {
                let context = task.context();
                if spec.required && !context.contains_key(name) {
                    return Err(self.required("derive"));
                }
                context.get(name).unwrap_or_default()
            }
            Sourced::Value(Value::Hash(map)) => {
                if spec.required && !map.contains_key(name) {
                    return Err(self.required("derive"));
                }
                map.get(name).cloned().unwrap_or_default()
            }
            Sourced::Value(Value::Nil) => Value::Nil,
            Sourced::Value(Value::Object(object)) if object.is_callable() => {
                object.call(task.context())
            }
            Sourced::Value(Value::Object(object)) => match object.respond(name) {
                Some(value) => value,
                None => return Err(self.undefined("derive", name)),
            },
            Sourced::Value(_) => return Err(self.undefined("derive", name)),
        };

        if !derived.is_nil() {
            return Ok(derived);
        }
        match &spec.options.default {
            None => Ok(Value::Nil),
            Some(DefaultValue::Value(value)) => Ok(value.clone()),
            Some(DefaultValue::Callable(f)) => Ok(f(task)),
            Some(DefaultValue::Method(method)) => self.send("derive", method),
        }
    }

    // --- stage 3 ---

    fn transform(&mut self, value: Value) -> Stage<Value> {
        let (task, spec) = (self.task, self.spec);
        match &spec.options.transform {
            None => Ok(value),
            Some(Transform::Callable(f)) => Ok(f(task, value)),
            Some(Transform::Method(name)) => match task.definition().transform(name) {
                Some(f) => Ok(f(task, value)),
                None => Err(self.undefined("transform", name)),
            },
        }
    }

    // --- stage 4 ---

    fn coerce(&mut self, value: Value) -> Stage<Value> {
        let (task, spec) = (self.task, self.spec);
        let types = &spec.types;
        if types.is_empty() || value.is_nil() {
            return Ok(value);
        }

        let registry = task.definition().coercions();
        let options = &spec.options.coercion;
        let mut last_error = None;
        for type_name in types {
            match registry.coerce(type_name, &value, options) {
                Ok(coerced) => return Ok(coerced),
                Err(CmdxError::UnknownCoercion(unknown)) => {
                    return Err(self.record(
                        "coerce",
                        Message::key("cmdx.coercions.unknown").with("type", unknown),
                    ));
                }
                Err(err) => last_error = Some(err),
            }
        }

        let message = match (types.len(), last_error) {
            (1, Some(err)) => message_of(&err),
            _ => {
                let labels: Vec<String> = types.iter().map(|t| type_label(t)).collect();
                Message::key("cmdx.coercions.into_any").with("types", labels.join(", "))
            }
        };
        Err(self.record("coerce", message))
    }

    // --- stage 5 ---

    fn validate(&mut self, value: &Value) {
        let (task, spec) = (self.task, self.spec);
        let registry = task.definition().validators();
        for (name, options) in &spec.options.validators {
            if value.is_nil() && options.allows_nil() {
                continue;
            }
            match condition::evaluate(task, options.conditions()) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    self.record_error("validate", &err);
                    continue;
                }
            }
            match registry.validate(name, value, options) {
                Ok(()) => {}
                Err(CmdxError::UnknownValidator(unknown)) => {
                    self.record(
                        "validate",
                        Message::key("cmdx.validators.unknown").with("type", unknown),
                    );
                }
                Err(err @ CmdxError::Argument(_)) => {
                    tracing::warn!(
                        task = %task.definition().name(),
                        attribute = %spec.error_key,
                        validator = %name,
                        error = %err,
                        "validator is misconfigured"
                    );
                    task.set_misconfigured(err);
                }
                Err(err) => {
                    self.record_error("validate", &err);
                }
            }
        }
    }
}

fn message_of(err: &CmdxError) -> Message {
    err.message()
        .cloned()
        .unwrap_or_else(|| Message::text(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::attribute::AttributeBuilder;
    use crate::chain::Chain;
    use crate::definition::TaskDefinition;
    use crate::validator::ValidatorOptions;
    use cmdx_types::Context;
    use serde_json::json;

    fn task_with(attrs: Vec<AttributeBuilder>, context: serde_json::Value) -> Task {
        let mut builder = TaskDefinition::builder("EvalTask")
            .method("settings", |_| Value::hash([("mode", "fast")]))
            .method("nothing", |_| Value::Nil)
            .transform("shout", |_, v| Value::from(v.to_string().to_uppercase()));
        for attr in attrs {
            builder = builder.declare(attr);
        }
        let definition = builder.build().unwrap();
        let task = Task::new(definition, Context::from(context), Chain::new());
        task.verify_attributes();
        task
    }

    fn messages(task: &Task, key: &str) -> Vec<String> {
        task.errors()
            .messages_for(key)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn context_slot_is_coerced() {
        let task = task_with(
            vec![AttributeBuilder::new("age", true).types("integer")],
            json!({"age": "42"}),
        );
        assert_eq!(task.attribute("age"), Some(&Value::Integer(42)));
        assert!(task.errors().is_valid());
    }

    #[test]
    fn missing_required_context_key() {
        let task = task_with(vec![AttributeBuilder::new("name", true)], json!({}));
        assert_eq!(task.attribute("name"), Some(&Value::Nil));
        assert_eq!(messages(&task, "name"), ["is required"]);
    }

    #[test]
    fn default_applies_to_absent_optional_slot() {
        let task = task_with(
            vec![AttributeBuilder::new("retention_days", false)
                .default("7")
                .types("integer")],
            json!({}),
        );
        assert_eq!(task.attribute("retention_days"), Some(&Value::Integer(7)));
    }

    #[test]
    fn default_method_and_callable() {
        let task = task_with(
            vec![
                AttributeBuilder::new("a", false).default_method("settings"),
                AttributeBuilder::new("b", false).default_with(|task| task.context().fetch("seed", 1)),
                AttributeBuilder::new("c", false).default_method("missing"),
            ],
            json!({"seed": 5}),
        );
        assert_eq!(task.attribute("a"), Some(&Value::hash([("mode", "fast")])));
        assert_eq!(task.attribute("b"), Some(&Value::Integer(5)));
        assert_eq!(task.attribute("c"), Some(&Value::Nil));
        assert_eq!(messages(&task, "c"), ["delegates to undefined method missing"]);
    }

    #[test]
    fn method_source_is_read_by_key() {
        let task = task_with(
            vec![AttributeBuilder::new("mode", true).source("settings").types("symbol")],
            json!({}),
        );
        assert_eq!(task.attribute("mode"), Some(&Value::symbol("fast")));
    }

    #[test]
    fn nil_method_source_on_required_attribute() {
        let task = task_with(
            vec![AttributeBuilder::new("x", true).source("nothing")],
            json!({}),
        );
        assert_eq!(messages(&task, "x"), ["is required"]);
    }

    #[test]
    fn undefined_source_method() {
        let task = task_with(vec![AttributeBuilder::new("x", false).source("ghost")], json!({}));
        assert_eq!(task.attribute("x"), Some(&Value::Nil));
        assert_eq!(messages(&task, "x"), ["delegates to undefined method ghost"]);
    }

    #[test]
    fn scalar_source_cannot_be_derived_from() {
        let task = task_with(
            vec![AttributeBuilder::new("len", false).source_with(|_| Value::Integer(3))],
            json!({}),
        );
        assert_eq!(messages(&task, "len"), ["delegates to undefined method len"]);
    }

    #[derive(Debug)]
    struct Profile;

    impl cmdx_types::Object for Profile {
        fn respond(&self, name: &str) -> Option<Value> {
            (name == "nickname").then(|| Value::from("ace"))
        }
    }

    #[derive(Debug)]
    struct SeedLookup;

    impl cmdx_types::Object for SeedLookup {
        fn respond(&self, _name: &str) -> Option<Value> {
            None
        }

        fn is_callable(&self) -> bool {
            true
        }

        fn call(&self, context: &Context) -> Value {
            context.fetch("seed", 0)
        }
    }

    #[test]
    fn object_source_is_sent_the_attribute_name() {
        let task = task_with(
            vec![
                AttributeBuilder::new("nickname", true).source_with(|_| Value::object(Profile)),
                AttributeBuilder::new("email", false).source_with(|_| Value::object(Profile)),
            ],
            json!({}),
        );
        assert_eq!(task.attribute("nickname"), Some(&Value::from("ace")));
        assert_eq!(task.attribute("email"), Some(&Value::Nil));
        assert_eq!(messages(&task, "email"), ["delegates to undefined method email"]);
    }

    #[test]
    fn nested_attribute_reads_an_object_parent() {
        let task = task_with(
            vec![AttributeBuilder::new("profile", true)
                .source_with(|_| Value::hash([("profile", Value::object(Profile))]))
                .required("nickname", |a| a.as_name("handle"))
                .optional("email", |a| a)],
            json!({}),
        );
        assert_eq!(task.attribute("handle"), Some(&Value::from("ace")));
        assert_eq!(task.attribute("email"), Some(&Value::Nil));
        assert_eq!(messages(&task, "email"), ["delegates to undefined method email"]);
    }

    #[test]
    fn callable_object_is_invoked_for_the_slot() {
        let task = task_with(
            vec![AttributeBuilder::new("seed", true)
                .source_with(|_| Value::object(SeedLookup))
                .types("string")],
            json!({"seed": 41}),
        );
        assert_eq!(task.attribute("seed"), Some(&Value::from("41")));
        assert!(task.errors().is_valid());
    }

    #[test]
    fn same_child_name_under_different_parents() {
        let task = task_with(
            vec![
                AttributeBuilder::new("user", true).required("id", |a| a.types("integer")),
                AttributeBuilder::new("order", false).required("id", |a| a.types("integer")),
            ],
            json!({"user": {"id": "7"}, "order": {"number": 3}}),
        );
        assert_eq!(task.attribute("user.id"), Some(&Value::Integer(7)));
        assert_eq!(task.attribute("order.id"), Some(&Value::Nil));
        assert!(task.attribute("id").is_none());
        assert!(messages(&task, "user.id").is_empty());
        assert_eq!(messages(&task, "order.id"), ["is required"]);
        assert!(messages(&task, "id").is_empty());
    }

    #[test]
    fn misconfigured_validator_is_not_a_data_error() {
        let task = task_with(
            vec![AttributeBuilder::new("age", true)
                .types("integer")
                .numeric(ValidatorOptions::new().set("within", 5))
                .presence()],
            json!({"age": "30"}),
        );
        assert_eq!(task.attribute("age"), Some(&Value::Integer(30)));
        assert!(task.errors().is_valid());
        assert!(matches!(task.take_misconfigured(), Some(CmdxError::Argument(_))));
    }

    #[test]
    fn transform_runs_before_coercion() {
        let task = task_with(
            vec![
                AttributeBuilder::new("code", true).transform("shout"),
                AttributeBuilder::new("n", true)
                    .transform_with(|_, v| Value::from(format!("{v}0")))
                    .types("integer"),
                AttributeBuilder::new("m", false).transform("missing"),
            ],
            json!({"code": "ab", "n": "4", "m": "x"}),
        );
        assert_eq!(task.attribute("code"), Some(&Value::from("AB")));
        assert_eq!(task.attribute("n"), Some(&Value::Integer(40)));
        assert_eq!(messages(&task, "m"), ["delegates to undefined method missing"]);
    }

    #[test]
    fn first_matching_type_wins() {
        let task = task_with(
            vec![AttributeBuilder::new("n", true).types(["integer", "float"])],
            json!({"n": "1.5"}),
        );
        assert_eq!(task.attribute("n"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn all_types_failing_yields_one_aggregated_error() {
        let task = task_with(
            vec![AttributeBuilder::new("n", true).types(["integer", "big_decimal"])],
            json!({"n": "abc"}),
        );
        assert_eq!(
            messages(&task, "n"),
            ["could not coerce into any of: integer, big decimal"]
        );
    }

    #[test]
    fn unknown_coercion_type() {
        let task = task_with(
            vec![AttributeBuilder::new("n", true).types("money")],
            json!({"n": "$1"}),
        );
        assert_eq!(messages(&task, "n"), ["unknown money coercion type"]);
    }

    #[test]
    fn nil_skips_coercion() {
        let task = task_with(
            vec![AttributeBuilder::new("n", false).types("integer")],
            json!({}),
        );
        assert_eq!(task.attribute("n"), Some(&Value::Nil));
        assert!(task.errors().is_valid());
    }

    #[test]
    fn validators_are_independent() {
        let task = task_with(
            vec![AttributeBuilder::new("email", true)
                .presence()
                .format(ValidatorOptions::new().set("with", "@"))],
            json!({"email": "  "}),
        );
        assert_eq!(
            messages(&task, "email"),
            ["cannot be empty", "is an invalid format"]
        );
        assert_eq!(task.attribute("email"), Some(&Value::Nil));
    }

    #[test]
    fn allow_nil_skips_the_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let definition = TaskDefinition::builder("AllowNil")
            .validator("counting", move |_: &Value, _: &ValidatorOptions| -> cmdx_types::Result<()> {
                seen.fetch_add(1, Ordering::SeqCst);
                Err(CmdxError::validation("counting", Message::text("boom")))
            })
            .optional("x", |a| a.validate("counting", ValidatorOptions::new().allow_nil()))
            .build()
            .unwrap();
        let task = Task::new(definition, Context::new(), Chain::new());
        task.verify_attributes();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(task.errors().is_valid());
    }

    #[test]
    fn gated_validators() {
        let task = task_with(
            vec![
                AttributeBuilder::new("a", false).validate("presence", ValidatorOptions::new().when(false)),
                AttributeBuilder::new("b", false).validate("presence", ValidatorOptions::new().unless("ghost")),
            ],
            json!({}),
        );
        task.verify_attributes();
        assert!(messages(&task, "a").is_empty());
        assert_eq!(messages(&task, "b"), ["delegates to undefined method ghost"]);
    }

    #[test]
    fn unknown_validator_does_not_stop_others() {
        let task = task_with(
            vec![AttributeBuilder::new("a", false)
                .validate("nonsense", ValidatorOptions::new())
                .presence()],
            json!({}),
        );
        task.verify_attributes();
        assert_eq!(
            messages(&task, "a"),
            ["unknown nonsense validator type", "cannot be empty"]
        );
    }
}
