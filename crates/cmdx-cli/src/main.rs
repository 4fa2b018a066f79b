//! CLI binary for coercing values and checking contexts against CMDx
//! attribute schemas.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Deserialize;

use cmdx::{
    default_coercions, AttributeBuilder, CoercionOptions, Outcome, TaskDefinition, TaskDefinitionBuilder,
    ValidatorOptions, Value,
};

#[derive(Parser)]
#[command(name = "cmdx", version, about = "Coerce values and check contexts against CMDx schemas")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Coerce a raw value through the built-in coercions
    Coerce {
        /// Target types, tried in order (e.g. --type integer --type float)
        #[arg(short = 't', long = "type", required = true)]
        types: Vec<String>,

        /// strptime-style format for date, datetime and time
        #[arg(short, long)]
        format: Option<String>,

        /// Significant digits for big_decimal
        #[arg(short, long)]
        precision: Option<usize>,

        /// Raw value; parsed as JSON when it is valid JSON, a string otherwise
        raw: String,
    },

    /// Run a JSON-declared schema against a JSON context
    Check {
        /// Path to the schema document
        schema: PathBuf,

        /// Path to the context document
        context: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Coerce {
            types,
            format,
            precision,
            raw,
        } => cmd_coerce(&types, format, precision, &raw),
        Commands::Check { schema, context } => cmd_check(&schema, &context),
    }
}

// ---------------------------------------------------------------------------
// coerce
// ---------------------------------------------------------------------------

fn cmd_coerce(types: &[String], format: Option<String>, precision: Option<usize>, raw: &str) -> anyhow::Result<()> {
    let options = CoercionOptions { format, precision };
    match coerce(types, &options, raw) {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value.to_json())?);
            Ok(())
        }
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(1);
        }
    }
}

fn parse_raw(raw: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(raw))
}

/// First type that accepts the raw value wins.
fn coerce(types: &[String], options: &CoercionOptions, raw: &str) -> Result<Value, String> {
    let registry = default_coercions();
    let value = parse_raw(raw);
    let mut last_error = None;
    for type_name in types {
        match registry.coerce(type_name, &value, options) {
            Ok(coerced) => return Ok(coerced),
            Err(err) if err.is_registry_error() => return Err(err.to_string()),
            Err(err) => last_error = Some(err),
        }
    }
    match (types.len(), last_error) {
        (1, Some(err)) => Err(err.to_string()),
        _ => Err(format!(
            "could not coerce into any of: {}",
            types.iter().map(|t| t.replace('_', " ")).collect::<Vec<_>>().join(", ")
        )),
    }
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

/// Schema document.
///
/// Validator option values of the form `{"range": [a, b]}` become inclusive
/// ranges; `allow_nil` and `message` map to the matching options.
#[derive(Debug, Deserialize)]
struct SchemaDoc {
    #[serde(default = "default_task_name")]
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    attributes: Vec<AttributeDoc>,
}

fn default_task_name() -> String {
    "Check".to_string()
}

#[derive(Debug, Deserialize)]
struct AttributeDoc {
    name: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    types: Vec<String>,
    default: Option<serde_json::Value>,
    #[serde(rename = "as")]
    as_name: Option<String>,
    prefix: Option<String>,
    suffix: Option<String>,
    format: Option<String>,
    precision: Option<usize>,
    description: Option<String>,
    #[serde(default)]
    validators: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    children: Vec<AttributeDoc>,
}

fn load_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let source = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&source).with_context(|| format!("parsing {}", path.display()))
}

fn load_schema(path: &Path) -> anyhow::Result<SchemaDoc> {
    Ok(serde_json::from_value(load_json(path)?)?)
}

fn option_value(value: &serde_json::Value) -> Value {
    match value.get("range").and_then(serde_json::Value::as_array).map(Vec::as_slice) {
        Some([start, end]) => Value::range(Value::from(start.clone()), Value::from(end.clone())),
        _ => Value::from(value.clone()),
    }
}

fn validator_options(doc: &serde_json::Value) -> ValidatorOptions {
    let mut options = ValidatorOptions::new();
    let Some(entries) = doc.as_object() else {
        return options;
    };
    for (key, value) in entries {
        options = match (key.as_str(), value) {
            ("allow_nil", serde_json::Value::Bool(true)) => options.allow_nil(),
            ("allow_nil", _) => options,
            ("message", serde_json::Value::String(text)) => options.message(text.clone()),
            _ => options.set(key.clone(), option_value(value)),
        };
    }
    options
}

fn configure(mut builder: AttributeBuilder, doc: AttributeDoc) -> AttributeBuilder {
    if !doc.types.is_empty() {
        builder = builder.types(doc.types);
    }
    if let Some(default) = doc.default {
        builder = builder.default(Value::from(default));
    }
    if let Some(name) = doc.as_name {
        builder = builder.as_name(name);
    }
    if let Some(prefix) = doc.prefix {
        builder = builder.prefix(prefix);
    }
    if let Some(suffix) = doc.suffix {
        builder = builder.suffix(suffix);
    }
    if let Some(format) = doc.format {
        builder = builder.strptime(format);
    }
    if let Some(digits) = doc.precision {
        builder = builder.precision(digits);
    }
    if let Some(text) = doc.description {
        builder = builder.description(text);
    }
    for (name, options) in &doc.validators {
        builder = builder.validate(name.clone(), validator_options(options));
    }
    for child in doc.children {
        let (name, required) = (child.name.clone(), child.required);
        builder = if required {
            builder.required(name, |c| configure(c, child))
        } else {
            builder.optional(name, |c| configure(c, child))
        };
    }
    builder
}

fn declare(builder: TaskDefinitionBuilder, doc: AttributeDoc) -> TaskDefinitionBuilder {
    let attribute = AttributeBuilder::new(doc.name.clone(), doc.required);
    builder.declare(configure(attribute, doc))
}

fn build_definition(doc: SchemaDoc) -> anyhow::Result<Arc<TaskDefinition>> {
    let builder = doc
        .attributes
        .into_iter()
        .fold(TaskDefinition::builder(doc.name).tags(doc.tags), declare);
    Ok(builder.build()?)
}

fn check(schema: &Path, context_path: &Path) -> anyhow::Result<Outcome> {
    let definition = build_definition(load_schema(schema)?)?;
    let context = load_json(context_path)?;
    anyhow::ensure!(context.is_object(), "{} must contain a JSON object", context_path.display());
    tracing::debug!(task = %definition.name(), attributes = definition.schema().len(), "checking context");
    Ok(definition.execute(context))
}

fn cmd_check(schema: &Path, context: &Path) -> anyhow::Result<()> {
    let outcome = check(schema, context)?;
    println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
    if outcome.is_failed() {
        std::process::exit(1);
    }
    Ok(())
}
