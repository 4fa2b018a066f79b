//! Attribute schema: declarations, naming rules, and the per-definition
//! arena of [`AttributeSpec`] nodes.
//!
//! Nodes are stored flat and refer to each other by [`AttrId`]. A child's
//! default source is its parent's accessor, so nested declarations read their
//! value out of whatever the parent resolved to.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cmdx_types::{CmdxError, Result, Value};

use crate::coercion::CoercionOptions;
use crate::task::Task;
use crate::validator::ValidatorOptions;

/// Index of a node in a [`Schema`].
pub type AttrId = usize;

pub type MethodFn = Arc<dyn Fn(&Task) -> Value + Send + Sync>;
pub type TransformFn = Arc<dyn Fn(&Task, Value) -> Value + Send + Sync>;

// ---------------------------------------------------------------------------
// Option types
// ---------------------------------------------------------------------------

/// Where the container holding an attribute's slot comes from.
#[derive(Clone)]
pub enum Source {
    /// The task's context.
    Context,
    /// A message sent to the task: another accessor or a definition method.
    Method(String),
    Callable(MethodFn),
    /// The resolved value of the enclosing attribute. Implicit for nested
    /// declarations without a source of their own.
    Parent { id: AttrId, accessor: String },
}

impl Source {
    /// Name used for `prefix(true)` / `suffix(true)`.
    fn label(&self) -> Option<&str> {
        match self {
            Source::Context => Some("context"),
            Source::Method(name) => Some(name),
            Source::Parent { accessor, .. } => Some(accessor),
            Source::Callable(_) => None,
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Context => f.write_str("Context"),
            Source::Method(name) => write!(f, "Method({name})"),
            Source::Callable(_) => f.write_str("Callable"),
            Source::Parent { accessor, .. } => write!(f, "Parent({accessor})"),
        }
    }
}

/// Applied when derivation yields nil.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Callable(MethodFn),
    /// A message sent to the task.
    Method(String),
}

/// Applied to the derived value before coercion.
#[derive(Clone)]
pub enum Transform {
    /// A transform registered on the task definition under this name.
    Method(String),
    Callable(TransformFn),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Affix {
    /// Derived from the source name: `<source>_` as prefix, `_<source>` as
    /// suffix.
    Source,
    Literal(String),
}

pub trait IntoAffix {
    fn into_affix(self) -> Option<Affix>;
}

impl IntoAffix for bool {
    fn into_affix(self) -> Option<Affix> {
        self.then_some(Affix::Source)
    }
}

impl IntoAffix for &str {
    fn into_affix(self) -> Option<Affix> {
        Some(Affix::Literal(self.to_string()))
    }
}

impl IntoAffix for String {
    fn into_affix(self) -> Option<Affix> {
        Some(Affix::Literal(self))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Naming {
    pub as_name: Option<String>,
    pub prefix: Option<Affix>,
    pub suffix: Option<Affix>,
}

#[derive(Clone, Default)]
pub struct AttributeOptions {
    pub source: Option<Source>,
    pub default: Option<DefaultValue>,
    pub transform: Option<Transform>,
    pub naming: Naming,
    pub coercion: CoercionOptions,
    pub validators: Vec<(String, ValidatorOptions)>,
    pub description: Option<String>,
}

/// Attribute name lists: a single name, an array, or a vector.
pub trait IntoNames {
    fn into_names(self) -> Vec<String>;
}

impl IntoNames for &str {
    fn into_names(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoNames for String {
    fn into_names(self) -> Vec<String> {
        vec![self]
    }
}

impl<const N: usize> IntoNames for [&str; N] {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl IntoNames for &[&str] {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl IntoNames for Vec<&str> {
    fn into_names(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl IntoNames for Vec<String> {
    fn into_names(self) -> Vec<String> {
        self
    }
}

// ---------------------------------------------------------------------------
// AttributeBuilder
// ---------------------------------------------------------------------------

/// Declaration of one or more sibling attributes sharing the same options.
#[derive(Clone)]
pub struct AttributeBuilder {
    names: Vec<String>,
    required: bool,
    types: Vec<String>,
    options: AttributeOptions,
    children: Vec<AttributeBuilder>,
}

impl AttributeBuilder {
    pub fn new(names: impl IntoNames, required: bool) -> Self {
        Self {
            names: names.into_names(),
            required,
            types: Vec::new(),
            options: AttributeOptions::default(),
            children: Vec::new(),
        }
    }

    /// Coercion types, tried in order.
    pub fn types(mut self, types: impl IntoNames) -> Self {
        self.types = types.into_names();
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.options.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_with(mut self, f: impl Fn(&Task) -> Value + Send + Sync + 'static) -> Self {
        self.options.default = Some(DefaultValue::Callable(Arc::new(f)));
        self
    }

    pub fn default_method(mut self, name: impl Into<String>) -> Self {
        self.options.default = Some(DefaultValue::Method(name.into()));
        self
    }

    /// Read from the accessor or method `name`; `"context"` selects the
    /// task context.
    pub fn source(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.options.source = Some(if name == "context" {
            Source::Context
        } else {
            Source::Method(name)
        });
        self
    }

    pub fn source_with(mut self, f: impl Fn(&Task) -> Value + Send + Sync + 'static) -> Self {
        self.options.source = Some(Source::Callable(Arc::new(f)));
        self
    }

    pub fn transform(mut self, name: impl Into<String>) -> Self {
        self.options.transform = Some(Transform::Method(name.into()));
        self
    }

    pub fn transform_with(mut self, f: impl Fn(&Task, Value) -> Value + Send + Sync + 'static) -> Self {
        self.options.transform = Some(Transform::Callable(Arc::new(f)));
        self
    }

    /// Accessor name, replacing the attribute name. Only valid for a single
    /// attribute.
    pub fn as_name(mut self, name: impl Into<String>) -> Self {
        self.options.naming.as_name = Some(name.into());
        self
    }

    pub fn prefix(mut self, affix: impl IntoAffix) -> Self {
        self.options.naming.prefix = affix.into_affix();
        self
    }

    pub fn suffix(mut self, affix: impl IntoAffix) -> Self {
        self.options.naming.suffix = affix.into_affix();
        self
    }

    /// Exact parse format for date/datetime/time coercions.
    pub fn strptime(mut self, format: impl Into<String>) -> Self {
        self.options.coercion.format = Some(format.into());
        self
    }

    /// Significant digits for big decimal coercion.
    pub fn precision(mut self, digits: usize) -> Self {
        self.options.coercion.precision = Some(digits);
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.options.description = Some(text.into());
        self
    }

    /// Attach a validator by registry name.
    pub fn validate(mut self, name: impl Into<String>, options: ValidatorOptions) -> Self {
        self.options.validators.push((name.into(), options));
        self
    }

    pub fn presence(self) -> Self {
        self.validate("presence", ValidatorOptions::new())
    }

    pub fn format(self, options: ValidatorOptions) -> Self {
        self.validate("format", options)
    }

    pub fn inclusion(self, options: ValidatorOptions) -> Self {
        self.validate("inclusion", options)
    }

    pub fn exclusion(self, options: ValidatorOptions) -> Self {
        self.validate("exclusion", options)
    }

    pub fn length(self, options: ValidatorOptions) -> Self {
        self.validate("length", options)
    }

    pub fn numeric(self, options: ValidatorOptions) -> Self {
        self.validate("numeric", options)
    }

    /// Nested required attributes, read out of this attribute's value.
    pub fn required(self, names: impl IntoNames, f: impl FnOnce(AttributeBuilder) -> AttributeBuilder) -> Self {
        self.child(names, true, f)
    }

    pub fn optional(self, names: impl IntoNames, f: impl FnOnce(AttributeBuilder) -> AttributeBuilder) -> Self {
        self.child(names, false, f)
    }

    /// Same as [`optional`](Self::optional).
    pub fn attribute(self, names: impl IntoNames, f: impl FnOnce(AttributeBuilder) -> AttributeBuilder) -> Self {
        self.child(names, false, f)
    }

    fn child(
        mut self,
        names: impl IntoNames,
        required: bool,
        f: impl FnOnce(AttributeBuilder) -> AttributeBuilder,
    ) -> Self {
        self.children.push(f(AttributeBuilder::new(names, required)));
        self
    }
}

// ---------------------------------------------------------------------------
// AttributeSpec / Schema
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AttributeSpec {
    pub id: AttrId,
    pub name: String,
    pub types: Vec<String>,
    pub required: bool,
    pub options: AttributeOptions,
    /// Resolved source: explicit option, else the parent's accessor, else
    /// the context.
    pub source: Source,
    /// Accessor name on the task.
    pub method_name: String,
    /// Dotted accessor path from the root, e.g. `user.id`.
    pub path: String,
    /// Key its errors are recorded under: the accessor name, or the path
    /// when another node shares that accessor.
    pub error_key: String,
    pub parent: Option<AttrId>,
    pub children: Vec<AttrId>,
}

impl fmt::Debug for AttributeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeSpec")
            .field("name", &self.name)
            .field("method_name", &self.method_name)
            .field("path", &self.path)
            .field("types", &self.types)
            .field("required", &self.required)
            .field("source", &self.source)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .finish()
    }
}

/// Accessor name: `as` verbatim, otherwise the name wrapped in its prefix
/// and suffix.
fn method_name(name: &str, naming: &Naming, source: &Source) -> Result<String> {
    if let Some(as_name) = &naming.as_name {
        return Ok(as_name.clone());
    }
    let source_label = || {
        source.label().ok_or_else(|| {
            CmdxError::Argument(format!(
                "attribute '{name}' cannot derive a prefix or suffix from a callable source"
            ))
        })
    };
    let prefix = match &naming.prefix {
        Some(Affix::Source) => format!("{}_", source_label()?),
        Some(Affix::Literal(text)) => text.clone(),
        None => String::new(),
    };
    let suffix = match &naming.suffix {
        Some(Affix::Source) => format!("_{}", source_label()?),
        Some(Affix::Literal(text)) => text.clone(),
        None => String::new(),
    };
    Ok(format!("{prefix}{name}{suffix}"))
}

/// Flat arena of every attribute declared on a task definition.
///
/// Accessor names are unique among siblings only. Lookups accept a dotted
/// path (`order.id`) or a bare accessor name, which resolves to the root
/// attribute of that name or else to the single nested one carrying it.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    nodes: Vec<AttributeSpec>,
    roots: Vec<AttrId>,
    accessors: HashMap<String, AttrId>,
}

impl Schema {
    /// Build the arena from top-level declarations. `reserved` names (task
    /// methods) may not be reused as accessors.
    pub fn build<'a>(
        declarations: Vec<AttributeBuilder>,
        reserved: impl IntoIterator<Item = &'a str>,
    ) -> Result<Schema> {
        let mut schema = Schema::default();
        let reserved: Vec<&str> = reserved.into_iter().collect();
        for declaration in declarations {
            let ids = schema.insert(declaration, None, &reserved)?;
            schema.roots.extend(ids);
        }
        schema.index_accessors();
        Ok(schema)
    }

    fn index_accessors(&mut self) {
        let mut shared: HashMap<&str, usize> = HashMap::new();
        for node in &self.nodes {
            *shared.entry(node.method_name.as_str()).or_default() += 1;
        }
        let ambiguous: Vec<bool> = self
            .nodes
            .iter()
            .map(|node| shared[node.method_name.as_str()] > 1)
            .collect();

        let mut accessors: HashMap<String, AttrId> = self
            .nodes
            .iter()
            .map(|node| (node.path.clone(), node.id))
            .collect();
        for (node, ambiguous) in self.nodes.iter_mut().zip(ambiguous) {
            if ambiguous {
                node.error_key = node.path.clone();
            } else {
                accessors.entry(node.method_name.clone()).or_insert(node.id);
            }
        }
        self.accessors = accessors;
    }

    fn insert(&mut self, declaration: AttributeBuilder, parent: Option<AttrId>, reserved: &[&str]) -> Result<Vec<AttrId>> {
        let AttributeBuilder {
            names,
            required,
            types,
            options,
            children,
        } = declaration;

        if names.is_empty() {
            return Err(CmdxError::Argument("no attributes given".into()));
        }
        if names.len() > 1 && options.naming.as_name.is_some() {
            return Err(CmdxError::Argument(
                "the 'as' option only supports one attribute per definition".into(),
            ));
        }

        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let source = match (&options.source, parent) {
                (Some(source), _) => source.clone(),
                (None, Some(parent)) => Source::Parent {
                    id: parent,
                    accessor: self.nodes[parent].method_name.clone(),
                },
                (None, None) => Source::Context,
            };
            let accessor = method_name(&name, &options.naming, &source)?;
            if accessor == "context" || reserved.contains(&accessor.as_str()) {
                return Err(CmdxError::Argument(format!(
                    "attribute accessor '{accessor}' conflicts with an existing method"
                )));
            }
            let siblings = match parent {
                Some(parent) => &self.nodes[parent].children,
                None => &self.roots,
            };
            if siblings
                .iter()
                .chain(&ids)
                .any(|&sibling| self.nodes[sibling].method_name == accessor)
            {
                return Err(CmdxError::Argument(format!(
                    "attribute accessor '{accessor}' is already defined"
                )));
            }

            let path = match parent {
                Some(parent) => format!("{}.{accessor}", self.nodes[parent].path),
                None => accessor.clone(),
            };
            let id = self.nodes.len();
            self.nodes.push(AttributeSpec {
                id,
                name,
                types: types.clone(),
                required,
                options: options.clone(),
                source,
                method_name: accessor.clone(),
                path,
                error_key: accessor,
                parent,
                children: Vec::new(),
            });

            for child in children.iter().cloned() {
                let child_ids = self.insert(child, Some(id), reserved)?;
                self.nodes[id].children.extend(child_ids);
            }
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn node(&self, id: AttrId) -> &AttributeSpec {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[AttributeSpec] {
        &self.nodes
    }

    pub fn roots(&self) -> &[AttrId] {
        &self.roots
    }

    /// Node behind an accessor name or dotted path.
    pub fn accessor(&self, method_name: &str) -> Option<AttrId> {
        self.accessors.get(method_name).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a nil source on `id` is an error: the node is required and so
    /// is its parent, if it has one.
    pub fn required_in_scope(&self, id: AttrId) -> bool {
        let node = &self.nodes[id];
        node.required && node.parent.map_or(true, |parent| self.nodes[parent].required)
    }

    pub fn node_json(&self, id: AttrId) -> serde_json::Value {
        let node = &self.nodes[id];
        let source = match &node.source {
            Source::Context => "context".to_string(),
            Source::Method(name) => name.clone(),
            Source::Parent { accessor, .. } => accessor.clone(),
            Source::Callable(_) => "callable".to_string(),
        };
        let validators: Vec<&str> = node
            .options
            .validators
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        serde_json::json!({
            "name": node.name,
            "method": node.method_name,
            "path": node.path,
            "required": node.required,
            "types": node.types,
            "source": source,
            "description": node.options.description,
            "validators": validators,
            "children": node.children.iter().map(|c| self.node_json(*c)).collect::<Vec<_>>(),
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.roots.iter().map(|id| self.node_json(*id)).collect())
    }
}
