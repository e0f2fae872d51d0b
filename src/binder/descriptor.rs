//! Entry-point and parameter descriptors.
//!
//! Descriptors are built once at registration and never change afterwards.
//! A parameter's origin is a closed [`ParameterSource`] sum type, so request
//! time binding is a single `match`.

use http::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::args::{Args, Reply};
use super::invoker::CallContext;
use crate::exchange::ScopeKind;
use crate::filter::Filter;

/// Signature shared by handlers, filter gates, exit hooks and constructors.
pub type Callable =
    Arc<dyn Fn(&mut CallContext<'_>, Args) -> anyhow::Result<Reply> + Send + Sync>;

/// Element type a parameter is converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Text,
    Bool,
    Int,
    Float,
    /// Calendar date, `YYYY-MM-DD`
    Date,
    /// RFC 3339 timestamp
    DateTime,
    /// Arbitrary JSON parsed from the raw string
    Json,
    /// Raw bytes
    Bytes,
    /// Uploaded file handle
    File,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Text => "text",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Date => "date",
            ValueKind::DateTime => "date_time",
            ValueKind::Json => "json",
            ValueKind::Bytes => "bytes",
            ValueKind::File => "file",
        }
    }
}

/// Declared type of a parameter: an element kind, optionally as a list.
///
/// Written `int`, `text[]`, `file[]` and so on in manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetType {
    pub kind: ValueKind,
    pub list: bool,
}

impl TargetType {
    pub const TEXT: TargetType = TargetType::scalar(ValueKind::Text);

    pub const fn scalar(kind: ValueKind) -> Self {
        Self { kind, list: false }
    }

    pub const fn list_of(kind: ValueKind) -> Self {
        Self { kind, list: true }
    }
}

impl Default for TargetType {
    fn default() -> Self {
        Self::TEXT
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_str())?;
        if self.list {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (base, list) = match s.strip_suffix("[]") {
            Some(base) => (base.trim_end(), true),
            None => (s, false),
        };
        let kind = match base.to_ascii_lowercase().as_str() {
            "text" | "string" => ValueKind::Text,
            "bool" | "boolean" => ValueKind::Bool,
            "int" | "integer" => ValueKind::Int,
            "float" | "number" => ValueKind::Float,
            "date" => ValueKind::Date,
            "date_time" | "datetime" => ValueKind::DateTime,
            "json" => ValueKind::Json,
            "bytes" => ValueKind::Bytes,
            "file" => ValueKind::File,
            other => return Err(format!("unknown parameter type `{other}`")),
        };
        if list && kind == ValueKind::Bytes {
            return Err("`bytes[]` is not a supported parameter type".to_string());
        }
        Ok(Self { kind, list })
    }
}

impl TryFrom<String> for TargetType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TargetType> for String {
    fn from(value: TargetType) -> Self {
        value.to_string()
    }
}

/// Where a parameter's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ParameterSource {
    /// The full request path, percent-decoded.
    RawPath,
    /// The last path segment, percent-decoded.
    PathFile,
    QueryString,
    PathVariable { name: String },
    /// Suffix captured by a `*` route.
    PathRemainder,
    Request,
    Response,
    Session,
    Context,
    Header { name: String },
    HeaderMap,
    Method,
    Cookie { name: String },
    Attribute {
        name: String,
        #[serde(default)]
        scope: ScopeKind,
    },
    /// Query/form parameter, or multipart part of that name.
    Parameter { name: String },
    ParameterMap,
    Body,
    Model { name: String },
}

impl ParameterSource {
    /// Name used for this argument in logs and echo output.
    pub fn label(&self) -> &str {
        match self {
            ParameterSource::PathVariable { name }
            | ParameterSource::Header { name }
            | ParameterSource::Cookie { name }
            | ParameterSource::Attribute { name, .. }
            | ParameterSource::Parameter { name }
            | ParameterSource::Model { name } => name,
            ParameterSource::RawPath => "raw_path",
            ParameterSource::PathFile => "path_file",
            ParameterSource::QueryString => "query_string",
            ParameterSource::PathRemainder => "path_remainder",
            ParameterSource::Request => "request",
            ParameterSource::Response => "response",
            ParameterSource::Session => "session",
            ParameterSource::Context => "context",
            ParameterSource::HeaderMap => "header_map",
            ParameterSource::Method => "method",
            ParameterSource::ParameterMap => "parameter_map",
            ParameterSource::Body => "body",
        }
    }
}

/// One declared handler parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    #[serde(flatten)]
    pub source: ParameterSource,
    #[serde(rename = "type", default)]
    pub target: TargetType,
    /// `None` defers to the dispatcher-wide default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<bool>,
}

impl ParameterDescriptor {
    pub fn new(source: ParameterSource, target: TargetType) -> Self {
        Self {
            source,
            target,
            trim: None,
        }
    }

    /// A parameter whose value is injected rather than converted.
    pub fn injected(source: ParameterSource) -> Self {
        Self::new(source, TargetType::TEXT)
    }

    pub fn path_variable(name: impl Into<String>, target: TargetType) -> Self {
        Self::new(ParameterSource::PathVariable { name: name.into() }, target)
    }

    pub fn parameter(name: impl Into<String>, target: TargetType) -> Self {
        Self::new(ParameterSource::Parameter { name: name.into() }, target)
    }

    pub fn header(name: impl Into<String>, target: TargetType) -> Self {
        Self::new(ParameterSource::Header { name: name.into() }, target)
    }

    pub fn cookie(name: impl Into<String>, target: TargetType) -> Self {
        Self::new(ParameterSource::Cookie { name: name.into() }, target)
    }

    pub fn attribute(name: impl Into<String>, scope: ScopeKind, target: TargetType) -> Self {
        Self::new(
            ParameterSource::Attribute {
                name: name.into(),
                scope,
            },
            target,
        )
    }

    pub fn model(name: impl Into<String>) -> Self {
        Self::new(ParameterSource::Model { name: name.into() }, TargetType::scalar(ValueKind::Json))
    }

    pub fn body(target: TargetType) -> Self {
        Self::new(ParameterSource::Body, target)
    }

    #[must_use]
    pub fn trimmed(mut self, trim: bool) -> Self {
        self.trim = Some(trim);
        self
    }
}

/// How a handler's reply is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Raw content written to the response body.
    #[default]
    Content,
    /// A file sent as a download.
    Attachment,
    /// A view name plus model, handed to the rendering stage.
    View,
}

impl OutputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputKind::Content => "content",
            OutputKind::Attachment => "attachment",
            OutputKind::View => "view",
        }
    }
}

/// A registered entry point: controller handler, filter gate, exit hook or
/// attribute/model constructor.
#[derive(Clone)]
pub struct HandlerDescriptor {
    pub name: String,
    pub component: String,
    pub package: String,
    pub output: OutputKind,
    pub methods: Vec<Method>,
    /// Method-level filter names, as declared.
    pub filter_names: Vec<String>,
    /// Effective chain: package, then component, then method filters.
    /// Filled in by the registry.
    pub chain: Vec<Arc<Filter>>,
    pub params: Vec<ParameterDescriptor>,
    callable: Callable,
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("component", &self.component)
            .field("package", &self.package)
            .field("output", &self.output)
            .field("methods", &self.methods)
            .field("filter_names", &self.filter_names)
            .field("chain", &self.chain.iter().map(|f| f.name.as_str()).collect::<Vec<_>>())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl HandlerDescriptor {
    pub fn builder<F>(name: impl Into<String>, callable: F) -> HandlerBuilder
    where
        F: Fn(&mut CallContext<'_>, Args) -> anyhow::Result<Reply> + Send + Sync + 'static,
    {
        HandlerBuilder::new(name.into(), Arc::new(callable))
    }

    /// Builder around an already shared callable.
    pub fn builder_with(name: impl Into<String>, callable: Callable) -> HandlerBuilder {
        HandlerBuilder::new(name.into(), callable)
    }

    pub(crate) fn call(&self, ctx: &mut CallContext<'_>, args: Args) -> anyhow::Result<Reply> {
        (self.callable)(ctx, args)
    }
}

pub struct HandlerBuilder {
    descriptor: HandlerDescriptor,
}

impl HandlerBuilder {
    fn new(name: String, callable: Callable) -> Self {
        Self {
            descriptor: HandlerDescriptor {
                name,
                component: String::new(),
                package: String::new(),
                output: OutputKind::Content,
                methods: Vec::new(),
                filter_names: Vec::new(),
                chain: Vec::new(),
                params: Vec::new(),
                callable,
            },
        }
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.descriptor.component = component.into();
        self
    }

    /// `::`-separated package path; filters of every ancestor package apply.
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.descriptor.package = package.into();
        self
    }

    pub fn output(mut self, output: OutputKind) -> Self {
        self.descriptor.output = output;
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        if !self.descriptor.methods.contains(&method) {
            self.descriptor.methods.push(method);
        }
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        for method in methods {
            self = self.method(method);
        }
        self
    }

    pub fn param(mut self, param: ParameterDescriptor) -> Self {
        self.descriptor.params.push(param);
        self
    }

    pub fn params(mut self, params: impl IntoIterator<Item = ParameterDescriptor>) -> Self {
        self.descriptor.params.extend(params);
        self
    }

    pub fn filter(mut self, name: impl Into<String>) -> Self {
        self.descriptor.filter_names.push(name.into());
        self
    }

    pub fn build(self) -> HandlerDescriptor {
        self.descriptor
    }
}
