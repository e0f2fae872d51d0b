//! Entry-point invoker.
//!
//! Builds the argument list for a [`HandlerDescriptor`] from the live
//! exchange and invokes its callable. Handlers, filter gates, exit hooks and
//! attribute/model constructors all go through [`Invoker::invoke`].

use once_cell::unsync::OnceCell;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::args::{Arg, Args, Reply, UploadedFile};
use super::convert::{Converter, StandardConverter};
use super::descriptor::{HandlerDescriptor, ParameterDescriptor, ParameterSource, TargetType, ValueKind};
use super::drivers::{BodyFormat, Drivers};
use super::model::{populate, ModelSources};
use crate::error::{ConversionError, DispatchError};
use crate::exchange::{carries_body, Exchange, Request, Response, ScopeKind, SharedScope};
use crate::ids::RequestId;
use crate::multipart::{is_multipart, Part, Parts};
use crate::router::ParamVec;

/// Per-request values extracted before any entry point runs.
#[derive(Debug, Default)]
pub struct RequestInputs {
    pub path_params: ParamVec,
    pub remainder: Option<String>,
    pub cookies: HashMap<String, String>,
    pub parts: Option<Parts>,
}

impl RequestInputs {
    /// Path variable by name, last capture wins.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| &**k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Everything a callable can reach while it runs.
pub struct CallContext<'a> {
    exchange: &'a mut Exchange,
    inputs: &'a RequestInputs,
    request_id: RequestId,
    constructing: Vec<String>,
}

impl<'a> CallContext<'a> {
    pub fn new(exchange: &'a mut Exchange, inputs: &'a RequestInputs, request_id: RequestId) -> Self {
        Self {
            exchange,
            inputs,
            request_id,
            constructing: Vec::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.exchange.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.exchange.request
    }

    pub fn response(&self) -> &Response {
        &self.exchange.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.exchange.response
    }

    /// Substitute the request for the rest of the chain.
    pub fn replace_request(&mut self, request: Request) -> Request {
        self.exchange.replace_request(request)
    }

    /// Substitute the response for the rest of the chain.
    pub fn replace_response(&mut self, response: Response) -> Response {
        self.exchange.replace_response(response)
    }

    pub fn inputs(&self) -> &RequestInputs {
        self.inputs
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }
}

/// Values computed at most once per invocation.
#[derive(Default)]
struct Lazy {
    path: OnceCell<String>,
    path_file: OnceCell<String>,
    body: OnceCell<Vec<u8>>,
}

impl Lazy {
    fn path(&self, request: &Request) -> &str {
        self.path.get_or_init(|| {
            urlencoding::decode(request.path())
                .map(|p| p.into_owned())
                .unwrap_or_else(|_| request.path().to_string())
        })
    }

    fn path_file(&self, request: &Request) -> &str {
        self.path_file.get_or_init(|| {
            let last = request
                .path()
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default();
            urlencoding::decode(last)
                .map(|p| p.into_owned())
                .unwrap_or_else(|_| last.to_string())
        })
    }

    fn body(&self, request: &mut Request) -> std::io::Result<&[u8]> {
        self.body
            .get_or_try_init(|| request.body_bytes().map(<[u8]>::to_vec))
            .map(Vec::as_slice)
    }
}

/// A named model: its template fields and optional constructor.
#[derive(Debug, Clone)]
pub struct ModelDef {
    pub template: Value,
    pub constructor: Option<Arc<HandlerDescriptor>>,
}

#[derive(Clone)]
pub struct Invoker {
    converter: Arc<dyn Converter>,
    drivers: Drivers,
    constructors: Arc<HashMap<String, Arc<HandlerDescriptor>>>,
    models: Arc<HashMap<String, ModelDef>>,
    trim_by_default: bool,
}

impl Default for Invoker {
    fn default() -> Self {
        Self {
            converter: Arc::new(StandardConverter),
            drivers: Drivers::default(),
            constructors: Arc::new(HashMap::new()),
            models: Arc::new(HashMap::new()),
            trim_by_default: false,
        }
    }
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("drivers", &self.drivers)
            .field("constructors", &self.constructors.keys().collect::<Vec<_>>())
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .field("trim_by_default", &self.trim_by_default)
            .finish_non_exhaustive()
    }
}

fn into_dispatch_error(entry: &str, err: anyhow::Error) -> DispatchError {
    match err.downcast::<DispatchError>() {
        Ok(dispatch) => dispatch,
        Err(source) => DispatchError::Handler {
            entry: entry.to_string(),
            source,
        },
    }
}

fn conversion(param: &str, source: ConversionError) -> DispatchError {
    DispatchError::Conversion {
        param: param.to_string(),
        source,
    }
}

fn empty_for(target: TargetType) -> Arg {
    match (target.kind, target.list) {
        (ValueKind::File, false) => Arg::File(None),
        (ValueKind::File, true) => Arg::Files(Vec::new()),
        (_, true) => Arg::Value(Value::Array(Vec::new())),
        (_, false) => Arg::Value(Value::Null),
    }
}

/// Value of a freshly default-constructed attribute, where one exists.
fn default_instance(target: TargetType) -> Option<Value> {
    if target.list {
        return Some(Value::Array(Vec::new()));
    }
    match target.kind {
        ValueKind::Text => Some(Value::String(String::new())),
        ValueKind::Bool => Some(Value::Bool(false)),
        ValueKind::Int => Some(Value::from(0)),
        ValueKind::Float => Some(Value::from(0.0)),
        ValueKind::Json => Some(Value::Object(Map::new())),
        ValueKind::Date | ValueKind::DateTime | ValueKind::Bytes | ValueKind::File => None,
    }
}

fn trim_value(value: Value, trim: bool) -> Value {
    match value {
        Value::String(s) if trim => Value::String(s.trim().to_string()),
        other => other,
    }
}

impl Invoker {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = converter;
        self
    }

    #[must_use]
    pub fn with_drivers(mut self, drivers: Drivers) -> Self {
        self.drivers = drivers;
        self
    }

    #[must_use]
    pub fn with_constructors(mut self, constructors: HashMap<String, Arc<HandlerDescriptor>>) -> Self {
        self.constructors = Arc::new(constructors);
        self
    }

    #[must_use]
    pub fn with_models(mut self, models: HashMap<String, ModelDef>) -> Self {
        self.models = Arc::new(models);
        self
    }

    #[must_use]
    pub fn with_trim_by_default(mut self, trim: bool) -> Self {
        self.trim_by_default = trim;
        self
    }

    /// Bind arguments and run `descriptor`'s callable.
    ///
    /// Errors returned by the callable are wrapped as
    /// [`DispatchError::Handler`], unless the callable returned a
    /// [`DispatchError`] itself, which passes through unchanged.
    ///
    /// # Errors
    ///
    /// Binding failures and callable failures.
    pub fn invoke(&self, descriptor: &HandlerDescriptor, ctx: &mut CallContext<'_>) -> Result<Reply, DispatchError> {
        let start = Instant::now();
        info!(
            request_id = %ctx.request_id,
            handler_name = %descriptor.name,
            component = %descriptor.component,
            "Handler execution start"
        );

        let args = self.bind(descriptor, ctx)?;
        let result = descriptor.call(ctx, args);
        let execution_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(reply) => {
                info!(
                    request_id = %ctx.request_id,
                    handler_name = %descriptor.name,
                    execution_time_ms,
                    reply = reply.kind(),
                    "Handler execution complete"
                );
                Ok(reply)
            }
            Err(err) => {
                let err = into_dispatch_error(&descriptor.name, err);
                warn!(
                    request_id = %ctx.request_id,
                    handler_name = %descriptor.name,
                    execution_time_ms,
                    error = %err,
                    "Handler execution failed"
                );
                Err(err)
            }
        }
    }

    /// Resolve every declared parameter, in declared order.
    ///
    /// # Errors
    ///
    /// The first parameter that fails to resolve.
    pub fn bind(&self, descriptor: &HandlerDescriptor, ctx: &mut CallContext<'_>) -> Result<Args, DispatchError> {
        let lazy = Lazy::default();
        let mut args = Args::with_capacity(descriptor.params.len());
        for param in &descriptor.params {
            let arg = self.resolve(param, ctx, &lazy)?;
            debug!(
                request_id = %ctx.request_id,
                handler_name = %descriptor.name,
                param = param.source.label(),
                "Parameter bound"
            );
            args.push(param.source.label(), arg);
        }
        Ok(args)
    }

    fn resolve(&self, param: &ParameterDescriptor, ctx: &mut CallContext<'_>, lazy: &Lazy) -> Result<Arg, DispatchError> {
        let trim = param.trim.unwrap_or(self.trim_by_default);
        let target = param.target;
        let label = param.source.label();

        match &param.source {
            ParameterSource::RawPath => {
                let path = lazy.path(&ctx.exchange.request);
                self.single(label, Some(path), target, trim)
            }
            ParameterSource::PathFile => {
                let file = lazy.path_file(&ctx.exchange.request);
                self.single(label, Some(file), target, trim)
            }
            ParameterSource::QueryString => self.single(label, ctx.exchange.request.query(), target, trim),
            ParameterSource::PathVariable { name } => self.single(label, ctx.inputs.path_param(name), target, trim),
            ParameterSource::PathRemainder => {
                self.single(label, ctx.inputs.remainder.as_deref(), target, trim)
            }
            ParameterSource::Request => Ok(Arg::Request),
            ParameterSource::Response => Ok(Arg::Response),
            ParameterSource::Session => Ok(Arg::Session(ctx.exchange.request.session().cloned())),
            ParameterSource::Context => Ok(Arg::Context(Arc::clone(ctx.exchange.request.context()))),
            ParameterSource::Header { name } => {
                let values: Vec<&str> = ctx
                    .exchange
                    .request
                    .headers()
                    .get_all(name.as_str())
                    .iter()
                    .filter_map(|v| v.to_str().ok())
                    .collect();
                self.raw_values(label, &values, target, trim)
            }
            ParameterSource::HeaderMap => Ok(Arg::Headers(ctx.exchange.request.headers().clone())),
            ParameterSource::Method => Ok(Arg::Method(ctx.exchange.request.method().clone())),
            ParameterSource::Cookie { name } => {
                self.single(label, ctx.inputs.cookies.get(name).map(String::as_str), target, trim)
            }
            ParameterSource::Attribute { name, scope } => {
                let value = self.attribute(name, *scope, target, ctx)?;
                Ok(Arg::Value(trim_value(value, trim)))
            }
            ParameterSource::Parameter { name } => self.parameter(name, target, trim, ctx),
            ParameterSource::ParameterMap => self.parameter_map(ctx),
            ParameterSource::Body => self.body(target, trim, ctx, lazy),
            ParameterSource::Model { name } => self.model(name, ctx).map(Arg::Value),
        }
    }

    /// Convert one optional raw string. List targets split on commas.
    fn single(&self, label: &str, raw: Option<&str>, target: TargetType, trim: bool) -> Result<Arg, DispatchError> {
        let Some(raw) = raw else {
            return Ok(empty_for(target));
        };
        let raw = if trim { raw.trim() } else { raw };
        if target.list {
            let items: Vec<&str> = raw.split(',').collect();
            return self.many(label, &items, target, trim);
        }
        match target.kind {
            ValueKind::Bytes => Ok(Arg::Bytes(raw.as_bytes().to_vec())),
            kind => self
                .converter
                .convert(raw, kind)
                .map(Arg::Value)
                .map_err(|e| conversion(label, e)),
        }
    }

    /// Bind every raw occurrence of a source. A lone value for a list
    /// target goes through [`Self::single`] so it is split on commas.
    fn raw_values(&self, label: &str, raws: &[&str], target: TargetType, trim: bool) -> Result<Arg, DispatchError> {
        match raws {
            [one] => self.single(label, Some(*one), target, trim),
            _ if target.list => self.many(label, raws, target, trim),
            _ => self.single(label, raws.first().copied(), target, trim),
        }
    }

    fn many(&self, label: &str, raws: &[&str], target: TargetType, trim: bool) -> Result<Arg, DispatchError> {
        let items: Vec<&str> = if trim {
            raws.iter().map(|r| r.trim()).collect()
        } else {
            raws.to_vec()
        };
        self.converter
            .convert_all(&items, target.kind)
            .map(Arg::Value)
            .map_err(|e| conversion(label, e))
    }

    fn parameter(&self, name: &str, target: TargetType, trim: bool, ctx: &mut CallContext<'_>) -> Result<Arg, DispatchError> {
        if let Some(parts) = ctx.inputs.parts.as_ref().filter(|p| p.contains(name)) {
            let matching: Vec<&Part> = if target.list {
                parts.get_all(name).collect()
            } else {
                parts.get(name).into_iter().collect()
            };
            return self.from_parts(name, &matching, target, trim);
        }

        if target.kind == ValueKind::File {
            return Ok(empty_for(target));
        }
        let values: Vec<String> = ctx
            .exchange
            .request
            .parameters()?
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .collect();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        self.raw_values(name, &refs, target, trim)
    }

    fn from_parts(&self, name: &str, parts: &[&Part], target: TargetType, trim: bool) -> Result<Arg, DispatchError> {
        match target.kind {
            ValueKind::File if target.list => Ok(Arg::Files(
                parts.iter().filter_map(|p| UploadedFile::from_part(p)).collect(),
            )),
            ValueKind::File => Ok(Arg::File(parts.first().and_then(|p| UploadedFile::from_part(p)))),
            ValueKind::Bytes => match parts.first() {
                Some(part) => match (part.path(), part.value()) {
                    (Some(path), _) => Ok(Arg::Bytes(std::fs::read(path)?)),
                    (None, value) => Ok(Arg::Bytes(value.unwrap_or_default().as_bytes().to_vec())),
                },
                None => Ok(Arg::Value(Value::Null)),
            },
            _ => {
                // Upload parts bind as their file name.
                let raws: Vec<&str> = parts
                    .iter()
                    .map(|p| p.file_name.as_deref().or(p.value()).unwrap_or_default())
                    .collect();
                if target.list {
                    self.many(name, &raws, target, trim)
                } else {
                    self.single(name, raws.first().copied(), target, trim)
                }
            }
        }
    }

    fn parameter_map(&self, ctx: &mut CallContext<'_>) -> Result<Arg, DispatchError> {
        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        let add = |grouped: &mut Vec<(String, Vec<String>)>, key: &str, value: String| {
            match grouped.iter_mut().find(|(k, _)| k == key) {
                Some((_, values)) => values.push(value),
                None => grouped.push((key.to_string(), vec![value])),
            }
        };

        let parts = ctx.inputs.parts.as_ref();
        for (key, value) in ctx.exchange.request.parameters()? {
            if !parts.is_some_and(|p| p.contains(key)) {
                add(&mut grouped, key, value.clone());
            }
        }
        for part in parts.into_iter().flatten() {
            let raw = part.file_name.as_deref().or(part.value()).unwrap_or_default();
            add(&mut grouped, &part.name, raw.to_string());
        }

        let map: Map<String, Value> = grouped
            .into_iter()
            .map(|(key, mut values)| {
                let value = if values.len() == 1 {
                    Value::String(values.remove(0))
                } else {
                    Value::Array(values.into_iter().map(Value::String).collect())
                };
                (key, value)
            })
            .collect();
        Ok(Arg::Value(Value::Object(map)))
    }

    fn body(&self, target: TargetType, trim: bool, ctx: &mut CallContext<'_>, lazy: &Lazy) -> Result<Arg, DispatchError> {
        let request = &mut ctx.exchange.request;
        if !carries_body(request.method()) || request.content_type().is_some_and(is_multipart) {
            return Ok(empty_for(target));
        }
        let format = BodyFormat::from_content_type(request.content_type());
        let driver = self.drivers.for_format(format)?;
        let bytes = lazy.body(request)?;

        if let Some(driver) = driver {
            if bytes.is_empty() {
                return Ok(Arg::Value(Value::Null));
            }
            return driver.decode(bytes).map(Arg::Value);
        }
        if target.kind == ValueKind::Bytes {
            return Ok(Arg::Bytes(bytes.to_vec()));
        }
        let text = String::from_utf8_lossy(bytes);
        self.single("body", Some(text.as_ref()), target, trim)
    }

    fn attribute(&self, name: &str, scope: ScopeKind, target: TargetType, ctx: &mut CallContext<'_>) -> Result<Value, DispatchError> {
        let constructor = self.constructors.get(name).cloned();
        let not_found = || DispatchError::AttributeNotFound {
            name: name.to_string(),
            scope: scope.as_str(),
        };

        match scope {
            ScopeKind::Request => {
                if let Some(existing) = ctx.exchange.request.attribute(name) {
                    return Ok(existing.clone());
                }
                match constructor {
                    Some(c) => {
                        let value = self.construct(name, &c, ctx)?;
                        ctx.exchange.request.set_attribute(name, value.clone());
                        Ok(value)
                    }
                    None => default_instance(target).ok_or_else(not_found),
                }
            }
            ScopeKind::Session => {
                let session = ctx.exchange.request.session().cloned().ok_or_else(not_found)?;
                self.shared(name, session.attributes(), constructor, target, ctx)
                    .and_then(|v| v.ok_or_else(not_found))
            }
            ScopeKind::Application => {
                let app = Arc::clone(ctx.exchange.request.context());
                self.shared(name, app.attributes(), constructor, target, ctx)
                    .and_then(|v| v.ok_or_else(not_found))
            }
        }
    }

    fn shared(
        &self,
        name: &str,
        store: &SharedScope,
        constructor: Option<Arc<HandlerDescriptor>>,
        target: TargetType,
        ctx: &mut CallContext<'_>,
    ) -> Result<Option<Value>, DispatchError> {
        match constructor {
            Some(c) => store
                .get_or_try_insert_with(name, || self.construct(name, &c, ctx))
                .map(Some),
            None => Ok(store.get(name).or_else(|| default_instance(target))),
        }
    }

    /// Run a constructor through this invoker, guarding against cycles.
    fn construct(&self, name: &str, constructor: &HandlerDescriptor, ctx: &mut CallContext<'_>) -> Result<Value, DispatchError> {
        if ctx.constructing.iter().any(|n| n == name) {
            let mut cycle = ctx.constructing.clone();
            cycle.push(name.to_string());
            return Err(DispatchError::BeanCreation {
                name: name.to_string(),
                reason: format!("circular dependency {}", cycle.join(" -> ")),
            });
        }

        ctx.constructing.push(name.to_string());
        let result = self.invoke(constructor, ctx);
        ctx.constructing.pop();

        let reply = result.map_err(|err| match err {
            DispatchError::Handler { source, .. } => DispatchError::BeanCreation {
                name: name.to_string(),
                reason: format!("{source:#}"),
            },
            other => other,
        })?;
        match reply {
            Reply::Value(value) => Ok(value),
            Reply::Text(text) => Ok(Value::String(text)),
            Reply::Empty => Ok(Value::Null),
            other => Err(DispatchError::BeanCreation {
                name: name.to_string(),
                reason: format!("constructor returned {}", other.kind()),
            }),
        }
    }

    fn model(&self, name: &str, ctx: &mut CallContext<'_>) -> Result<Value, DispatchError> {
        let def = self.models.get(name).cloned();
        let initial = match def.as_ref().and_then(|d| d.constructor.clone()) {
            Some(c) => self.construct(name, &c, ctx)?,
            None => def.map_or_else(|| Value::Object(Map::new()), |d| d.template),
        };
        let Value::Object(mut fields) = initial else {
            return Err(DispatchError::BeanCreation {
                name: name.to_string(),
                reason: "a model must be a JSON object".to_string(),
            });
        };

        let mut params = ctx.exchange.request.parameters()?.to_vec();
        if let Some(parts) = &ctx.inputs.parts {
            params.extend(
                parts
                    .iter()
                    .filter_map(|p| p.value().map(|v| (p.name.clone(), v.to_string()))),
            );
        }
        let session = ctx.exchange.request.session().cloned();
        let app = Arc::clone(ctx.exchange.request.context());
        populate(
            name,
            &mut fields,
            &ModelSources {
                params: &params,
                session: session.as_deref().map(|s| s.attributes()),
                application: app.attributes(),
            },
            self.converter.as_ref(),
        )?;

        let value = Value::Object(fields);
        ctx.exchange.request.set_attribute(name, value.clone());
        Ok(value)
    }
}

