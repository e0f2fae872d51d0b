use anyhow::{anyhow, Context};
use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use crate::exchange::{AppContext, Session};
use crate::multipart::Part;

/// Handle to an uploaded file. The file itself belongs to the request and
/// is removed once the dispatch finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub path: PathBuf,
}

impl UploadedFile {
    pub(crate) fn from_part(part: &Part) -> Option<Self> {
        Some(Self {
            field: part.name.clone(),
            file_name: part.file_name.clone()?,
            content_type: part.content_type.clone(),
            path: part.path()?.to_path_buf(),
        })
    }

    /// # Errors
    ///
    /// The temp file could not be read.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }
}

/// A bound argument.
///
/// `Request` and `Response` are markers: the live objects are reachable
/// through the call context handed to the callable.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Bytes(Vec<u8>),
    File(Option<UploadedFile>),
    Files(Vec<UploadedFile>),
    Headers(HeaderMap),
    Method(Method),
    Session(Option<Arc<Session>>),
    Context(Arc<AppContext>),
    Request,
    Response,
}

impl Arg {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            _ => None,
        }
    }

    /// JSON rendition used for logging and echo replies.
    pub fn to_json(&self) -> Value {
        match self {
            Arg::Value(v) => v.clone(),
            Arg::Bytes(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
            Arg::File(Some(f)) => file_json(f),
            Arg::File(None) => Value::Null,
            Arg::Files(files) => Value::Array(files.iter().map(file_json).collect()),
            Arg::Headers(headers) => Value::Object(
                headers
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.as_str().to_string(),
                            Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()),
                        )
                    })
                    .collect(),
            ),
            Arg::Method(m) => Value::String(m.to_string()),
            Arg::Session(s) => s
                .as_ref()
                .map_or(Value::Null, |s| Value::String(s.id().to_string())),
            Arg::Context(c) => Value::String(c.name().to_string()),
            Arg::Request => Value::String("<request>".into()),
            Arg::Response => Value::String("<response>".into()),
        }
    }
}

fn file_json(file: &UploadedFile) -> Value {
    serde_json::json!({
        "field": file.field,
        "file_name": file.file_name,
        "content_type": file.content_type,
    })
}

/// Arguments in declared parameter order.
#[derive(Debug, Clone, Default)]
pub struct Args {
    labels: Vec<String>,
    values: Vec<Arg>,
}

impl Args {
    pub(crate) fn with_capacity(n: usize) -> Self {
        Self {
            labels: Vec::with_capacity(n),
            values: Vec::with_capacity(n),
        }
    }

    pub(crate) fn push(&mut self, label: &str, arg: Arg) {
        self.labels.push(label.to_string());
        self.values.push(arg);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Arg> {
        self.values.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arg)> {
        self.labels.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn value(&self, idx: usize) -> Option<&Value> {
        self.get(idx).and_then(Arg::as_value)
    }

    pub fn str(&self, idx: usize) -> Option<&str> {
        self.value(idx).and_then(Value::as_str)
    }

    /// Deserialize argument `idx` into `T`.
    ///
    /// # Errors
    ///
    /// Missing argument, a non-value argument, or a shape mismatch.
    pub fn parse<T: DeserializeOwned>(&self, idx: usize) -> anyhow::Result<T> {
        let value = self
            .value(idx)
            .ok_or_else(|| anyhow!("argument {idx} is not a plain value"))?;
        serde_json::from_value(value.clone())
            .with_context(|| format!("argument {idx} ({})", self.labels[idx]))
    }

    pub fn file(&self, idx: usize) -> Option<&UploadedFile> {
        match self.get(idx) {
            Some(Arg::File(file)) => file.as_ref(),
            _ => None,
        }
    }

    pub fn files(&self, idx: usize) -> &[UploadedFile] {
        match self.get(idx) {
            Some(Arg::Files(files)) => files,
            _ => &[],
        }
    }

    pub fn bytes(&self, idx: usize) -> Option<&[u8]> {
        match self.get(idx) {
            Some(Arg::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// All arguments as a JSON object keyed by label.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(label, arg)| (label.to_string(), arg.to_json()))
                .collect(),
        )
    }
}

/// What a callable hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Empty,
    /// Filter gate decision.
    Continue(bool),
    Value(Value),
    Text(String),
    Bytes(Vec<u8>),
    File(PathBuf),
    View { name: String, model: Value },
}

impl Reply {
    /// Serialize `value` into a [`Reply::Value`].
    ///
    /// # Errors
    ///
    /// `value` does not serialize to JSON.
    pub fn json<T: Serialize>(value: &T) -> anyhow::Result<Self> {
        Ok(Reply::Value(serde_json::to_value(value)?))
    }

    pub fn view(name: impl Into<String>, model: Value) -> Self {
        Reply::View {
            name: name.into(),
            model,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Empty => "empty",
            Reply::Continue(_) => "continue",
            Reply::Value(_) => "value",
            Reply::Text(_) => "text",
            Reply::Bytes(_) => "bytes",
            Reply::File(_) => "file",
            Reply::View { .. } => "view",
        }
    }
}
