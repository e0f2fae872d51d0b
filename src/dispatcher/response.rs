use http::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::binder::{OutputKind, Reply};
use crate::error::DispatchError;
use crate::exchange::Response;
use crate::ids::{RequestId, REQUEST_ID_HEADER};
use crate::mime::MimeTable;

/// Content handed to the rendering stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Content {
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
    File {
        path: PathBuf,
        content_type: String,
        attachment: bool,
    },
    View { name: String, model: Value },
}

/// Structured result of one dispatch: status, headers and content.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDescriptor {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content: Content,
}

impl ResponseDescriptor {
    pub fn new(status: StatusCode, content: Content) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            content,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body as JSON, for `Json` content.
    pub fn json(&self) -> Option<&Value> {
        match &self.content {
            Content::Json(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn with_request_id(mut self, request_id: RequestId) -> Self {
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            self.headers.insert(REQUEST_ID_HEADER, value);
        }
        self
    }

    /// Summary suitable for printing or logging.
    pub fn to_json(&self) -> Value {
        let headers: serde_json::Map<String, Value> = self
            .headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()),
                )
            })
            .collect();
        let content = match &self.content {
            Content::Bytes(bytes) => json!({
                "kind": "bytes",
                "text": String::from_utf8_lossy(bytes),
            }),
            other => serde_json::to_value(other).unwrap_or(Value::Null),
        };
        json!({
            "status": self.status.as_u16(),
            "headers": headers,
            "content": content,
        })
    }
}

fn error_code(err: &DispatchError) -> &'static str {
    match err {
        DispatchError::MalformedSubmission(_) => "malformed_submission",
        DispatchError::MalformedBody(_) => "malformed_body",
        DispatchError::UnsupportedMediaType(_) => "unsupported_media_type",
        DispatchError::Conversion { .. } => "conversion_failed",
        DispatchError::AttributeNotFound { .. } => "attribute_not_found",
        DispatchError::BeanCreation { .. } => "bean_creation_failed",
        DispatchError::InvalidReply { .. } => "invalid_reply",
        DispatchError::Handler { .. } => "handler_failed",
        DispatchError::Io(_) => "io_error",
        DispatchError::MultiCause(_) => "multiple_failures",
    }
}

/// JSON error response for a failed dispatch.
pub(crate) fn error_response(err: &DispatchError, request_id: RequestId) -> ResponseDescriptor {
    let causes: Vec<Value> = err
        .causes()
        .iter()
        .map(|cause| json!({ "error": error_code(cause), "message": cause.to_string() }))
        .collect();
    let body = json!({
        "error": error_code(err),
        "message": err.to_string(),
        "causes": causes,
        "request_id": request_id.to_string(),
    });
    let mut response = ResponseDescriptor::new(err.status(), Content::Json(body));
    response
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response.with_request_id(request_id)
}

/// Plain JSON status response, used for 404 and 405.
pub(crate) fn status_response(status: StatusCode, message: &str) -> ResponseDescriptor {
    let mut response = ResponseDescriptor::new(status, Content::Json(json!({ "error": message })));
    response
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn attachment_header(path: &std::path::Path) -> HeaderValue {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    HeaderValue::from_str(&format!("attachment; filename=\"{name}\"")).unwrap_or_else(|_| {
        let encoded = urlencoding::encode(&name);
        HeaderValue::from_str(&format!("attachment; filename*=UTF-8''{encoded}"))
            .unwrap_or(HeaderValue::from_static("attachment"))
    })
}

fn set_default_type(headers: &mut HeaderMap, content_type: &str) {
    if !headers.contains_key(CONTENT_TYPE) {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(CONTENT_TYPE, value);
        }
    }
}

/// Render a handler reply according to its declared output kind.
///
/// Status and headers set on the exchange response by the handler carry
/// over; a content type is added when the handler did not set one.
///
/// # Errors
///
/// [`DispatchError::InvalidReply`] when the reply does not fit `output`.
pub(crate) fn render(
    handler: &str,
    output: OutputKind,
    reply: Reply,
    response: &mut Response,
    mime: &MimeTable,
) -> Result<ResponseDescriptor, DispatchError> {
    let mismatch = |expected: &'static str, got: &Reply| DispatchError::InvalidReply {
        handler: handler.to_string(),
        expected,
        got: got.kind(),
    };
    let mut headers = std::mem::take(response.headers_mut());

    let content = match (output, reply) {
        (OutputKind::Content, Reply::Empty) => Content::Empty,
        (OutputKind::Content, Reply::Value(value)) => {
            set_default_type(&mut headers, "application/json");
            Content::Json(value)
        }
        (OutputKind::Content, Reply::Text(text)) => {
            set_default_type(&mut headers, "text/plain; charset=utf-8");
            Content::Text(text)
        }
        (OutputKind::Content, Reply::Bytes(bytes)) => {
            set_default_type(&mut headers, crate::mime::OCTET_STREAM);
            Content::Bytes(bytes)
        }
        (OutputKind::Content, Reply::File(path)) => {
            let content_type = mime.for_path(&path).to_string();
            set_default_type(&mut headers, &content_type);
            Content::File {
                path,
                content_type,
                attachment: false,
            }
        }
        (OutputKind::Attachment, Reply::File(path)) => {
            let content_type = mime.for_path(&path).to_string();
            set_default_type(&mut headers, &content_type);
            headers.insert(CONTENT_DISPOSITION, attachment_header(&path));
            Content::File {
                path,
                content_type,
                attachment: true,
            }
        }
        (OutputKind::View, Reply::View { name, model }) => Content::View { name, model },
        (OutputKind::View, Reply::Text(name)) => Content::View {
            name,
            model: Value::Object(serde_json::Map::new()),
        },
        (OutputKind::Content, other) => return Err(mismatch("content", &other)),
        (OutputKind::Attachment, other) => return Err(mismatch("file", &other)),
        (OutputKind::View, other) => return Err(mismatch("view", &other)),
    };

    Ok(ResponseDescriptor {
        status: response.status(),
        headers,
        content,
    })
}

/// What a short-circuiting gate left on the exchange response.
pub(crate) fn from_exchange(response: &mut Response) -> ResponseDescriptor {
    let content = match response.take_body() {
        Some(bytes) => Content::Bytes(bytes),
        None => Content::Empty,
    };
    ResponseDescriptor {
        status: response.status(),
        headers: std::mem::take(response.headers_mut()),
        content,
    }
}
