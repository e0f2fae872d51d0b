//! Error taxonomy.
//!
//! Two families are kept apart:
//!
//! - [`SetupError`]: raised while routes, filters and constructors are being
//!   registered. These are fatal at application start.
//! - [`DispatchError`]: raised while a single request is processed. Each
//!   variant maps to an HTTP status through [`DispatchError::status`].
//!
//! "Not found" and "method not allowed" are not errors; they are
//! [`crate::router::Resolution`] variants.

use http::{Method, StatusCode};
use std::fmt;
use std::io;
use thiserror::Error;

use crate::multipart::MultipartError;
use crate::router::PatternError;

/// Fatal registration-time failure.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("route {method} {pattern} is already registered")]
    DuplicateRoute { method: Method, pattern: String },
    #[error("default entry {method} {pattern} is already registered")]
    DuplicateDefault { method: Method, pattern: String },
    #[error("unknown filter `{0}`")]
    UnknownFilter(String),
    #[error("unknown handler `{0}`")]
    UnknownHandler(String),
    #[error("filter `{name}` is not a valid filter entry: {reason}")]
    InvalidFilter { name: String, reason: &'static str },
    #[error("entry `{entry}` declares an invalid parameter: {reason}")]
    InvalidParameter { entry: String, reason: String },
    #[error("entry `{0}` accepts no HTTP methods")]
    NoMethods(String),
    #[error("unknown HTTP method `{0}`")]
    UnknownMethod(String),
    #[error("`{0}` is registered twice")]
    DuplicateName(String),
    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_yaml::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A string could not be coerced to a parameter's declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert `{value}` to {target}: {reason}")]
pub struct ConversionError {
    pub value: String,
    pub target: &'static str,
    pub reason: String,
}

impl ConversionError {
    pub fn new(value: impl Into<String>, target: &'static str, reason: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            target,
            reason: reason.into(),
        }
    }
}

/// Request-time failure.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The multipart body violated the grammar or could not be read.
    #[error("malformed submission: {0}")]
    MalformedSubmission(#[from] MultipartError),
    /// A structured body could not be decoded by its driver.
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    /// No driver is installed for the body's media type.
    #[error("unsupported media type `{0}`")]
    UnsupportedMediaType(String),
    /// A value could not be converted for parameter `param`.
    #[error("parameter `{param}`: {source}")]
    Conversion {
        param: String,
        #[source]
        source: ConversionError,
    },
    /// A scoped attribute was required but absent.
    #[error("attribute `{name}` not found in {scope} scope")]
    AttributeNotFound { name: String, scope: &'static str },
    /// An attribute or model could not be constructed or populated.
    #[error("could not create `{name}`: {reason}")]
    BeanCreation { name: String, reason: String },
    /// The handler's reply does not fit the declared output kind.
    #[error("handler `{handler}` returned {got}, expected {expected}")]
    InvalidReply {
        handler: String,
        expected: &'static str,
        got: &'static str,
    },
    /// A handler, gate or exit hook returned an error.
    #[error("`{entry}` failed: {source}")]
    Handler {
        entry: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
    /// More than one stage of the filter pipeline failed.
    #[error("{0}")]
    MultiCause(MultiCause),
}

impl DispatchError {
    /// HTTP status the dispatcher reports for this failure.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::MalformedSubmission(_) | DispatchError::MalformedBody(_) => {
                StatusCode::BAD_REQUEST
            }
            DispatchError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DispatchError::MultiCause(multi) => multi.primary().status(),
            DispatchError::Conversion { .. }
            | DispatchError::AttributeNotFound { .. }
            | DispatchError::BeanCreation { .. }
            | DispatchError::InvalidReply { .. }
            | DispatchError::Handler { .. }
            | DispatchError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Every contributing failure, primary first. A single error yields itself.
    #[must_use]
    pub fn causes(&self) -> Vec<&DispatchError> {
        match self {
            DispatchError::MultiCause(multi) => multi.causes().iter().collect(),
            other => vec![other],
        }
    }

    /// Fold a list of accumulated failures into one error.
    ///
    /// Returns `None` for an empty list, the error itself for a single one,
    /// and a [`MultiCause`] (first error primary) otherwise.
    #[must_use]
    pub fn aggregate(mut errors: Vec<DispatchError>) -> Option<DispatchError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(DispatchError::MultiCause(MultiCause { causes: errors })),
        }
    }
}

/// Composite failure holding every error raised across the filter pipeline.
#[derive(Debug)]
pub struct MultiCause {
    causes: Vec<DispatchError>,
}

impl MultiCause {
    /// The first surfaced failure.
    #[must_use]
    pub fn primary(&self) -> &DispatchError {
        &self.causes[0]
    }

    #[must_use]
    pub fn causes(&self) -> &[DispatchError] {
        &self.causes
    }
}

impl fmt::Display for MultiCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failures; first: {}", self.causes.len(), self.primary())?;
        for (idx, cause) in self.causes.iter().enumerate().skip(1) {
            write!(f, "; [{idx}] {cause}")?;
        }
        Ok(())
    }
}
