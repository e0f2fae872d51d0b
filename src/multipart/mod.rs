//! # Multipart Module
//!
//! Streaming parser for `multipart/form-data` request bodies.
//!
//! The body is read line by line (CRLF-terminated) while in the header and
//! inline-value states. File parts switch to a byte-level copy into a
//! randomly named temp file that stops at `CRLF--boundary` without ever
//! writing delimiter bytes.
//!
//! ```text
//! --boundary                                    <- must be the first line
//! Content-Disposition: form-data; name="title"
//!                                               <- blank line ends headers
//! Hello                                         <- value part
//! --boundary
//! Content-Disposition: form-data; name="upload"; filename="a.txt"
//! Content-Type: text/plain
//!
//! <raw bytes>                                   <- file part
//! --boundary--                                  <- terminal boundary
//! ```
//!
//! Parts come back in encounter order inside [`Parts`], which deletes the
//! temp files of uploads when dropped.

mod copy;
mod parser;
mod part;
mod tokenizer;

use std::io;
use thiserror::Error;

pub use copy::{copy_until_boundary, CopyOutcome};
pub use parser::{is_multipart, parse, Charset, MultipartConfig, MultipartParser};
pub use part::{Part, PartBody, Parts};
pub use tokenizer::{tokenize, ParamHeader};

/// Failure while parsing a multipart body.
#[derive(Debug, Error)]
pub enum MultipartError {
    /// The body deviates from the boundary/header/blank-line grammar.
    #[error("malformed multipart body: expected {expected}")]
    Malformed { expected: &'static str },
    #[error("unsupported charset `{0}`")]
    UnsupportedCharset(String),
    #[error("multipart body has more than {limit} parts")]
    TooManyParts { limit: usize },
    #[error("uploaded file exceeds {limit} bytes")]
    FileTooLarge { limit: u64 },
    #[error("failed to read multipart body: {0}")]
    Io(#[from] io::Error),
}
