use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::copy::{copy_until_boundary, CopyOutcome};
use super::part::{Part, PartBody, Parts};
use super::tokenizer::tokenize;
use super::MultipartError;

/// Charset used to decode header lines and inline values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Latin1,
    Ascii,
    Utf8,
}

impl Charset {
    /// Resolve a charset label, case-insensitively.
    ///
    /// # Errors
    ///
    /// [`MultipartError::UnsupportedCharset`] for anything but ISO-8859-1,
    /// US-ASCII and UTF-8 (and their common aliases).
    pub fn from_label(label: &str) -> Result<Self, MultipartError> {
        match label.trim().to_ascii_lowercase().as_str() {
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Ok(Charset::Latin1),
            "us-ascii" | "ascii" => Ok(Charset::Ascii),
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            _ => Err(MultipartError::UnsupportedCharset(label.to_string())),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Charset::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { char::from(b) } else { char::REPLACEMENT_CHARACTER })
                .collect(),
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Limits applied while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultipartConfig {
    pub max_parts: usize,
    /// Byte cap for a single uploaded file.
    pub max_file_size: Option<u64>,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_parts: crate::runtime_config::DEFAULT_MAX_PARTS,
            max_file_size: None,
        }
    }
}

/// True when `content_type` announces a multipart body.
pub fn is_multipart(content_type: &str) -> bool {
    content_type
        .trim_start()
        .get(..10)
        .is_some_and(|p| p.eq_ignore_ascii_case("multipart/"))
}

#[derive(Debug, Default)]
struct PartHeaders {
    name: Option<String>,
    file_name: Option<String>,
    content_type: Option<String>,
}

/// What follows a boundary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Part,
    Done,
}

/// Streaming `multipart/form-data` parser.
#[derive(Debug, Clone)]
pub struct MultipartParser {
    boundary: String,
    charset: Charset,
    config: MultipartConfig,
}

impl MultipartParser {
    /// Build a parser from a request's `Content-Type`.
    ///
    /// `default_charset` applies when the header carries no `charset`.
    ///
    /// # Errors
    ///
    /// Malformed when the type is not `multipart/*` or has no boundary;
    /// unsupported charset when either charset is unknown.
    pub fn from_content_type(content_type: &str, default_charset: &str) -> Result<Self, MultipartError> {
        if !is_multipart(content_type) {
            return Err(MultipartError::Malformed {
                expected: "multipart content type",
            });
        }
        let header = tokenize(content_type)?;
        let boundary = header
            .get("boundary")
            .filter(|b| !b.is_empty())
            .ok_or(MultipartError::Malformed {
                expected: "boundary parameter",
            })?;
        let charset = Charset::from_label(header.get("charset").unwrap_or(default_charset))?;
        Ok(Self::new(boundary, charset))
    }

    pub fn new(boundary: impl Into<String>, charset: Charset) -> Self {
        Self {
            boundary: boundary.into(),
            charset,
            config: MultipartConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: MultipartConfig) -> Self {
        self.config = config;
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Split `body` into parts, writing uploads into `output_dir`.
    ///
    /// On error every temp file created so far is removed before returning.
    ///
    /// # Errors
    ///
    /// Any grammar violation, limit breach or I/O failure.
    pub fn parse<R: Read>(&self, body: R, output_dir: &Path) -> Result<Parts, MultipartError> {
        let mut reader = BufReader::new(body);
        let opening = format!("--{}", self.boundary).into_bytes();
        let closing = format!("--{}--", self.boundary).into_bytes();
        let mut parts = Parts::default();

        match read_line(&mut reader)? {
            Some(line) if line == opening => {}
            _ => {
                return Err(MultipartError::Malformed {
                    expected: "initial boundary",
                })
            }
        }

        loop {
            if parts.len() >= self.config.max_parts {
                return Err(MultipartError::TooManyParts {
                    limit: self.config.max_parts,
                });
            }
            let headers = self.read_headers(&mut reader)?;
            let name = headers.name.ok_or(MultipartError::Malformed {
                expected: "content-disposition name",
            })?;

            let next = match headers.file_name {
                None => {
                    let (value, next) = self.read_value(&mut reader, &opening, &closing)?;
                    debug!(name = %name, size = value.len(), "Multipart value part parsed");
                    parts.push(Part {
                        name,
                        file_name: None,
                        content_type: headers.content_type,
                        body: PartBody::Value(value),
                    });
                    next
                }
                Some(file_name) => {
                    let (path, file) = create_temp_file(output_dir, &file_name)?;
                    debug!(name = %name, file_name = %file_name, path = %path.display(), "Multipart upload started");
                    // Registered before copying so a failed copy still cleans up.
                    parts.push(Part {
                        name,
                        file_name: Some(file_name),
                        content_type: headers.content_type,
                        body: PartBody::File(path),
                    });
                    let size = self.copy_file(&mut reader, file)?;
                    debug!(size, "Multipart file part parsed");
                    read_boundary_tail(&mut reader)?
                }
            };

            if next == Next::Done {
                return Ok(parts);
            }
        }
    }

    fn read_headers<R: BufRead>(&self, reader: &mut R) -> Result<PartHeaders, MultipartError> {
        let mut headers = PartHeaders::default();
        loop {
            let line = read_line(reader)?.ok_or(MultipartError::Malformed {
                expected: "part headers",
            })?;
            if line.is_empty() {
                return Ok(headers);
            }
            let line = self.charset.decode(&line);
            let (name, value) = line.split_once(':').ok_or(MultipartError::Malformed {
                expected: "header name and value",
            })?;
            let name = name.trim();
            if name.eq_ignore_ascii_case("content-disposition") {
                let disposition = tokenize(value)?;
                headers.name = disposition.get_unescaped("name");
                headers.file_name = disposition.get_unescaped("filename");
            } else if name.eq_ignore_ascii_case("content-type") {
                headers.content_type = Some(value.trim().to_string());
            }
        }
    }

    fn read_value<R: BufRead>(
        &self,
        reader: &mut R,
        opening: &[u8],
        closing: &[u8],
    ) -> Result<(String, Next), MultipartError> {
        let missing = MultipartError::Malformed {
            expected: "boundary after value",
        };
        let first = read_line(reader)?.ok_or(MultipartError::Malformed {
            expected: "part value",
        })?;
        let mut value = self.charset.decode(&first);
        loop {
            let line = match read_line(reader)? {
                Some(line) => line,
                None => return Err(missing),
            };
            if line == opening {
                return Ok((value, Next::Part));
            }
            if line == closing {
                return Ok((value, Next::Done));
            }
            value.push_str("\r\n");
            value.push_str(&self.charset.decode(&line));
        }
    }

    fn copy_file<R: BufRead>(&self, reader: &mut R, file: File) -> Result<u64, MultipartError> {
        let delimiter = format!("\r\n--{}", self.boundary).into_bytes();
        let mut out = BufWriter::new(file);
        let (outcome, written) =
            copy_until_boundary(reader, &mut out, &delimiter, self.config.max_file_size)?;
        out.flush()?;
        match outcome {
            CopyOutcome::Boundary => Ok(written),
            CopyOutcome::Eof => Err(MultipartError::Malformed {
                expected: "closing boundary after file content",
            }),
            CopyOutcome::LimitExceeded => Err(MultipartError::FileTooLarge {
                limit: self.config.max_file_size.unwrap_or_default(),
            }),
        }
    }
}

/// Parse with default limits.
///
/// # Errors
///
/// See [`MultipartParser::from_content_type`] and [`MultipartParser::parse`].
pub fn parse<R: Read>(
    content_type: &str,
    body: R,
    output_dir: &Path,
) -> Result<Parts, MultipartError> {
    MultipartParser::from_content_type(content_type, crate::runtime_config::DEFAULT_CHARSET)?
        .parse(body, output_dir)
}

fn next_byte<R: BufRead>(reader: &mut R) -> io::Result<Option<u8>> {
    let byte = reader.fill_buf()?.first().copied();
    if byte.is_some() {
        reader.consume(1);
    }
    Ok(byte)
}

/// Read one CRLF-terminated line without the terminator.
///
/// A CR not followed by LF stays in the line. Returns `None` only when the
/// input is already exhausted.
fn read_line<R: BufRead>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let mut saw_any = false;
    while let Some(byte) = next_byte(reader)? {
        saw_any = true;
        if byte == b'\r' && reader.fill_buf()?.first() == Some(&b'\n') {
            reader.consume(1);
            return Ok(Some(line));
        }
        line.push(byte);
    }
    Ok(saw_any.then_some(line))
}

/// After a file delimiter: an empty rest-of-line starts the next part, `--`
/// ends the body.
fn read_boundary_tail<R: BufRead>(reader: &mut R) -> Result<Next, MultipartError> {
    let tail = read_line(reader)?.ok_or(MultipartError::Malformed {
        expected: "line break or `--` after boundary",
    })?;
    let tail = tail.trim_ascii_end();
    if tail.is_empty() {
        Ok(Next::Part)
    } else if tail == b"--" {
        Ok(Next::Done)
    } else {
        Err(MultipartError::Malformed {
            expected: "line break or `--` after boundary",
        })
    }
}

fn temp_name(file_name: &str) -> String {
    let stem: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    match Path::new(base).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{stem}.{ext}"),
        _ => stem,
    }
}

fn create_temp_file(dir: &Path, file_name: &str) -> io::Result<(PathBuf, File)> {
    let path = dir.join(temp_name(file_name));
    let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
    Ok((path, file))
}
