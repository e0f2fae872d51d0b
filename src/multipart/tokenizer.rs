//! RFC 2045 style header parameter tokenizer.
//!
//! Splits `value; name=token; other="quoted \"string\""` into the leading
//! value and its parameters. Parameter names are case-insensitive.

use super::MultipartError;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Param {
    name: String,
    value: String,
    quoted: bool,
}

/// A tokenized header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamHeader {
    value: String,
    params: Vec<Param>,
}

impl ParamHeader {
    /// The value before the first `;`, trimmed.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Raw parameter value, quotes and escapes removed.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.find(name).map(|p| p.value.as_str())
    }

    /// Parameter value where quoted values are additionally percent-decoded.
    ///
    /// Content-Disposition file names are sent this way by browsers that
    /// escape non-ASCII characters.
    pub fn get_unescaped(&self, name: &str) -> Option<String> {
        self.find(name).map(|p| {
            if p.quoted {
                urlencoding::decode(&p.value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| p.value.clone())
            } else {
                p.value.clone()
            }
        })
    }

    fn find(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

/// Tokenize a header value.
///
/// # Errors
///
/// [`MultipartError::Malformed`] when a quoted string is never closed.
pub fn tokenize(input: &str) -> Result<ParamHeader, MultipartError> {
    let (value, mut rest) = match input.find(';') {
        Some(idx) => (&input[..idx], &input[idx + 1..]),
        None => (input, ""),
    };
    let mut params = Vec::new();

    loop {
        rest = rest.trim_start_matches(|c: char| c == ';' || c.is_whitespace());
        if rest.is_empty() {
            break;
        }

        let name_end = rest.find(['=', ';']).unwrap_or(rest.len());
        let name = rest[..name_end].trim().to_ascii_lowercase();
        rest = &rest[name_end..];

        let Some(after_eq) = rest.strip_prefix('=') else {
            // Bare flag without a value.
            params.push(Param {
                name,
                value: String::new(),
                quoted: false,
            });
            continue;
        };
        rest = after_eq.trim_start();

        if let Some(quoted) = rest.strip_prefix('"') {
            let mut value = String::new();
            let mut escaped = false;
            let mut close = None;
            for (idx, ch) in quoted.char_indices() {
                if escaped {
                    value.push(ch);
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    close = Some(idx);
                    break;
                } else {
                    value.push(ch);
                }
            }
            let close = close.ok_or(MultipartError::Malformed {
                expected: "closing quote in header parameter",
            })?;
            rest = &quoted[close + 1..];
            params.push(Param {
                name,
                value,
                quoted: true,
            });
        } else {
            let end = rest.find(';').unwrap_or(rest.len());
            params.push(Param {
                name,
                value: rest[..end].trim().to_string(),
                quoted: false,
            });
            rest = &rest[end..];
        }
    }

    Ok(ParamHeader {
        value: value.trim().to_string(),
        params,
    })
}
