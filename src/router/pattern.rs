//! Route pattern grammar.
//!
//! A registered pattern is a `/`-delimited list of segments, each one of:
//!
//! - a literal token (`users`)
//! - `{name}`, an unconstrained path variable
//! - `{name:regex}`, a path variable whose captured text must fully match `regex`
//! - `*`, the default/wildcard terminator (final segment only)
//!
//! Splitting is brace-aware so a variable's regex may itself contain `/` or
//! balanced `{}` quantifiers (`{code:[A-Z]{3}}`).

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Setup-time failure while parsing a route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// A `{` was opened and never closed.
    #[error("unterminated variable in route pattern `{pattern}`")]
    UnterminatedVariable { pattern: String },
    /// Variable syntax that cannot be parsed (stray braces, empty name, trailing text).
    #[error("malformed variable segment `{segment}` in `{pattern}`: {reason}")]
    MalformedVariable {
        pattern: String,
        segment: String,
        reason: &'static str,
    },
    /// The regex constraint of a variable failed to compile.
    #[error("invalid regex for variable `{name}` in `{pattern}`: {message}")]
    InvalidRegex {
        pattern: String,
        name: String,
        message: String,
    },
    /// `*` appeared before the last segment.
    #[error("wildcard `*` must be the final segment of `{pattern}`")]
    WildcardNotLast { pattern: String },
}

/// Compiled regex constraint of a `{name:regex}` variable.
///
/// The source is kept for ordering and display; the compiled form is anchored
/// so that `is_full_match` only accepts whole segments.
#[derive(Debug, Clone)]
pub struct VarPattern {
    source: String,
    anchored: Regex,
}

impl VarPattern {
    fn compile(pattern: &str, name: &str, source: &str) -> Result<Self, PatternError> {
        let anchored = Regex::new(&format!("^(?:{source})$")).map_err(|e| {
            PatternError::InvalidRegex {
                pattern: pattern.to_string(),
                name: name.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            source: source.to_string(),
            anchored,
        })
    }

    /// The regex as written in the route pattern.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the whole segment matches the constraint.
    #[must_use]
    pub fn is_full_match(&self, segment: &str) -> bool {
        self.anchored.is_match(segment)
    }
}

impl PartialEq for VarPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for VarPattern {}

/// One parsed segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Variable {
        name: String,
        pattern: Option<VarPattern>,
    },
    Wildcard,
}

impl Segment {
    /// Precedence rank: literals, then constrained variables, then free
    /// variables, then the wildcard.
    fn rank(&self) -> u8 {
        match self {
            Segment::Literal(_) => 0,
            Segment::Variable {
                pattern: Some(_), ..
            } => 1,
            Segment::Variable { pattern: None, .. } => 2,
            Segment::Wildcard => 3,
        }
    }

    /// Total order used to sort sibling trie nodes.
    ///
    /// Ties inside a rank break on the literal token, then the regex source,
    /// then the variable name, so the order never depends on registration order.
    #[must_use]
    pub fn precedence(&self, other: &Segment) -> Ordering {
        self.rank().cmp(&other.rank()).then_with(|| match (self, other) {
            (Segment::Literal(a), Segment::Literal(b)) => a.cmp(b),
            (
                Segment::Variable {
                    name: an,
                    pattern: ap,
                },
                Segment::Variable {
                    name: bn,
                    pattern: bp,
                },
            ) => {
                let a_src = ap.as_ref().map(VarPattern::source);
                let b_src = bp.as_ref().map(VarPattern::source);
                a_src.cmp(&b_src).then_with(|| an.cmp(bn))
            }
            _ => Ordering::Equal,
        })
    }

    /// True when both segments accept exactly the same request segments.
    /// Variables compare by constraint only; their names do not matter.
    #[must_use]
    pub fn same_shape(&self, other: &Segment) -> bool {
        match (self, other) {
            (Segment::Variable { pattern: a, .. }, Segment::Variable { pattern: b, .. }) => a == b,
            _ => self == other,
        }
    }

    /// Whether a concrete request segment is accepted by this pattern segment.
    #[must_use]
    pub fn matches(&self, segment: &str) -> bool {
        match self {
            Segment::Literal(token) => token == segment,
            Segment::Variable {
                pattern: Some(p), ..
            } => p.is_full_match(segment),
            Segment::Variable { pattern: None, .. } => true,
            Segment::Wildcard => true,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(token) => f.write_str(token),
            Segment::Variable {
                name,
                pattern: Some(p),
            } => write!(f, "{{{name}:{}}}", p.source()),
            Segment::Variable {
                name,
                pattern: None,
            } => write!(f, "{{{name}}}"),
            Segment::Wildcard => f.write_str("*"),
        }
    }
}

/// Split on `/` outside of braces, dropping empty segments.
fn split_segments(pattern: &str) -> Result<Vec<&str>, PatternError> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (idx, ch) in pattern.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1).ok_or_else(|| PatternError::MalformedVariable {
                    pattern: pattern.to_string(),
                    segment: pattern[start..=idx].to_string(),
                    reason: "closing brace without opening brace",
                })?;
            }
            '/' if depth == 0 => {
                if idx > start {
                    segments.push(&pattern[start..idx]);
                }
                start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(PatternError::UnterminatedVariable {
            pattern: pattern.to_string(),
        });
    }
    if start < pattern.len() {
        segments.push(&pattern[start..]);
    }
    Ok(segments)
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

fn parse_segment(pattern: &str, raw: &str) -> Result<Segment, PatternError> {
    let malformed = |reason| PatternError::MalformedVariable {
        pattern: pattern.to_string(),
        segment: raw.to_string(),
        reason,
    };

    if raw == "*" {
        return Ok(Segment::Wildcard);
    }
    if !raw.starts_with('{') {
        if raw.contains('{') || raw.contains('}') {
            return Err(malformed("braces are only allowed around a whole segment"));
        }
        return Ok(Segment::Literal(raw.to_string()));
    }

    // The opening brace at 0 must be closed by the segment's final character.
    let mut depth = 0usize;
    let mut close = None;
    for (idx, ch) in raw.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(idx);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close.ok_or_else(|| PatternError::UnterminatedVariable {
        pattern: pattern.to_string(),
    })?;
    if close != raw.len() - 1 {
        return Err(malformed("unexpected text after closing brace"));
    }

    let inner = &raw[1..close];
    let (name, regex) = match inner.split_once(':') {
        Some((name, regex)) => (name.trim(), Some(regex)),
        None => (inner.trim(), None),
    };
    if !is_valid_name(name) {
        return Err(malformed("variable name must be a non-empty identifier"));
    }

    let pattern = match regex {
        Some("") => return Err(malformed("empty regex constraint")),
        Some(source) => Some(VarPattern::compile(pattern, name, source)?),
        None => None,
    };
    Ok(Segment::Variable {
        name: name.to_string(),
        pattern,
    })
}

/// Parse a route pattern into segments.
///
/// The empty pattern (or `/`) yields no segments and binds to the trie root.
///
/// # Errors
///
/// Returns a [`PatternError`] for unterminated or malformed variables, invalid
/// regex constraints, and a wildcard that is not the final segment.
pub fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, PatternError> {
    let raw_segments = split_segments(pattern)?;
    let mut segments = Vec::with_capacity(raw_segments.len());
    for (idx, raw) in raw_segments.iter().enumerate() {
        let segment = parse_segment(pattern, raw)?;
        if segment == Segment::Wildcard && idx + 1 != raw_segments.len() {
            return Err(PatternError::WildcardNotLast {
                pattern: pattern.to_string(),
            });
        }
        segments.push(segment);
    }
    Ok(segments)
}
