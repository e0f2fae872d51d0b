//! Router core: per-method segment tries and request resolution.

use http::Method;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::pattern::{parse_pattern, Segment};
use super::trie::{InsertError, Trie};
use crate::error::SetupError;

/// Maximum number of path captures before heap allocation.
/// Most routes have ≤4 variables (e.g. /users/{id}/posts/{post_id}).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated path-variable captures.
///
/// Names are `Arc<str>` because they come from the static trie; values are
/// per-request data taken from the URL.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Result of walking one method's trie for a concrete path.
#[derive(Debug)]
pub struct ResolveResult<H> {
    /// Handler bound to the node the walk ended on, if any.
    pub handler: Option<Arc<H>>,
    /// Variable captures accumulated along the path.
    pub path_params: ParamVec,
    /// Suffix captured by a `*` default node.
    pub remainder: Option<String>,
}

impl<H> ResolveResult<H> {
    /// Get a path variable by name.
    ///
    /// Uses "last write wins" semantics when the same name is captured at
    /// different depths.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Outcome of [`Router::resolve`].
#[derive(Debug)]
pub enum Resolution<H> {
    /// A handler is bound for this method and path.
    Found(ResolveResult<H>),
    /// Nothing is registered for this path under any method.
    NotFound,
    /// The path is registered, but only for the listed methods.
    MethodNotAllowed { allowed: Vec<Method> },
}

impl<H> Resolution<H> {
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }
}

/// Split a request path into percent-decoded segments.
fn request_segments(path: &str) -> Vec<Cow<'_, str>> {
    path.trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(s).unwrap_or(Cow::Borrowed(s)))
        .collect()
}

/// Router that maps `(method, path)` to a registered handler.
///
/// One trie is kept per HTTP method. The tries are built once at startup and
/// only read afterwards, so lookups need no locking.
pub struct Router<H> {
    tries: BTreeMap<String, (Method, Trie<H>)>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Router<H> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tries: BTreeMap::new(),
        }
    }

    /// Register `handler` under `pattern` for one method.
    ///
    /// # Errors
    ///
    /// - [`SetupError::Pattern`] when the pattern does not parse
    /// - [`SetupError::DuplicateDefault`] when a `*` entry already exists at that position
    /// - [`SetupError::DuplicateRoute`] for any other already-bound pattern
    pub fn add(&mut self, method: Method, pattern: &str, handler: Arc<H>) -> Result<(), SetupError> {
        let segments = parse_pattern(pattern)?;
        let (_, trie) = self
            .tries
            .entry(method.as_str().to_string())
            .or_insert_with(|| (method.clone(), Trie::default()));

        trie.insert(&segments, handler).map_err(|InsertError::Occupied| {
            if segments.last() == Some(&Segment::Wildcard) {
                SetupError::DuplicateDefault {
                    method: method.clone(),
                    pattern: pattern.to_string(),
                }
            } else {
                SetupError::DuplicateRoute {
                    method: method.clone(),
                    pattern: pattern.to_string(),
                }
            }
        })?;

        debug!(method = %method, pattern = %pattern, "Route registered");
        Ok(())
    }

    /// Register the same handler for several methods.
    ///
    /// # Errors
    ///
    /// Fails on the first method whose registration fails; see [`Router::add`].
    pub fn add_all(&mut self, methods: &[Method], pattern: &str, handler: &Arc<H>) -> Result<(), SetupError> {
        for method in methods {
            self.add(method.clone(), pattern, Arc::clone(handler))?;
        }
        Ok(())
    }

    /// Total number of `(method, pattern)` bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tries.values().map(|(_, t)| t.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Walk the trie of a single method.
    ///
    /// This is the raw lookup: an absent handler in the result means "not
    /// found" for this method.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> ResolveResult<H> {
        let Some((_, trie)) = self.tries.get(method.as_str()) else {
            return ResolveResult {
                handler: None,
                path_params: ParamVec::new(),
                remainder: None,
            };
        };
        let segments = request_segments(path);
        let borrowed: Vec<&str> = segments.iter().map(AsRef::as_ref).collect();
        let walk = trie.search(&borrowed);
        ResolveResult {
            handler: walk.handler,
            path_params: walk.captures,
            remainder: walk.remainder,
        }
    }

    /// Resolve a request, distinguishing "not found" from "method not allowed".
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution<H> {
        debug!(method = %method, path = %path, algorithm = "segment_trie", "Route match attempt");
        let match_start = Instant::now();

        let result = self.lookup(method, path);
        let match_duration = match_start.elapsed();

        if result.handler.is_some() {
            if match_duration > Duration::from_millis(1) {
                warn!(
                    method = %method,
                    path = %path,
                    path_params = ?result.path_params,
                    duration_us = match_duration.as_micros(),
                    "Slow route matching detected"
                );
            } else {
                info!(
                    method = %method,
                    path = %path,
                    path_params = ?result.path_params,
                    remainder = ?result.remainder,
                    duration_us = match_duration.as_micros(),
                    "Route matched"
                );
            }
            return Resolution::Found(result);
        }

        let allowed: Vec<Method> = self
            .tries
            .values()
            .filter(|(m, _)| m != method)
            .filter(|(m, _)| self.lookup(m, path).handler.is_some())
            .map(|(m, _)| m.clone())
            .collect();

        if allowed.is_empty() {
            warn!(
                method = %method,
                path = %path,
                duration_us = match_duration.as_micros(),
                "No route matched"
            );
            Resolution::NotFound
        } else {
            warn!(
                method = %method,
                path = %path,
                allowed = ?allowed,
                "Route matched for other methods only"
            );
            Resolution::MethodNotAllowed { allowed }
        }
    }

    /// All registered `(method, pattern, handler)` bindings in precedence order.
    #[must_use]
    pub fn routes(&self) -> Vec<(Method, String, Arc<H>)> {
        let mut out = Vec::with_capacity(self.len());
        for (method, trie) in self.tries.values() {
            trie.for_each(|pattern, handler| out.push((method.clone(), pattern, Arc::clone(handler))));
        }
        out
    }

    /// Log the routing table once it is complete.
    pub fn log_table(&self) {
        let summary: Vec<String> = self
            .routes()
            .iter()
            .take(10)
            .map(|(method, pattern, _)| format!("{method} {pattern}"))
            .collect();
        info!(
            routes_count = self.len(),
            routes_summary = ?summary,
            routing_algorithm = "segment_trie",
            "Routing table loaded"
        );
    }
}
