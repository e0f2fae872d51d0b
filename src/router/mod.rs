//! # Router Module
//!
//! Resolves an HTTP method and request path to a registered handler while
//! extracting named path variables.
//!
//! ## Overview
//!
//! Routes are registered with slash-delimited patterns built from four kinds
//! of segments:
//!
//! | Segment        | Matches                                   |
//! |----------------|-------------------------------------------|
//! | `users`        | exactly `users`                           |
//! | `{id}`         | any segment, captured as `id`             |
//! | `{id:[0-9]+}`  | a segment fully matching the regex        |
//! | `*`            | everything that is left (final only)      |
//!
//! Each method owns a segment trie. Sibling nodes are totally ordered
//! (literals, then constrained variables, then free variables, then the
//! wildcard). Resolution tries accepting children in that order and falls
//! back to the next sibling when a branch cannot finish, so `/a/c/d` still
//! reaches `/a/*` past a `/a/{x}` sibling. Precedence follows from node
//! order alone and is identical for any registration order.
//!
//! ## Example
//!
//! ```rust
//! use mvc_dispatch::router::{Resolution, Router};
//! use http::Method;
//! use std::sync::Arc;
//!
//! let mut router = Router::new();
//! router.add(Method::GET, "/doc/{id:[0-9]+}", Arc::new("get_doc")).unwrap();
//! router.add(Method::GET, "/doc/*", Arc::new("doc_fallback")).unwrap();
//!
//! match router.resolve(&Method::GET, "/doc/42") {
//!     Resolution::Found(found) => {
//!         assert_eq!(found.handler.as_deref(), Some(&"get_doc"));
//!         assert_eq!(found.get_path_param("id"), Some("42"));
//!     }
//!     _ => unreachable!(),
//! }
//! ```

mod core;
pub mod pattern;
mod trie;
#[cfg(test)]
mod tests;

pub use core::{ParamVec, Resolution, ResolveResult, Router, MAX_INLINE_PARAMS};
pub use pattern::{parse_pattern, PatternError, Segment};
