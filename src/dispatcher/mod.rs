//! # Dispatcher Module
//!
//! Top of the request pipeline. For each request the dispatcher:
//!
//! 1. Resolves method and path through the [`crate::router::Router`];
//!    misses become 404, or 405 with an `Allow` header.
//! 2. Parses `multipart/form-data` bodies into [`crate::multipart::Parts`].
//!    A malformed submission is answered with 400 before any entry point runs.
//! 3. Runs the handler behind its filter chain ([`crate::filter::run_chain`]).
//! 4. Renders the reply into a [`ResponseDescriptor`] according to the
//!    handler's [`crate::binder::OutputKind`].
//!
//! Every response carries an `x-request-id` header; the same id is on every
//! log event emitted for the request.
//!
//! ## Error Handling
//!
//! Failures never escape [`Dispatcher::dispatch`]. They are rendered as a
//! JSON body:
//!
//! ```json
//! { "error": "conversion_failed", "message": "...", "causes": [...], "request_id": "..." }
//! ```

mod core;
mod response;

pub use core::Dispatcher;
pub use response::{Content, ResponseDescriptor};
