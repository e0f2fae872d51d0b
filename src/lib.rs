//! # mvc-dispatch
//!
//! **mvc-dispatch** is the request routing and dispatch core of an embedded
//! MVC framework. Given one inbound request it locates the registered
//! handler, binds path, query, header, cookie, attribute and body values to
//! the handler's declared parameters, runs the handler behind its filter
//! chain, and hands the reply to a rendering stage as a structured
//! [`dispatcher::ResponseDescriptor`].
//!
//! ## Architecture
//!
//! - **[`router`]** - Segment trie per HTTP method with literal, regex,
//!   variable and `*` default segments and deterministic precedence
//! - **[`multipart`]** - Streaming `multipart/form-data` parser with
//!   temp-file uploads cleaned up on drop
//! - **[`binder`]** - Entry-point descriptors, type conversion, body
//!   drivers and the [`binder::Invoker`]
//! - **[`filter`]** - Gate / exit-hook chain executor with multi-cause
//!   error accumulation
//! - **[`dispatcher`]** - Ties the above together per request
//! - **[`registry`]** / **[`manifest`]** - Startup registration, in code or
//!   from a YAML manifest
//! - **[`exchange`]** - Request, response and the request, session and
//!   application scopes
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Host as Host container
//!     participant D as Dispatcher
//!     participant R as Router
//!     participant M as MultipartParser
//!     participant F as Filter chain
//!     participant I as Invoker
//!
//!     Host->>D: dispatch(request)
//!     D->>R: resolve(method, path)
//!     R-->>D: Found / NotFound / MethodNotAllowed
//!     D->>M: parse(body) if multipart
//!     D->>F: run_chain(handler)
//!     loop each filter
//!         F->>I: invoke(gate)
//!     end
//!     F->>I: invoke(handler)
//!     loop passed filters, reversed
//!         F->>I: invoke(exit hook)
//!     end
//!     F-->>D: reply or errors
//!     D-->>Host: ResponseDescriptor
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use http::Method;
//! use mvc_dispatch::binder::{HandlerDescriptor, ParameterDescriptor, Reply, TargetType, ValueKind};
//! use mvc_dispatch::exchange::Request;
//! use mvc_dispatch::registry::Registry;
//!
//! let mut registry = Registry::default();
//! registry
//!     .route(
//!         "/orders/{id:\\d+}",
//!         HandlerDescriptor::builder("get_order", |_ctx, args| {
//!             let id: i64 = args.parse(0)?;
//!             Ok(Reply::Value(serde_json::json!({ "id": id })))
//!         })
//!         .method(Method::GET)
//!         .param(ParameterDescriptor::path_variable("id", TargetType::scalar(ValueKind::Int)))
//!         .build(),
//!     )
//!     .unwrap();
//! let dispatcher = registry.into_dispatcher();
//!
//! let request = Request::builder(Method::GET, "/orders/42").build().unwrap();
//! let response = dispatcher.dispatch(request);
//! assert_eq!(response.status, 200);
//! ```
//!
//! ## Logging
//!
//! The library emits `tracing` events and never installs a subscriber;
//! binaries call [`telemetry::init_logging_with_config`].

pub mod binder;
pub mod cli;
pub mod dispatcher;
mod echo;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod ids;
pub mod manifest;
pub mod mime;
pub mod multipart;
pub mod registry;
pub mod router;
pub mod runtime_config;
pub mod telemetry;

pub use dispatcher::{Content, Dispatcher, ResponseDescriptor};
pub use error::{DispatchError, SetupError};
pub use registry::Registry;
