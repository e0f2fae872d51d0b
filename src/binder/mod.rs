//! # Binder Module
//!
//! Describes entry points and turns a live request into their arguments.
//!
//! Every registered callable (controller handler, filter gate, exit hook,
//! attribute or model constructor) is a [`HandlerDescriptor`]: a callable
//! plus an ordered list of [`ParameterDescriptor`]s naming where each
//! argument comes from and what type it converts to. The [`Invoker`]
//! resolves those sources against the [`CallContext`] and calls the
//! callable with the resulting [`Args`].
//!
//! ## Sources
//!
//! | Source | Value |
//! |--------|-------|
//! | `raw_path`, `path_file`, `query_string` | decoded request path, its last segment, raw query |
//! | `path_variable`, `path_remainder` | router captures |
//! | `header`, `cookie`, `parameter` | named request values, multipart aware for `parameter` |
//! | `attribute` | request, session or application attribute, constructed on demand |
//! | `body` | body decoded by the installed driver for its content type |
//! | `model` | a named model populated from parameters and attributes |
//! | `request`, `response`, `session`, `context`, `method`, `header_map`, `parameter_map` | injected objects |
//!
//! Conversion to the declared target type goes through a [`Converter`];
//! [`StandardConverter`] covers booleans, integers, floats, dates,
//! timestamps and JSON.

mod args;
mod convert;
mod descriptor;
mod drivers;
mod invoker;
mod model;

pub use args::{Arg, Args, Reply, UploadedFile};
pub use convert::{Converter, StandardConverter};
pub use descriptor::{
    Callable, HandlerBuilder, HandlerDescriptor, OutputKind, ParameterDescriptor, ParameterSource,
    TargetType, ValueKind,
};
pub use drivers::{BodyDriver, BodyFormat, Drivers, JsonDriver};
pub use invoker::{CallContext, Invoker, ModelDef, RequestInputs};
