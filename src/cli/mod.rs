//! # CLI Module
//!
//! Command-line tooling around the dispatcher, available as the
//! `mvc-dispatch` binary.
//!
//! ## Commands
//!
//! ### `routes`
//!
//! Print a manifest's route table in precedence order, one line per
//! method and pattern, with the handler's output kind and filter chain:
//!
//! ```bash
//! mvc-dispatch routes --manifest app.yaml
//! ```
//!
//! ### `resolve`
//!
//! Resolve one request line and report the handler, captured path
//! variables and remainder, or why nothing matched:
//!
//! ```bash
//! mvc-dispatch resolve --manifest app.yaml GET /orders/42
//! ```
//!
//! ### `dispatch`
//!
//! Run a request through the full pipeline with every callable bound to an
//! echo handler, and print the response descriptor:
//!
//! ```bash
//! mvc-dispatch dispatch --manifest app.yaml POST '/orders?draft=1' \
//!     -H 'content-type: application/json' --body order.json
//! ```
//!
//! ### `parse-multipart`
//!
//! Parse a raw `multipart/form-data` body and keep the uploaded files:
//!
//! ```bash
//! mvc-dispatch parse-multipart --content-type 'multipart/form-data; boundary=xyz' \
//!     --body upload.bin --out ./uploads
//! ```
//!
//! Runtime settings come from `MVC_*` environment variables, or from the
//! YAML file named by `--config`.

mod commands;


pub use commands::{execute, run_cli, Cli, Commands};
