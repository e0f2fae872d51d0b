use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use http::Method;
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::exchange::Request;
use crate::manifest::{Callables, Manifest};
use crate::multipart::{MultipartParser, PartBody};
use crate::registry::Registry;
use crate::router::Resolution;
use crate::runtime_config::RuntimeConfig;

/// Command-line interface for mvc-dispatch
///
/// Inspects manifests, resolves paths and dispatches requests against echo
/// handlers, and parses multipart bodies from disk.
#[derive(Parser)]
#[command(name = "mvc-dispatch")]
#[command(about = "Request dispatcher tooling", long_about = None, version)]
pub struct Cli {
    /// Runtime configuration file (YAML); defaults come from MVC_* variables
    #[arg(long, global = true, env = "MVC_CONFIG")]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the route table of a manifest
    Routes {
        /// Path to the manifest (YAML)
        #[arg(short, long)]
        manifest: PathBuf,
    },
    /// Resolve a method and path against a manifest's routes
    Resolve {
        #[arg(short, long)]
        manifest: PathBuf,

        /// HTTP method, e.g. GET
        method: String,

        /// Request path, e.g. /orders/42
        path: String,
    },
    /// Dispatch a request through a manifest with echo handlers
    Dispatch {
        #[arg(short, long)]
        manifest: PathBuf,

        method: String,

        /// Request path, optionally with a query string
        path: String,

        /// Request header as `name: value` (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// File whose content is sent as the request body
        #[arg(long)]
        body: Option<PathBuf>,
    },
    /// Parse a multipart/form-data body and keep its parts
    ParseMultipart {
        /// Content-Type header value including the boundary
        #[arg(long)]
        content_type: String,

        /// File holding the raw body
        #[arg(long)]
        body: PathBuf,

        /// Directory uploaded files are written to
        #[arg(long)]
        out: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_yaml_file(path),
        None => Ok(RuntimeConfig::from_env()),
    }
}

fn parse_method(raw: &str) -> anyhow::Result<Method> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| anyhow!("invalid HTTP method `{raw}`"))
}

fn build_registry(manifest_path: &Path, config: RuntimeConfig) -> anyhow::Result<Registry> {
    let manifest = Manifest::from_file(manifest_path)?;
    let mut registry = Registry::new(config);
    manifest
        .apply(&mut registry, &Callables::echo_for(&manifest))
        .with_context(|| format!("applying manifest {}", manifest_path.display()))?;
    Ok(registry)
}

fn print_json(out: &mut dyn Write, value: &Value) -> anyhow::Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Execute the CLI command provided by the user
///
/// # Errors
///
/// Returns an error if the manifest or config cannot be loaded, an input
/// file cannot be read, or a multipart body is malformed.
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(&cli, &mut out)
}

/// Run `cli`, writing results to `out`.
///
/// # Errors
///
/// See [`run_cli`].
pub fn execute(cli: &Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match &cli.command {
        Commands::Routes { manifest } => {
            let dispatcher = build_registry(manifest, config)?.into_dispatcher();
            for (method, pattern, handler) in dispatcher.router().routes() {
                let filters: Vec<&str> = handler.chain.iter().map(|f| f.name.as_str()).collect();
                writeln!(
                    out,
                    "{method:<7} {pattern:<40} {} ({}) [{}]",
                    handler.name,
                    handler.output.as_str(),
                    filters.join(", ")
                )?;
            }
            Ok(())
        }
        Commands::Resolve {
            manifest,
            method,
            path,
        } => {
            let dispatcher = build_registry(manifest, config)?.into_dispatcher();
            let method = parse_method(method)?;
            let report = match dispatcher.router().resolve(&method, path) {
                Resolution::Found(found) => json!({
                    "status": "found",
                    "handler": found.handler.as_ref().map(|h| h.name.clone()),
                    "path_params": found
                        .path_params
                        .iter()
                        .map(|(k, v)| json!([&**k, v]))
                        .collect::<Vec<_>>(),
                    "remainder": found.remainder,
                }),
                Resolution::NotFound => json!({ "status": "not_found" }),
                Resolution::MethodNotAllowed { allowed } => json!({
                    "status": "method_not_allowed",
                    "allowed": allowed.iter().map(Method::as_str).collect::<Vec<_>>(),
                }),
            };
            print_json(out, &report)
        }
        Commands::Dispatch {
            manifest,
            method,
            path,
            headers,
            body,
        } => {
            let dispatcher = build_registry(manifest, config)?.into_dispatcher();
            let mut builder = Request::builder(parse_method(method)?, path)
                .context(std::sync::Arc::clone(dispatcher.context()));
            for header in headers {
                let (name, value) = header
                    .split_once(':')
                    .ok_or_else(|| anyhow!("header `{header}` is not `name: value`"))?;
                builder = builder.header(name.trim(), value.trim());
            }
            if let Some(body) = body {
                let bytes = std::fs::read(body)
                    .with_context(|| format!("reading body {}", body.display()))?;
                builder = builder.body(bytes);
            }
            let request = builder.build().context("building request")?;
            let response = dispatcher.dispatch(request);
            print_json(out, &response.to_json())
        }
        Commands::ParseMultipart {
            content_type,
            body,
            out: out_dir,
        } => {
            let file = std::fs::File::open(body)
                .with_context(|| format!("opening body {}", body.display()))?;
            let parts = MultipartParser::from_content_type(content_type, &config.default_charset)?
                .with_config(config.multipart())
                .parse(std::io::BufReader::new(file), out_dir)?
                .persist();
            let report: Vec<Value> = parts
                .iter()
                .map(|part| {
                    let body = match &part.body {
                        PartBody::Value(value) => json!({ "value": value }),
                        PartBody::File(path) => json!({ "path": path }),
                    };
                    json!({
                        "name": part.name,
                        "file_name": part.file_name,
                        "content_type": part.content_type,
                        "body": body,
                    })
                })
                .collect();
            print_json(out, &Value::Array(report))
        }
    }
}
