//! # Manifest Module
//!
//! Declarative route tables. A manifest is a YAML document naming routes,
//! filters, constructors and models; each entry refers to a callable by
//! name, and [`Manifest::apply`] binds those names against a [`Callables`]
//! table while filling a [`Registry`].
//!
//! ```yaml
//! packages:
//!   shop: [audit]
//! components:
//!   Orders: [auth]
//! filters:
//!   - name: auth
//!     gate: check_auth
//!     exit: release_auth
//!     params:
//!       - { source: header, name: authorization }
//! constructors:
//!   - name: cart
//!     handler: new_cart
//! models:
//!   - name: signup
//!     template: { email: "", age: 0 }
//! routes:
//!   - pattern: /orders/{id:\d+}
//!     methods: [GET]
//!     handler: get_order
//!     component: Orders
//!     package: shop::orders
//!     params:
//!       - { source: path_variable, name: id, type: int }
//! ```
//!
//! Any name that does not resolve is a [`SetupError`].

mod callables;

pub use callables::Callables;

use anyhow::Context;
use http::Method;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::binder::{HandlerDescriptor, OutputKind, ParameterDescriptor};
use crate::error::SetupError;
use crate::registry::Registry;

const METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "TRACE", "CONNECT",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    /// Package name to the filters every handler in it (and below) gets.
    pub packages: BTreeMap<String, Vec<String>>,
    /// Component name to the filters every handler of it gets.
    pub components: BTreeMap<String, Vec<String>>,
    pub filters: Vec<FilterSpec>,
    pub constructors: Vec<ConstructorSpec>,
    pub models: Vec<ModelSpec>,
    pub routes: Vec<RouteSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSpec {
    pub name: String,
    pub gate: String,
    #[serde(default)]
    pub exit: Option<String>,
    #[serde(default)]
    pub params: Vec<ParameterDescriptor>,
    #[serde(default)]
    pub exit_params: Vec<ParameterDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstructorSpec {
    pub name: String,
    pub handler: String,
    #[serde(default)]
    pub params: Vec<ParameterDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    pub name: String,
    #[serde(default = "empty_object")]
    pub template: Value,
    #[serde(default)]
    pub constructor: Option<String>,
    #[serde(default)]
    pub params: Vec<ParameterDescriptor>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSpec {
    pub pattern: String,
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
    pub handler: String,
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub output: OutputKind,
    #[serde(default)]
    pub params: Vec<ParameterDescriptor>,
    #[serde(default)]
    pub filters: Vec<String>,
}

fn parse_method(raw: &str) -> Result<Method, SetupError> {
    let upper = raw.trim().to_ascii_uppercase();
    if !METHODS.contains(&upper.as_str()) {
        return Err(SetupError::UnknownMethod(raw.to_string()));
    }
    Method::from_bytes(upper.as_bytes()).map_err(|_| SetupError::UnknownMethod(raw.to_string()))
}

fn entry(
    callables: &Callables,
    callable: &str,
    name: &str,
    params: &[ParameterDescriptor],
) -> Result<HandlerDescriptor, SetupError> {
    let callable = callables
        .get(callable)
        .cloned()
        .ok_or_else(|| SetupError::UnknownHandler(callable.to_string()))?;
    Ok(HandlerDescriptor::builder_with(name, callable)
        .params(params.iter().cloned())
        .build())
}

impl Manifest {
    /// # Errors
    ///
    /// [`SetupError::Manifest`] when the text is not a valid manifest.
    pub fn from_yaml_str(text: &str) -> Result<Self, SetupError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// # Errors
    ///
    /// Unreadable file or invalid manifest.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading manifest {}", path.display()))
    }

    /// Register every entry with `registry`, binding callables by name.
    ///
    /// Filters go first, then package and component filter lists,
    /// constructors, models and finally routes.
    ///
    /// # Errors
    ///
    /// [`SetupError::UnknownHandler`] for a callable name missing from
    /// `callables`, [`SetupError::UnknownMethod`] for an unrecognised HTTP
    /// method, and any error raised by the registry.
    pub fn apply(&self, registry: &mut Registry, callables: &Callables) -> Result<(), SetupError> {
        for filter in &self.filters {
            let gate = entry(callables, &filter.gate, &filter.gate, &filter.params)?;
            let exit = filter
                .exit
                .as_deref()
                .map(|exit| entry(callables, exit, exit, &filter.exit_params))
                .transpose()?;
            registry.filter(&filter.name, gate, exit)?;
        }
        for (package, names) in &self.packages {
            registry.package_filters(package, names.iter().cloned());
        }
        for (component, names) in &self.components {
            registry.component_filters(component, names.iter().cloned());
        }
        for constructor in &self.constructors {
            let built = entry(callables, &constructor.handler, &constructor.handler, &constructor.params)?;
            registry.attribute_constructor(&constructor.name, built)?;
        }
        for model in &self.models {
            let constructor = model
                .constructor
                .as_deref()
                .map(|c| entry(callables, c, c, &model.params))
                .transpose()?;
            registry.model(&model.name, model.template.clone(), constructor)?;
        }
        for route in &self.routes {
            let methods = route
                .methods
                .iter()
                .map(|m| parse_method(m))
                .collect::<Result<Vec<_>, _>>()?;
            let callable = callables
                .get(&route.handler)
                .cloned()
                .ok_or_else(|| SetupError::UnknownHandler(route.handler.clone()))?;
            let mut builder = HandlerDescriptor::builder_with(&route.handler, callable)
                .component(&route.component)
                .package(&route.package)
                .output(route.output)
                .methods(methods)
                .params(route.params.iter().cloned());
            for filter in &route.filters {
                builder = builder.filter(filter);
            }
            registry.route(&route.pattern, builder.build())?;
        }
        info!(
            routes = self.routes.len(),
            filters = self.filters.len(),
            constructors = self.constructors.len(),
            models = self.models.len(),
            "Manifest applied"
        );
        Ok(())
    }
}
