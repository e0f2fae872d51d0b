//! Startup registration of routes, filters and constructors.
//!
//! A [`Registry`] collects everything the dispatcher needs and validates it
//! as it goes; any inconsistency is a [`SetupError`]. Filters and
//! package/component filter lists must be registered before the routes
//! that use them, since a route's chain is computed when it is added.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::binder::{
    Converter, Drivers, HandlerDescriptor, Invoker, ModelDef, OutputKind, ParameterSource,
};
use crate::dispatcher::Dispatcher;
use crate::error::SetupError;
use crate::exchange::AppContext;
use crate::filter::Filter;
use crate::mime::MimeTable;
use crate::router::{parse_pattern, Router, Segment};
use crate::runtime_config::RuntimeConfig;

pub struct Registry {
    config: RuntimeConfig,
    router: Router<HandlerDescriptor>,
    filters: HashMap<String, Arc<Filter>>,
    package_filters: BTreeMap<String, Vec<String>>,
    component_filters: HashMap<String, Vec<String>>,
    constructors: HashMap<String, Arc<HandlerDescriptor>>,
    models: HashMap<String, ModelDef>,
    mime: MimeTable,
    converter: Option<Arc<dyn Converter>>,
    drivers: Drivers,
    context: Arc<AppContext>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

/// `a::b::c` yields `a`, `a::b`, `a::b::c`.
fn package_ancestry(package: &str) -> impl Iterator<Item = &str> {
    package
        .match_indices("::")
        .map(move |(idx, _)| &package[..idx])
        .chain(std::iter::once(package))
        .filter(|p| !p.is_empty())
}

fn check_filter_entry(name: &str, entry: &HandlerDescriptor, role: &'static str) -> Result<(), SetupError> {
    if entry.output != OutputKind::Content {
        return Err(SetupError::InvalidFilter {
            name: name.to_string(),
            reason: role,
        });
    }
    Ok(())
}

/// Path variables and remainders must exist in the pattern they bind to.
fn check_params(pattern: &str, descriptor: &HandlerDescriptor) -> Result<(), SetupError> {
    let segments = parse_pattern(pattern)?;
    let has_wildcard = segments.last() == Some(&Segment::Wildcard);
    for param in &descriptor.params {
        match &param.source {
            ParameterSource::PathVariable { name } => {
                let declared = segments
                    .iter()
                    .any(|s| matches!(s, Segment::Variable { name: n, .. } if n == name));
                if !declared {
                    return Err(SetupError::InvalidParameter {
                        entry: descriptor.name.clone(),
                        reason: format!("path variable `{name}` is not in pattern `{pattern}`"),
                    });
                }
            }
            ParameterSource::PathRemainder if !has_wildcard => {
                return Err(SetupError::InvalidParameter {
                    entry: descriptor.name.clone(),
                    reason: format!("pattern `{pattern}` has no `*` remainder"),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

impl Registry {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            filters: HashMap::new(),
            package_filters: BTreeMap::new(),
            component_filters: HashMap::new(),
            constructors: HashMap::new(),
            models: HashMap::new(),
            mime: MimeTable::new(),
            converter: None,
            drivers: Drivers::default(),
            context: Arc::new(AppContext::default()),
        }
    }

    /// Register a filter from its gate and optional exit hook.
    ///
    /// # Errors
    ///
    /// [`SetupError::DuplicateName`] for a reused name,
    /// [`SetupError::InvalidFilter`] when gate or hook does not produce
    /// plain content.
    pub fn filter(
        &mut self,
        name: &str,
        gate: HandlerDescriptor,
        exit: Option<HandlerDescriptor>,
    ) -> Result<&mut Self, SetupError> {
        if self.filters.contains_key(name) {
            return Err(SetupError::DuplicateName(name.to_string()));
        }
        check_filter_entry(name, &gate, "gate must return content")?;
        if let Some(exit) = &exit {
            check_filter_entry(name, exit, "exit hook must return content")?;
        }
        let filter = Filter::new(name, Arc::new(gate), exit.map(Arc::new));
        debug!(filter = %name, has_exit = filter.exit.is_some(), "Filter registered");
        self.filters.insert(name.to_string(), Arc::new(filter));
        Ok(self)
    }

    /// Filters applied to every handler in `package` and its sub-packages.
    pub fn package_filters<I, S>(&mut self, package: &str, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.package_filters
            .entry(package.to_string())
            .or_default()
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Filters applied to every handler of `component`.
    pub fn component_filters<I, S>(&mut self, component: &str, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.component_filters
            .entry(component.to_string())
            .or_default()
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Constructor for attribute `name`, run when a handler asks for it and
    /// it is absent from its scope.
    ///
    /// # Errors
    ///
    /// [`SetupError::DuplicateName`] when `name` already has one.
    pub fn attribute_constructor(&mut self, name: &str, constructor: HandlerDescriptor) -> Result<&mut Self, SetupError> {
        if self.constructors.contains_key(name) {
            return Err(SetupError::DuplicateName(name.to_string()));
        }
        self.constructors.insert(name.to_string(), Arc::new(constructor));
        Ok(self)
    }

    /// Named model. Its fields are the keys of `template` (a JSON object),
    /// typed by their template values, unless `constructor` builds the
    /// initial instance.
    ///
    /// # Errors
    ///
    /// [`SetupError::DuplicateName`] for a reused name.
    pub fn model(
        &mut self,
        name: &str,
        template: Value,
        constructor: Option<HandlerDescriptor>,
    ) -> Result<&mut Self, SetupError> {
        if self.models.contains_key(name) {
            return Err(SetupError::DuplicateName(name.to_string()));
        }
        self.models.insert(
            name.to_string(),
            ModelDef {
                template,
                constructor: constructor.map(Arc::new),
            },
        );
        Ok(self)
    }

    /// Add or override a file-extension MIME mapping.
    pub fn mime(&mut self, extension: &str, mime: &str) -> &mut Self {
        self.mime.insert(extension, mime);
        self
    }

    pub fn converter(&mut self, converter: Arc<dyn Converter>) -> &mut Self {
        self.converter = Some(converter);
        self
    }

    pub fn drivers(&mut self, drivers: Drivers) -> &mut Self {
        self.drivers = drivers;
        self
    }

    pub fn context(&mut self, context: Arc<AppContext>) -> &mut Self {
        self.context = context;
        self
    }

    fn chain_for(&self, descriptor: &HandlerDescriptor) -> Result<Vec<Arc<Filter>>, SetupError> {
        let package = package_ancestry(&descriptor.package)
            .filter_map(|p| self.package_filters.get(p))
            .flatten();
        let component = self
            .component_filters
            .get(&descriptor.component)
            .into_iter()
            .flatten();
        package
            .chain(component)
            .chain(descriptor.filter_names.iter())
            .map(|name| {
                self.filters
                    .get(name)
                    .cloned()
                    .ok_or_else(|| SetupError::UnknownFilter(name.clone()))
            })
            .collect()
    }

    /// Bind a controller handler under `pattern` for each of its methods.
    ///
    /// # Errors
    ///
    /// - [`SetupError::NoMethods`] when the handler accepts no method
    /// - [`SetupError::UnknownFilter`] for a filter name never registered
    /// - [`SetupError::InvalidParameter`] for path parameters the pattern
    ///   cannot supply
    /// - pattern and duplicate-route errors from [`Router::add`]
    pub fn route(&mut self, pattern: &str, mut descriptor: HandlerDescriptor) -> Result<&mut Self, SetupError> {
        if descriptor.methods.is_empty() {
            return Err(SetupError::NoMethods(descriptor.name));
        }
        check_params(pattern, &descriptor)?;
        descriptor.chain = self.chain_for(&descriptor)?;

        let methods = descriptor.methods.clone();
        let handler = Arc::new(descriptor);
        self.router.add_all(&methods, pattern, &handler)?;
        debug!(
            handler_name = %handler.name,
            pattern = %pattern,
            methods = ?methods,
            filters = handler.chain.len(),
            "Handler registered"
        );
        Ok(self)
    }

    /// Finish registration.
    pub fn into_dispatcher(self) -> Dispatcher {
        self.router.log_table();
        info!(
            filters = self.filters.len(),
            constructors = self.constructors.len(),
            models = self.models.len(),
            "Dispatcher ready"
        );
        let mut invoker = Invoker::new()
            .with_drivers(self.drivers)
            .with_constructors(self.constructors)
            .with_models(self.models)
            .with_trim_by_default(self.config.trim_by_default);
        if let Some(converter) = self.converter {
            invoker = invoker.with_converter(converter);
        }
        Dispatcher::new(self.router, invoker, self.config, self.mime, self.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{ParameterDescriptor, Reply, TargetType};
    use http::Method;

    fn entry(name: &str) -> HandlerDescriptor {
        HandlerDescriptor::builder(name, |_ctx, _args| Ok(Reply::Empty))
            .method(Method::GET)
            .build()
    }

    #[test]
    fn test_package_ancestry() {
        assert_eq!(
            package_ancestry("shop::admin::orders").collect::<Vec<_>>(),
            ["shop", "shop::admin", "shop::admin::orders"]
        );
        assert_eq!(package_ancestry("").count(), 0);
    }

    #[test]
    fn test_chain_order_package_component_method() {
        let mut registry = Registry::default();
        for name in ["outer", "inner", "comp", "own"] {
            registry.filter(name, entry(name), None).unwrap();
        }
        registry
            .package_filters("shop", ["outer"])
            .package_filters("shop::admin", ["inner"])
            .package_filters("other", ["own"])
            .component_filters("Orders", ["comp"]);

        let handler = HandlerDescriptor::builder("list", |_ctx, _args| Ok(Reply::Empty))
            .package("shop::admin")
            .component("Orders")
            .method(Method::GET)
            .filter("own")
            .build();
        registry.route("/orders", handler).unwrap();

        let dispatcher = registry.into_dispatcher();
        let routes = dispatcher.router().routes();
        let names: Vec<&str> = routes[0].2.chain.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["outer", "inner", "comp", "own"]);
    }

    #[test]
    fn test_setup_errors() {
        let mut registry = Registry::default();
        let err = registry
            .route("/x", HandlerDescriptor::builder("h", |_c, _a| Ok(Reply::Empty)).build())
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::NoMethods(_)));

        let err = registry
            .route("/x", HandlerDescriptor::builder("h", |_c, _a| Ok(Reply::Empty)).method(Method::GET).filter("nope").build())
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::UnknownFilter(ref n) if n == "nope"));

        let err = registry
            .route(
                "/x/{id}",
                HandlerDescriptor::builder("h", |_c, _a| Ok(Reply::Empty))
                    .method(Method::GET)
                    .param(ParameterDescriptor::path_variable("ident", TargetType::TEXT))
                    .build(),
            )
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::InvalidParameter { .. }));

        let view_gate = HandlerDescriptor::builder("g", |_c, _a| Ok(Reply::Empty))
            .output(OutputKind::View)
            .build();
        let err = registry.filter("v", view_gate, None).err().unwrap();
        assert!(matches!(err, SetupError::InvalidFilter { .. }));

        registry.filter("f", entry("f"), None).unwrap();
        let err = registry.filter("f", entry("f"), None).err().unwrap();
        assert!(matches!(err, SetupError::DuplicateName(_)));
    }

    #[test]
    fn test_duplicate_route() {
        let mut registry = Registry::default();
        registry.route("/a/{x}", entry("one")).unwrap();
        let err = registry.route("/a/{x}", entry("two")).err().unwrap();
        assert!(matches!(err, SetupError::DuplicateRoute { .. }));
    }
}
