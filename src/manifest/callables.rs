use std::collections::HashMap;
use std::sync::Arc;

use super::Manifest;
use crate::binder::{Args, CallContext, Callable, Reply};
use crate::echo::{echo_for_output, echo_gate, echo_handler};

/// Named callables a manifest binds its entries to.
#[derive(Clone, Default)]
pub struct Callables {
    entries: HashMap<String, Callable>,
}

impl std::fmt::Debug for Callables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("Callables").field("names", &names).finish()
    }
}

impl Callables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, callable: F) -> &mut Self
    where
        F: Fn(&mut CallContext<'_>, Args) -> anyhow::Result<Reply> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Arc::new(callable));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Callable> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Echo callables for every name `manifest` references: gates pass,
    /// everything else returns its bound arguments.
    pub fn echo_for(manifest: &Manifest) -> Self {
        let mut callables = Self::new();
        for filter in &manifest.filters {
            callables.insert(filter.gate.clone(), echo_gate);
            if let Some(exit) = &filter.exit {
                callables.insert(exit.clone(), echo_handler);
            }
        }
        for constructor in &manifest.constructors {
            callables.insert(constructor.handler.clone(), echo_handler);
        }
        for model in &manifest.models {
            if let Some(constructor) = &model.constructor {
                callables.insert(constructor.clone(), echo_handler);
            }
        }
        for route in &manifest.routes {
            callables.insert(route.handler.clone(), echo_for_output(&route.handler, route.output));
        }
        callables
    }
}

