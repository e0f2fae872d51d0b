//! Attribute scopes.
//!
//! Request attributes live on the [`super::Request`] and are never shared.
//! Session and application attributes are shared across requests, so they
//! sit behind a [`SharedScope`] that serialises lazy construction per
//! attribute name.

use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Where a named attribute is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    #[default]
    Request,
    Session,
    Application,
}

impl ScopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::Request => "request",
            ScopeKind::Session => "session",
            ScopeKind::Application => "application",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute map shared between concurrent requests.
#[derive(Debug, Default)]
pub struct SharedScope {
    values: Mutex<HashMap<String, Value>>,
    // One lock per attribute name. Reentrant so a circular constructor on
    // the same thread reaches the invoker's cycle check instead of hanging.
    construct: Mutex<HashMap<String, Arc<ReentrantMutex<()>>>>,
}

impl SharedScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.lock().get(name).cloned()
    }

    pub fn insert(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.values.lock().insert(name.into(), value)
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.values.lock().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.lock().contains_key(name)
    }

    fn construct_lock(&self, name: &str) -> Arc<ReentrantMutex<()>> {
        Arc::clone(self.construct.lock().entry(name.to_string()).or_default())
    }

    /// Construct-if-absent.
    ///
    /// Construction runs while holding the lock for `name` only, so of two
    /// requests racing for the same name one builds the value and both get
    /// it back. Building different attributes never contends, which keeps
    /// constructors free to depend on attributes of any other scope.
    ///
    /// # Errors
    ///
    /// Whatever `build` returns; nothing is stored in that case.
    pub fn get_or_try_insert_with<E>(
        &self,
        name: &str,
        build: impl FnOnce() -> Result<Value, E>,
    ) -> Result<Value, E> {
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }
        let lock = self.construct_lock(name);
        let _guard = lock.lock();
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }
        let value = build()?;
        Ok(self
            .values
            .lock()
            .entry(name.to_string())
            .or_insert(value)
            .clone())
    }
}

/// A client session as handed over by the host container.
#[derive(Debug)]
pub struct Session {
    id: String,
    attributes: SharedScope,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: SharedScope::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attributes(&self) -> &SharedScope {
        &self.attributes
    }
}

/// Application-wide context shared by every request.
#[derive(Debug, Default)]
pub struct AppContext {
    name: String,
    attributes: SharedScope,
}

impl AppContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: SharedScope::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &SharedScope {
        &self.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_construct_if_absent_keeps_existing() {
        let scope = SharedScope::new();
        scope.insert("cart", json!([1]));
        let value = scope
            .get_or_try_insert_with::<()>("cart", || Ok(json!([2])))
            .unwrap();
        assert_eq!(value, json!([1]));
    }

    #[test]
    fn test_failed_construction_stores_nothing() {
        let scope = SharedScope::new();
        let err = scope.get_or_try_insert_with("cart", || Err("boom"));
        assert_eq!(err, Err("boom"));
        assert!(!scope.contains("cart"));
    }

    #[test]
    fn test_reentrant_construction() {
        let scope = SharedScope::new();
        let outer = scope
            .get_or_try_insert_with::<()>("outer", || {
                let inner = scope.get_or_try_insert_with::<()>("inner", || Ok(json!(1)))?;
                Ok(json!({ "inner": inner }))
            })
            .unwrap();
        assert_eq!(outer, json!({ "inner": 1 }));
        assert_eq!(scope.get("inner"), Some(json!(1)));
    }

    #[test]
    fn test_crossed_scope_constructors_do_not_deadlock() {
        let session = Arc::new(Session::new("s1"));
        let app = Arc::new(AppContext::new("app"));
        let barrier = Arc::new(Barrier::new(2));

        // One thread builds a session attribute needing an app attribute,
        // the other the reverse, both entering their outer constructor
        // before either asks for the inner one.
        let spawn = |outer_in_session: bool| {
            let (session, app, barrier) = (Arc::clone(&session), Arc::clone(&app), Arc::clone(&barrier));
            thread::spawn(move || {
                let (outer, inner) = if outer_in_session {
                    (session.attributes(), app.attributes())
                } else {
                    (app.attributes(), session.attributes())
                };
                let name = if outer_in_session { "cart" } else { "catalog" };
                outer
                    .get_or_try_insert_with::<()>(name, || {
                        barrier.wait();
                        let dep = inner.get_or_try_insert_with::<()>(&format!("{name}.dep"), || Ok(json!(1)))?;
                        Ok(json!({ "dep": dep }))
                    })
                    .unwrap()
            })
        };
        let a = spawn(true);
        let b = spawn(false);
        assert_eq!(a.join().unwrap(), json!({ "dep": 1 }));
        assert_eq!(b.join().unwrap(), json!({ "dep": 1 }));
        assert_eq!(app.attributes().get("cart.dep"), Some(json!(1)));
        assert_eq!(session.attributes().get("catalog.dep"), Some(json!(1)));
    }

    #[test]
    fn test_racing_requests_share_one_value() {
        let session = Arc::new(Session::new("s1"));
        let builds = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let session = Arc::clone(&session);
                let builds = Arc::clone(&builds);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    session
                        .attributes()
                        .get_or_try_insert_with::<()>("token", || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            Ok(json!(i))
                        })
                        .unwrap()
                })
            })
            .collect();

        let values: Vec<Value> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| v == &values[0]));
    }
}
