//! Tests for route resolution
//!
//! # Test Coverage
//!
//! - Literal, regex-constrained, free variable and `*` default segments
//! - Precedence between siblings, independent of registration order
//! - Fallback to a later sibling when an earlier branch dead-ends
//! - 404 versus 405 with the allowed method list
//! - A multi-verb route table ("Verb Zoo")

use http::Method;
use mvc_dispatch::router::{Resolution, Router};
use mvc_dispatch::SetupError;
use proptest::prelude::*;
use std::sync::Arc;

fn router(routes: &[(Method, &'static str)]) -> Router<&'static str> {
    let mut router = Router::new();
    for (method, pattern) in routes {
        router
            .add(method.clone(), pattern, Arc::new(*pattern))
            .expect("route registers");
    }
    router
}

fn handler_for(router: &Router<&'static str>, method: Method, path: &str) -> Option<&'static str> {
    router.lookup(&method, path).handler.map(|h| *h)
}

fn verb_zoo() -> Router<&'static str> {
    let mut router = Router::new();
    let table: &[(Method, &str, &'static str)] = &[
        (Method::GET, "/", "root_handler"),
        (Method::GET, "/zoo/animals", "get_animals"),
        (Method::POST, "/zoo/animals", "create_animal"),
        (Method::GET, "/zoo/animals/{id}", "get_animal"),
        (Method::PUT, "/zoo/animals/{id}", "update_animal"),
        (Method::PATCH, "/zoo/animals/{id}", "patch_animal"),
        (Method::DELETE, "/zoo/animals/{id}", "delete_animal"),
        (Method::HEAD, "/zoo/health", "health_check"),
        (Method::OPTIONS, "/zoo/health", "supported_ops"),
        (Method::TRACE, "/zoo/health", "trace_route"),
    ];
    for (method, pattern, name) in table {
        router.add(method.clone(), pattern, Arc::new(*name)).unwrap();
    }
    router
}

fn assert_route_match(router: &Router<&'static str>, method: Method, path: &str, expected: &str) {
    let found = handler_for(router, method.clone(), path).unwrap_or("<none>");
    assert_eq!(found, expected, "handler mismatch for {method} {path}");
}

#[test]
fn test_verb_zoo() {
    let zoo = verb_zoo();
    assert_eq!(zoo.len(), 10);
    assert_route_match(&zoo, Method::GET, "/", "root_handler");
    assert_route_match(&zoo, Method::GET, "/zoo/animals", "get_animals");
    assert_route_match(&zoo, Method::POST, "/zoo/animals", "create_animal");
    assert_route_match(&zoo, Method::GET, "/zoo/animals/123", "get_animal");
    assert_route_match(&zoo, Method::PUT, "/zoo/animals/123", "update_animal");
    assert_route_match(&zoo, Method::PATCH, "/zoo/animals/123", "patch_animal");
    assert_route_match(&zoo, Method::DELETE, "/zoo/animals/123", "delete_animal");
    assert_route_match(&zoo, Method::HEAD, "/zoo/health", "health_check");
    assert_route_match(&zoo, Method::OPTIONS, "/zoo/health", "supported_ops");
    assert_route_match(&zoo, Method::TRACE, "/zoo/health", "trace_route");
    assert_route_match(&zoo, Method::GET, "/unknown", "<none>");
}

#[test]
fn test_path_variables_are_captured() {
    let zoo = verb_zoo();
    let found = zoo.lookup(&Method::GET, "/zoo/animals/123");
    assert_eq!(found.get_path_param("id"), Some("123"));
    assert_eq!(found.remainder, None);
}

#[test]
fn test_precedence_literal_variable_default() {
    let r = router(&[
        (Method::GET, "/a/*"),
        (Method::GET, "/a/{x}"),
        (Method::GET, "/a/b"),
    ]);
    assert_eq!(handler_for(&r, Method::GET, "/a/b"), Some("/a/b"));

    let found = r.lookup(&Method::GET, "/a/c");
    assert_eq!(found.handler.as_deref().copied(), Some("/a/{x}"));
    assert_eq!(found.get_path_param("x"), Some("c"));

    let found = r.lookup(&Method::GET, "/a/c/d");
    assert_eq!(found.handler.as_deref().copied(), Some("/a/*"));
    assert_eq!(found.remainder.as_deref(), Some("c/d"));
    assert!(found.path_params.is_empty());
}

#[test]
fn test_regex_constrained_variable() {
    let r = router(&[(Method::GET, "/doc/{id:[0-9]+}"), (Method::GET, "/doc/{slug}")]);

    let found = r.lookup(&Method::GET, "/doc/42");
    assert_eq!(found.handler.as_deref().copied(), Some("/doc/{id:[0-9]+}"));
    assert_eq!(found.get_path_param("id"), Some("42"));

    let found = r.lookup(&Method::GET, "/doc/abc");
    assert_eq!(found.handler.as_deref().copied(), Some("/doc/{slug}"));
    assert_eq!(found.get_path_param("slug"), Some("abc"));
}

#[test]
fn test_regex_without_fallback_is_not_found() {
    let r = router(&[(Method::GET, "/doc/{id:[0-9]+}")]);
    assert!(matches!(r.resolve(&Method::GET, "/doc/abc"), Resolution::NotFound));
    assert!(r.resolve(&Method::GET, "/doc/7").is_found());
}

#[test]
fn test_default_matches_exhausted_path_with_empty_remainder() {
    let r = router(&[(Method::GET, "/static/*")]);
    let found = r.lookup(&Method::GET, "/static");
    assert_eq!(found.handler.as_deref().copied(), Some("/static/*"));
    assert_eq!(found.remainder.as_deref(), Some(""));
}

#[test]
fn test_empty_segments_are_ignored() {
    let r = router(&[(Method::GET, "/a/b")]);
    assert_eq!(handler_for(&r, Method::GET, "//a///b/"), Some("/a/b"));
}

#[test]
fn test_method_not_allowed_lists_other_methods() {
    let zoo = verb_zoo();
    match zoo.resolve(&Method::POST, "/zoo/animals/9") {
        Resolution::MethodNotAllowed { allowed } => {
            assert_eq!(
                allowed,
                vec![Method::DELETE, Method::GET, Method::PATCH, Method::PUT]
            );
        }
        other => panic!("expected 405, got {other:?}"),
    }
    assert!(matches!(zoo.resolve(&Method::GET, "/nowhere"), Resolution::NotFound));
}

#[test]
fn test_duplicate_registrations_rejected() {
    let mut r = router(&[(Method::GET, "/a/{x}"), (Method::GET, "/a/*")]);
    assert!(matches!(
        r.add(Method::GET, "/a/{x}", Arc::new("again")),
        Err(SetupError::DuplicateRoute { .. })
    ));
    assert!(matches!(
        r.add(Method::GET, "/a/*", Arc::new("again")),
        Err(SetupError::DuplicateDefault { .. })
    ));
    // Other methods are independent.
    r.add(Method::POST, "/a/{x}", Arc::new("post")).unwrap();
}

#[test]
fn test_renamed_variable_is_a_duplicate() {
    let mut r = router(&[(Method::GET, "/u/{id}")]);
    assert!(matches!(
        r.add(Method::GET, "/u/{name}", Arc::new("shadowed")),
        Err(SetupError::DuplicateRoute { .. })
    ));
    // A constrained variable or a longer path can still be reached.
    r.add(Method::GET, "/u/{id:[0-9]+}", Arc::new("numeric")).unwrap();
    r.add(Method::GET, "/u/{name}/posts", Arc::new("posts")).unwrap();
    assert_eq!(handler_for(&r, Method::GET, "/u/7"), Some("numeric"));
    assert_eq!(handler_for(&r, Method::GET, "/u/ada/posts"), Some("posts"));
}

#[test]
fn test_routes_listing_is_in_precedence_order() {
    let r = router(&[
        (Method::GET, "/a/*"),
        (Method::GET, "/a/{x}"),
        (Method::GET, "/a/b"),
    ]);
    let patterns: Vec<String> = r.routes().into_iter().map(|(_, p, _)| p).collect();
    assert_eq!(patterns, vec!["/a/b", "/a/{x}", "/a/*"]);
}

const PATTERNS: [&str; 6] = [
    "/a/b",
    "/a/{x}",
    "/a/*",
    "/a/{n:[0-9]+}/c",
    "/a/b/c",
    "/z",
];

const PROBES: [&str; 9] = [
    "/a/b", "/a/c", "/a/c/d", "/a/1/c", "/a/b/c", "/a/b/d", "/z", "/y", "/a",
];

fn resolve_all(patterns: &[&'static str]) -> Vec<(Option<&'static str>, Vec<(String, String)>, Option<String>)> {
    let mut r: Router<&'static str> = Router::new();
    for p in patterns {
        r.add(Method::GET, p, Arc::new(*p)).unwrap();
    }
    PROBES
        .iter()
        .map(|path| {
            let found = r.lookup(&Method::GET, path);
            (
                found.handler.as_deref().copied(),
                found
                    .path_params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                found.remainder,
            )
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_registration_order_does_not_matter(order in Just(PATTERNS.to_vec()).prop_shuffle()) {
        prop_assert_eq!(resolve_all(&order), resolve_all(&PATTERNS));
    }
}
