//! Tests for YAML manifests
//!
//! Manifests are loaded from disk, bound against real callables and
//! dispatched end to end.

use http::{Method, StatusCode};
use mvc_dispatch::binder::Reply;
use mvc_dispatch::exchange::{Request, Session};
use mvc_dispatch::manifest::{Callables, Manifest};
use mvc_dispatch::{Content, Registry, SetupError};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const SHOP: &str = r#"
packages:
  shop: [audit]
components:
  Orders: [auth]
filters:
  - name: audit
    gate: allow
  - name: auth
    gate: require_user
    params:
      - { source: header, name: x-user }
constructors:
  - name: cart
    handler: new_cart
models:
  - name: signup
    template: { email: "", age: 0 }
routes:
  - pattern: /orders/{id:\d+}
    methods: [GET, DELETE]
    handler: get_order
    component: Orders
    package: shop::orders
    params:
      - { source: path_variable, name: id, type: int }
      - { source: attribute, name: cart, scope: session, type: json }
  - pattern: /signup
    methods: [post]
    handler: signup
    package: shop
    params:
      - { source: model, name: signup }
"#;

fn callables() -> Callables {
    let mut callables = Callables::new();
    callables
        .insert("allow", |_ctx, _args| Ok(Reply::Empty))
        .insert("require_user", |_ctx, args| Ok(Reply::Continue(args.str(0).is_some())))
        .insert("new_cart", |_ctx, _args| Ok(Reply::Value(json!({ "items": [] }))))
        .insert("get_order", |_ctx, args| {
            Ok(Reply::Value(json!({ "id": args.value(0), "cart": args.value(1) })))
        })
        .insert("signup", |_ctx, args| Ok(Reply::Value(args.value(0).cloned().unwrap_or_default())));
    callables
}

fn manifest_file(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn test_manifest_from_file_dispatches() {
    let file = manifest_file(SHOP);
    let manifest = Manifest::from_file(file.path()).unwrap();
    let mut registry = Registry::default();
    manifest.apply(&mut registry, &callables()).unwrap();
    let dispatcher = registry.into_dispatcher();
    assert_eq!(dispatcher.router().len(), 3);

    let request = Request::builder(Method::GET, "/orders/5")
        .header("x-user", "ada")
        .session(Arc::new(Session::new("s")))
        .build()
        .unwrap();
    let response = dispatcher.dispatch(request);
    assert_eq!(
        response.content,
        Content::Json(json!({ "id": 5, "cart": { "items": [] } }))
    );

    // The component filter declines without a user.
    let response = dispatcher.dispatch(Request::builder(Method::GET, "/orders/5").build().unwrap());
    assert_eq!(response.content, Content::Empty);

    let request = Request::builder(Method::POST, "/signup")
        .header("content-type", "application/x-www-form-urlencoded")
        .body("email=a%40b.c&age=41")
        .build()
        .unwrap();
    let response = dispatcher.dispatch(request);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.content,
        Content::Json(json!({ "email": "a@b.c", "age": 41 }))
    );
}

#[test]
fn test_filter_chain_from_packages_and_components() {
    let manifest = Manifest::from_yaml_str(SHOP).unwrap();
    let mut registry = Registry::default();
    manifest.apply(&mut registry, &callables()).unwrap();
    let dispatcher = registry.into_dispatcher();
    for (method, pattern, handler) in dispatcher.router().routes() {
        let chain: Vec<&str> = handler.chain.iter().map(|f| f.name.as_str()).collect();
        match (method.as_str(), pattern.as_str()) {
            (_, "/orders/{id:\\d+}") => assert_eq!(chain, ["audit", "auth"]),
            ("POST", "/signup") => assert_eq!(chain, ["audit"]),
            other => panic!("unexpected route {other:?}"),
        }
    }
}

#[test]
fn test_unknown_filter_is_a_setup_error() {
    let manifest = Manifest::from_yaml_str(
        "routes:\n  - pattern: /x\n    handler: allow\n    filters: [missing]\n",
    )
    .unwrap();
    let err = manifest
        .apply(&mut Registry::default(), &callables())
        .unwrap_err();
    assert!(matches!(err, SetupError::UnknownFilter(ref name) if name == "missing"));
}

#[test]
fn test_path_variable_must_be_in_pattern() {
    let manifest = Manifest::from_yaml_str(
        "routes:\n  - pattern: /x\n    handler: allow\n    params:\n      - { source: path_variable, name: id }\n",
    )
    .unwrap();
    let err = manifest
        .apply(&mut Registry::default(), &callables())
        .unwrap_err();
    assert!(matches!(err, SetupError::InvalidParameter { .. }));
}

#[test]
fn test_bad_pattern_and_missing_file() {
    let manifest = Manifest::from_yaml_str("routes:\n  - pattern: /x/{a\n    handler: allow\n").unwrap();
    let err = manifest
        .apply(&mut Registry::default(), &callables())
        .unwrap_err();
    assert!(matches!(err, SetupError::Pattern(_)));

    assert!(Manifest::from_file("/definitely/not/here.yaml").is_err());
}
