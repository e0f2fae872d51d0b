use super::pattern::{parse_pattern, PatternError, Segment};
use super::{Resolution, Router};
use crate::error::SetupError;
use http::Method;
use std::sync::Arc;

#[test]
fn test_root_pattern_has_no_segments() {
    assert!(parse_pattern("").unwrap().is_empty());
    assert!(parse_pattern("/").unwrap().is_empty());
}

#[test]
fn test_segment_kinds() {
    let segments = parse_pattern("/doc/{id}/{rev:[0-9]+}/*").unwrap();
    assert_eq!(segments.len(), 4);
    assert_eq!(segments[0], Segment::Literal("doc".into()));
    assert!(matches!(&segments[1], Segment::Variable { name, pattern: None } if name == "id"));
    match &segments[2] {
        Segment::Variable {
            name,
            pattern: Some(p),
        } => {
            assert_eq!(name, "rev");
            assert_eq!(p.source(), "[0-9]+");
        }
        other => panic!("unexpected segment {other:?}"),
    }
    assert_eq!(segments[3], Segment::Wildcard);
}

#[test]
fn test_regex_with_braces_and_slash() {
    let segments = parse_pattern("/code/{cc:[A-Z]{2}}").unwrap();
    assert!(segments[1].matches("DE"));
    assert!(!segments[1].matches("DEU"));

    // A slash inside braces does not split the segment.
    let segments = parse_pattern("/x/{p:a/b}").unwrap();
    assert_eq!(segments.len(), 2);
}

#[test]
fn test_regex_must_match_whole_segment() {
    let segments = parse_pattern("/doc/{id:[0-9]+}").unwrap();
    assert!(segments[1].matches("42"));
    assert!(!segments[1].matches("42a"));
    assert!(!segments[1].matches("a42"));
}

#[test]
fn test_wildcard_not_last_rejected() {
    let err = parse_pattern("/a/*/b").unwrap_err();
    assert!(matches!(err, PatternError::WildcardNotLast { .. }));
}

#[test]
fn test_unterminated_variable_rejected() {
    let err = parse_pattern("/a/{id").unwrap_err();
    assert!(matches!(err, PatternError::UnterminatedVariable { .. }));
}

#[test]
fn test_malformed_variables_rejected() {
    for bad in ["/a/{}", "/a/x{id}", "/a/{id}x", "/a/id}", "/a/{id:}", "/a/{ :x}"] {
        let err = parse_pattern(bad).unwrap_err();
        assert!(
            matches!(err, PatternError::MalformedVariable { .. }),
            "{bad} gave {err:?}"
        );
    }
}

#[test]
fn test_invalid_regex_rejected() {
    let err = parse_pattern("/a/{id:[0-9}").unwrap_err();
    assert!(matches!(err, PatternError::InvalidRegex { .. }), "{err:?}");
}

#[test]
fn test_add_surfaces_pattern_errors() {
    let mut router: Router<&str> = Router::new();
    let err = router.add(Method::GET, "/a/*/b", Arc::new("h")).unwrap_err();
    assert!(matches!(err, SetupError::Pattern(_)));
}

#[test]
fn test_duplicate_default_is_distinct_error() {
    let mut router: Router<&str> = Router::new();
    router.add(Method::GET, "/a/*", Arc::new("one")).unwrap();
    let err = router.add(Method::GET, "/a/*", Arc::new("two")).unwrap_err();
    assert!(matches!(err, SetupError::DuplicateDefault { .. }));

    router.add(Method::GET, "/a/b", Arc::new("one")).unwrap();
    let err = router.add(Method::GET, "a/b/", Arc::new("two")).unwrap_err();
    assert!(matches!(err, SetupError::DuplicateRoute { .. }));
}

#[test]
fn test_root_registration_binds_root() {
    let mut router: Router<&str> = Router::new();
    router.add(Method::GET, "", Arc::new("root")).unwrap();
    match router.resolve(&Method::GET, "/") {
        Resolution::Found(found) => assert_eq!(found.handler.as_deref(), Some(&"root")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_segments_are_percent_decoded() {
    let mut router: Router<&str> = Router::new();
    router.add(Method::GET, "/files/{name}", Arc::new("file")).unwrap();
    let found = router.lookup(&Method::GET, "/files/a%20b.txt");
    assert_eq!(found.get_path_param("name"), Some("a b.txt"));
}
