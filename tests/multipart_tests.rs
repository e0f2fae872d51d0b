//! Tests for the streaming multipart/form-data parser
//!
//! # Test Coverage
//!
//! - Value and file parts in encounter order
//! - File content that contains prefixes of the boundary delimiter
//! - Grammar violations: bad first line, truncated bodies, bad tails
//! - Part count and file size limits
//! - Temp file lifecycle: removed on drop and on failure, kept on persist

use mvc_dispatch::multipart::{parse, MultipartConfig, MultipartError, MultipartParser, PartBody};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

const CONTENT_TYPE: &str = "multipart/form-data; boundary=XyZ";

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn body(sections: &[&[u8]]) -> Vec<u8> {
    sections.concat()
}

fn round_trip_body() -> Vec<u8> {
    body(&[
        b"--XyZ\r\n",
        b"Content-Disposition: form-data; name=\"title\"\r\n",
        b"\r\n",
        b"Hello\r\n",
        b"--XyZ\r\n",
        b"Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n",
        b"Content-Type: text/plain\r\n",
        b"\r\n",
        b"one\r\n--Xy two\r\n-three\r\n--XyQ\r\r\n",
        b"\r\n--XyZ--\r\n",
    ])
}

#[test]
fn test_value_and_file_parts() {
    let dir = TempDir::new().unwrap();
    let parts = parse(CONTENT_TYPE, Cursor::new(round_trip_body()), dir.path()).unwrap();

    assert_eq!(parts.len(), 2);
    let title = parts.get("title").unwrap();
    assert_eq!(title.value(), Some("Hello"));
    assert!(!title.is_file());

    let upload = parts.get("upload").unwrap();
    assert_eq!(upload.file_name.as_deref(), Some("a.txt"));
    assert_eq!(upload.content_type.as_deref(), Some("text/plain"));
    let path = upload.path().unwrap();
    assert_eq!(path.parent(), Some(dir.path()));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("txt"));
    assert_eq!(
        std::fs::read(path).unwrap(),
        b"one\r\n--Xy two\r\n-three\r\n--XyQ\r\r\n".to_vec()
    );
}

#[test]
fn test_multi_line_value_keeps_line_breaks() {
    let dir = TempDir::new().unwrap();
    let raw = body(&[
        b"--XyZ\r\n",
        b"Content-Disposition: form-data; name=\"note\"\r\n",
        b"\r\n",
        b"first\r\n",
        b"second\r\n",
        b"--XyZ--\r\n",
    ]);
    let parts = parse(CONTENT_TYPE, Cursor::new(raw), dir.path()).unwrap();
    assert_eq!(parts.get("note").unwrap().value(), Some("first\r\nsecond"));
}

#[test]
fn test_repeated_names_and_empty_upload() {
    let dir = TempDir::new().unwrap();
    let raw = body(&[
        b"--XyZ\r\n",
        b"Content-Disposition: form-data; name=\"tag\"\r\n\r\n",
        b"a\r\n",
        b"--XyZ\r\n",
        b"Content-Disposition: form-data; name=\"tag\"\r\n\r\n",
        b"b\r\n",
        b"--XyZ\r\n",
        b"Content-Disposition: form-data; name=\"doc\"; filename=\"my%20file.bin\"\r\n\r\n",
        b"\r\n--XyZ--",
    ]);
    let parts = parse(CONTENT_TYPE, Cursor::new(raw), dir.path()).unwrap();
    let tags: Vec<&str> = parts.get_all("tag").filter_map(|p| p.value()).collect();
    assert_eq!(tags, vec!["a", "b"]);

    let doc = parts.get("doc").unwrap();
    assert_eq!(doc.file_name.as_deref(), Some("my file.bin"));
    assert!(std::fs::read(doc.path().unwrap()).unwrap().is_empty());
}

#[test]
fn test_malformed_first_line() {
    let dir = TempDir::new().unwrap();
    let raw = b"--Other\r\nContent-Disposition: form-data; name=\"x\"\r\n\r\n1\r\n--XyZ--\r\n".to_vec();
    let err = parse(CONTENT_TYPE, Cursor::new(raw), dir.path()).unwrap_err();
    assert!(matches!(err, MultipartError::Malformed { expected: "initial boundary" }));
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn test_missing_name_is_malformed() {
    let dir = TempDir::new().unwrap();
    let raw = b"--XyZ\r\nContent-Disposition: form-data\r\n\r\n1\r\n--XyZ--\r\n".to_vec();
    let err = parse(CONTENT_TYPE, Cursor::new(raw), dir.path()).unwrap_err();
    assert!(matches!(err, MultipartError::Malformed { .. }));
}

#[test]
fn test_truncated_value_is_malformed() {
    let dir = TempDir::new().unwrap();
    let raw = b"--XyZ\r\nContent-Disposition: form-data; name=\"x\"\r\n\r\n1\r\n".to_vec();
    let err = parse(CONTENT_TYPE, Cursor::new(raw), dir.path()).unwrap_err();
    assert!(matches!(err, MultipartError::Malformed { .. }));
}

#[test]
fn test_delimiter_prefix_at_eof_removes_upload() {
    let dir = TempDir::new().unwrap();
    let raw = body(&[
        b"--XyZ\r\n",
        b"Content-Disposition: form-data; name=\"f\"; filename=\"cut.txt\"\r\n\r\n",
        b"data\r\n--Xy",
    ]);
    let err = parse(CONTENT_TYPE, Cursor::new(raw), dir.path()).unwrap_err();
    assert!(matches!(
        err,
        MultipartError::Malformed { expected: "closing boundary after file content" }
    ));
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn test_bad_boundary_tail_is_malformed() {
    let dir = TempDir::new().unwrap();
    let raw = body(&[
        b"--XyZ\r\n",
        b"Content-Disposition: form-data; name=\"f\"; filename=\"x.txt\"\r\n\r\n",
        b"data\r\n--XyZjunk\r\n",
    ]);
    let err = parse(CONTENT_TYPE, Cursor::new(raw), dir.path()).unwrap_err();
    assert!(matches!(err, MultipartError::Malformed { .. }));
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn test_part_limit() {
    let dir = TempDir::new().unwrap();
    let parser = MultipartParser::from_content_type(CONTENT_TYPE, "UTF-8")
        .unwrap()
        .with_config(MultipartConfig {
            max_parts: 1,
            max_file_size: None,
        });
    let err = parser
        .parse(Cursor::new(round_trip_body()), dir.path())
        .unwrap_err();
    assert!(matches!(err, MultipartError::TooManyParts { limit: 1 }));
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn test_file_size_limit_removes_partial_upload() {
    let dir = TempDir::new().unwrap();
    let parser = MultipartParser::from_content_type(CONTENT_TYPE, "UTF-8")
        .unwrap()
        .with_config(MultipartConfig {
            max_parts: 8,
            max_file_size: Some(4),
        });
    let err = parser
        .parse(Cursor::new(round_trip_body()), dir.path())
        .unwrap_err();
    assert!(matches!(err, MultipartError::FileTooLarge { limit: 4 }));
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn test_drop_removes_uploads() {
    let dir = TempDir::new().unwrap();
    let parts = parse(CONTENT_TYPE, Cursor::new(round_trip_body()), dir.path()).unwrap();
    let path = parts.get("upload").and_then(|p| p.path()).unwrap().to_path_buf();
    assert!(path.exists());
    drop(parts);
    assert!(!path.exists());
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn test_persist_keeps_uploads() {
    let dir = TempDir::new().unwrap();
    let parts = parse(CONTENT_TYPE, Cursor::new(round_trip_body()), dir.path())
        .unwrap()
        .persist();
    let kept: Vec<_> = parts
        .iter()
        .filter_map(|p| match &p.body {
            PartBody::File(path) => Some(path.clone()),
            PartBody::Value(_) => None,
        })
        .collect();
    assert_eq!(kept.len(), 1);
    assert!(kept[0].exists());
}

#[test]
fn test_latin1_default_charset_for_values() {
    let dir = TempDir::new().unwrap();
    let mut raw = b"--XyZ\r\nContent-Disposition: form-data; name=\"city\"\r\n\r\n".to_vec();
    raw.extend_from_slice(&[b'Z', 0xfc, b'r', b'i', b'c', b'h']);
    raw.extend_from_slice(b"\r\n--XyZ--\r\n");
    let parts = parse(CONTENT_TYPE, Cursor::new(raw), dir.path()).unwrap();
    assert_eq!(parts.get("city").unwrap().value(), Some("Zürich"));
}
