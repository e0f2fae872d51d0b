//! Extension to MIME type lookup.
//!
//! Keys are compared case-insensitively. A [`MimeTable`] starts from a
//! built-in set and can be extended at registration time.

use std::collections::HashMap;
use std::path::Path;

/// Fallback for unknown extensions.
pub const OCTET_STREAM: &str = "application/octet-stream";

fn builtin(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "wasm" => "application/wasm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => return None,
    })
}

#[derive(Debug, Clone, Default)]
pub struct MimeTable {
    overrides: HashMap<String, String>,
}

impl MimeTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the type for `extension` (leading dot optional).
    pub fn insert(&mut self, extension: &str, mime: impl Into<String>) {
        let key = extension.trim_start_matches('.').to_ascii_lowercase();
        self.overrides.insert(key, mime.into());
    }

    /// Type for a bare extension, if known.
    #[must_use]
    pub fn lookup(&self, extension: &str) -> Option<&str> {
        let key = extension.trim_start_matches('.').to_ascii_lowercase();
        self.overrides
            .get(&key)
            .map(String::as_str)
            .or_else(|| builtin(&key))
    }

    /// Type for a file name or path, falling back to [`OCTET_STREAM`].
    #[must_use]
    pub fn for_path(&self, path: impl AsRef<Path>) -> &str {
        path.as_ref()
            .extension()
            .and_then(|s| s.to_str())
            .and_then(|ext| self.lookup(ext))
            .unwrap_or(OCTET_STREAM)
    }
}
