use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Content of a parsed part: an inline value or a temp file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartBody {
    Value(String),
    File(PathBuf),
}

/// One section of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    /// Present for uploads, even when the client sent an empty name.
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub body: PartBody,
}

impl Part {
    pub fn is_file(&self) -> bool {
        self.file_name.is_some()
    }

    /// Inline value for non-file parts.
    pub fn value(&self) -> Option<&str> {
        match &self.body {
            PartBody::Value(v) => Some(v),
            PartBody::File(_) => None,
        }
    }

    /// Temp file backing an upload.
    pub fn path(&self) -> Option<&Path> {
        match &self.body {
            PartBody::File(p) => Some(p),
            PartBody::Value(_) => None,
        }
    }
}

/// Every part of one request body, in encounter order.
///
/// Dropping `Parts` removes the temp files of all uploads, so cleanup
/// happens however the request ends. Call [`Parts::persist`] to keep them.
#[derive(Debug, Default)]
pub struct Parts {
    parts: Vec<Part>,
}

impl Parts {
    pub(crate) fn push(&mut self, part: Part) {
        self.parts.push(part);
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Part> {
        self.parts.iter()
    }

    /// First part named `name`.
    pub fn get(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }

    /// All parts named `name`, in encounter order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Part> + 'a {
        self.parts.iter().filter(move |p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Disarm cleanup and hand the parts (and their files) to the caller.
    pub fn persist(mut self) -> Vec<Part> {
        std::mem::take(&mut self.parts)
    }
}

impl<'a> IntoIterator for &'a Parts {
    type Item = &'a Part;
    type IntoIter = std::slice::Iter<'a, Part>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}

impl Drop for Parts {
    fn drop(&mut self) {
        for path in self.parts.iter().filter_map(Part::path) {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Upload temp file removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove upload temp file"),
            }
        }
    }
}
