//! # Runtime Configuration
//!
//! Settings that shape how the dispatcher treats request bodies. They are
//! loaded once at startup, either from the environment or from a YAML file.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `MVC_UPLOAD_DIR` | `std::env::temp_dir()` | Where multipart file parts are written |
//! | `MVC_DEFAULT_CHARSET` | `ISO-8859-1` | Charset for multipart text when the request names none |
//! | `MVC_MAX_PARTS` | `128` | Maximum parts per multipart body |
//! | `MVC_MAX_FILE_SIZE` | unset | Byte cap for a single uploaded file |
//! | `MVC_TRIM_BY_DEFAULT` | `false` | Trim textual parameters that do not opt in explicitly |
//!
//! ## YAML
//!
//! ```yaml
//! upload_dir: /var/tmp/uploads
//! default_charset: UTF-8
//! max_parts: 32
//! max_file_size: 10485760
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::multipart::MultipartConfig;

pub const DEFAULT_CHARSET: &str = "ISO-8859-1";
pub const DEFAULT_MAX_PARTS: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub upload_dir: PathBuf,
    pub default_charset: String,
    pub max_parts: usize,
    pub max_file_size: Option<u64>,
    pub trim_by_default: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            upload_dir: env::temp_dir(),
            default_charset: DEFAULT_CHARSET.to_string(),
            max_parts: DEFAULT_MAX_PARTS,
            max_file_size: None,
            trim_by_default: false,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable numbers fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            upload_dir: env::var_os("MVC_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            default_charset: env::var("MVC_DEFAULT_CHARSET").unwrap_or(defaults.default_charset),
            max_parts: env::var("MVC_MAX_PARTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_parts),
            max_file_size: env::var("MVC_MAX_FILE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok()),
            trim_by_default: env::var("MVC_TRIM_BY_DEFAULT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.trim_by_default),
        }
    }

    /// Load configuration from a YAML file. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is not valid YAML for this shape.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Limits handed to the multipart parser.
    #[must_use]
    pub fn multipart(&self) -> MultipartConfig {
        MultipartConfig {
            max_parts: self.max_parts,
            max_file_size: self.max_file_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.default_charset, "ISO-8859-1");
        assert_eq!(config.max_parts, 128);
        assert_eq!(config.max_file_size, None);
        assert!(!config.trim_by_default);
    }

    #[test]
    fn test_yaml_fills_missing_keys_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_charset: UTF-8\nmax_file_size: 1024").unwrap();
        let config = RuntimeConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.default_charset, "UTF-8");
        assert_eq!(config.max_file_size, Some(1024));
        assert_eq!(config.max_parts, DEFAULT_MAX_PARTS);
    }

    #[test]
    fn test_yaml_rejects_wrong_types() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_parts: lots").unwrap();
        assert!(RuntimeConfig::from_yaml_file(file.path()).is_err());
    }
}
