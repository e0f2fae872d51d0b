//! Pluggable decoders for structured request bodies.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::DispatchError;

/// Decodes a structured body into a JSON value.
pub trait BodyDriver: Send + Sync {
    /// # Errors
    ///
    /// [`DispatchError::MalformedBody`] when the bytes are not valid for
    /// this format.
    fn decode(&self, body: &[u8]) -> Result<Value, DispatchError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDriver;

impl BodyDriver for JsonDriver {
    fn decode(&self, body: &[u8]) -> Result<Value, DispatchError> {
        serde_json::from_slice(body).map_err(|e| DispatchError::MalformedBody(e.to_string()))
    }
}

/// Body format derived from the request's content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Json,
    Xml,
    Other,
}

impl BodyFormat {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(ct) = content_type else {
            return BodyFormat::Other;
        };
        let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if essence == "application/json" || essence.ends_with("+json") {
            BodyFormat::Json
        } else if essence == "application/xml" || essence == "text/xml" || essence.ends_with("+xml") {
            BodyFormat::Xml
        } else {
            BodyFormat::Other
        }
    }
}

/// Installed drivers. JSON is available out of the box; XML only when the
/// host registers one.
#[derive(Clone)]
pub struct Drivers {
    pub json: Option<Arc<dyn BodyDriver>>,
    pub xml: Option<Arc<dyn BodyDriver>>,
}

impl Default for Drivers {
    fn default() -> Self {
        Self {
            json: Some(Arc::new(JsonDriver)),
            xml: None,
        }
    }
}

impl fmt::Debug for Drivers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drivers")
            .field("json", &self.json.is_some())
            .field("xml", &self.xml.is_some())
            .finish()
    }
}

impl Drivers {
    /// Driver for a structured format, `None` for plain content.
    ///
    /// # Errors
    ///
    /// [`DispatchError::UnsupportedMediaType`] when the format needs a
    /// driver that is not installed.
    pub fn for_format(&self, format: BodyFormat) -> Result<Option<&dyn BodyDriver>, DispatchError> {
        let (driver, media) = match format {
            BodyFormat::Json => (&self.json, "application/json"),
            BodyFormat::Xml => (&self.xml, "application/xml"),
            BodyFormat::Other => return Ok(None),
        };
        driver
            .as_deref()
            .map(Some)
            .ok_or_else(|| DispatchError::UnsupportedMediaType(media.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_format() {
        assert_eq!(
            BodyFormat::from_content_type(Some("application/json; charset=utf-8")),
            BodyFormat::Json
        );
        assert_eq!(
            BodyFormat::from_content_type(Some("application/problem+json")),
            BodyFormat::Json
        );
        assert_eq!(BodyFormat::from_content_type(Some("text/xml")), BodyFormat::Xml);
        assert_eq!(BodyFormat::from_content_type(Some("text/plain")), BodyFormat::Other);
        assert_eq!(BodyFormat::from_content_type(None), BodyFormat::Other);
    }

    #[test]
    fn test_missing_driver_is_unsupported() {
        let drivers = Drivers::default();
        assert!(drivers.for_format(BodyFormat::Json).unwrap().is_some());
        assert!(drivers.for_format(BodyFormat::Other).unwrap().is_none());
        let err = drivers.for_format(BodyFormat::Xml).err().unwrap();
        assert!(matches!(err, DispatchError::UnsupportedMediaType(_)));
    }

    #[test]
    fn test_json_driver_reports_malformed() {
        let err = JsonDriver.decode(b"{oops").unwrap_err();
        assert!(matches!(err, DispatchError::MalformedBody(_)));
    }
}
