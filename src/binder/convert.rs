//! String to typed-value coercion.

use serde_json::{Number, Value};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use super::descriptor::ValueKind;
use crate::error::ConversionError;

/// Converts raw request strings to typed JSON values.
pub trait Converter: Send + Sync {
    /// # Errors
    ///
    /// `raw` is not a valid rendition of `kind`.
    fn convert(&self, raw: &str, kind: ValueKind) -> Result<Value, ConversionError>;

    /// Convert every element, producing a JSON array.
    ///
    /// # Errors
    ///
    /// The first element that fails to convert.
    fn convert_all(&self, raws: &[&str], kind: ValueKind) -> Result<Value, ConversionError> {
        raws.iter()
            .map(|raw| self.convert(raw, kind))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

/// Booleans, numbers, dates and timestamps, JSON and text.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardConverter;

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Converter for StandardConverter {
    fn convert(&self, raw: &str, kind: ValueKind) -> Result<Value, ConversionError> {
        let fail = |reason: String| ConversionError::new(raw, kind.as_str(), reason);
        match kind {
            ValueKind::Text => Ok(Value::String(raw.to_string())),
            ValueKind::Bool => parse_bool(raw)
                .map(Value::Bool)
                .ok_or_else(|| fail("expected true/false, yes/no, on/off or 1/0".into())),
            ValueKind::Int => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| fail(e.to_string())),
            ValueKind::Float => {
                let n = raw.parse::<f64>().map_err(|e| fail(e.to_string()))?;
                Number::from_f64(n)
                    .map(Value::Number)
                    .ok_or_else(|| fail("not a finite number".into()))
            }
            ValueKind::Date => {
                let format = format_description!("[year]-[month]-[day]");
                let date = Date::parse(raw, format).map_err(|e| fail(e.to_string()))?;
                date.format(format)
                    .map(Value::String)
                    .map_err(|e| fail(e.to_string()))
            }
            ValueKind::DateTime => {
                let parsed = OffsetDateTime::parse(raw, &Rfc3339).or_else(|_| {
                    PrimitiveDateTime::parse(
                        raw,
                        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
                    )
                    .map(PrimitiveDateTime::assume_utc)
                });
                let dt = parsed.map_err(|e| fail(e.to_string()))?;
                dt.format(&Rfc3339)
                    .map(Value::String)
                    .map_err(|e| fail(e.to_string()))
            }
            ValueKind::Json => serde_json::from_str(raw).map_err(|e| fail(e.to_string())),
            ValueKind::Bytes | ValueKind::File => {
                Err(fail("not convertible from a string".into()))
            }
        }
    }
}
