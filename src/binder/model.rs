//! Field population for named models.
//!
//! A model is a JSON object whose existing field values double as type
//! declarations. Each field is filled from, in order: request parameters,
//! session attributes, application attributes.

use serde_json::{Map, Value};

use super::convert::Converter;
use super::descriptor::ValueKind;
use crate::error::DispatchError;
use crate::exchange::SharedScope;

pub(crate) struct ModelSources<'a> {
    pub params: &'a [(String, String)],
    pub session: Option<&'a SharedScope>,
    pub application: &'a SharedScope,
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Element kind and list-ness implied by a field's current value.
fn field_kind(value: &Value) -> (ValueKind, bool) {
    fn scalar(value: &Value) -> ValueKind {
        match value {
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(n) if n.is_f64() => ValueKind::Float,
            Value::Number(_) => ValueKind::Int,
            Value::Object(_) => ValueKind::Json,
            Value::Null | Value::String(_) | Value::Array(_) => ValueKind::Text,
        }
    }
    match value {
        Value::Array(items) => (items.first().map_or(ValueKind::Text, scalar), true),
        other => (scalar(other), false),
    }
}

fn same_shape(field: &Value, attribute: &Value) -> bool {
    field.is_null() || std::mem::discriminant(field) == std::mem::discriminant(attribute)
}

/// Populate `fields` of model `name` in place.
///
/// # Errors
///
/// - [`DispatchError::Conversion`] when a request parameter does not convert
///   to the field's type
/// - [`DispatchError::BeanCreation`] when a scoped attribute's type differs
///   from the field's
pub(crate) fn populate(
    name: &str,
    fields: &mut Map<String, Value>,
    sources: &ModelSources<'_>,
    converter: &dyn Converter,
) -> Result<(), DispatchError> {
    let keys: Vec<String> = fields.keys().cloned().collect();
    for key in keys {
        let current = fields.get(&key).cloned().unwrap_or(Value::Null);

        let raws: Vec<&str> = sources
            .params
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .collect();
        if !raws.is_empty() {
            let (kind, list) = field_kind(&current);
            let converted = if list {
                converter.convert_all(&raws, kind)
            } else {
                converter.convert(raws[0], kind)
            };
            let value = converted.map_err(|source| DispatchError::Conversion {
                param: format!("{name}.{key}"),
                source,
            })?;
            fields.insert(key, value);
            continue;
        }

        let scoped = sources
            .session
            .and_then(|s| s.get(&key).map(|v| (v, "session")))
            .or_else(|| sources.application.get(&key).map(|v| (v, "application")));
        if let Some((attribute, scope)) = scoped {
            if !same_shape(&current, &attribute) {
                return Err(DispatchError::BeanCreation {
                    name: name.to_string(),
                    reason: format!(
                        "field `{key}` is {} but {scope} attribute `{key}` is {}",
                        type_name(&current),
                        type_name(&attribute)
                    ),
                });
            }
            fields.insert(key, attribute);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::convert::StandardConverter;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_precedence_params_then_session_then_application() {
        let session = SharedScope::new();
        let application = SharedScope::new();
        session.insert("locale", json!("de"));
        application.insert("locale", json!("en"));
        application.insert("theme", json!("dark"));

        let params = vec![("age".to_string(), "31".to_string())];
        let mut fields = object(json!({ "age": 0, "locale": "", "theme": "", "email": "" }));
        populate(
            "signup",
            &mut fields,
            &ModelSources {
                params: &params,
                session: Some(&session),
                application: &application,
            },
            &StandardConverter,
        )
        .unwrap();

        assert_eq!(
            Value::Object(fields),
            json!({ "age": 31, "locale": "de", "theme": "dark", "email": "" })
        );
    }

    #[test]
    fn test_list_fields_gather_all_values() {
        let application = SharedScope::new();
        let params = vec![
            ("ids".to_string(), "1".to_string()),
            ("ids".to_string(), "2".to_string()),
        ];
        let mut fields = object(json!({ "ids": [0] }));
        populate(
            "m",
            &mut fields,
            &ModelSources {
                params: &params,
                session: None,
                application: &application,
            },
            &StandardConverter,
        )
        .unwrap();
        assert_eq!(fields["ids"], json!([1, 2]));
    }

    #[test]
    fn test_scoped_type_mismatch_is_bean_creation() {
        let application = SharedScope::new();
        application.insert("age", json!("old"));
        let mut fields = object(json!({ "age": 0 }));
        let err = populate(
            "m",
            &mut fields,
            &ModelSources {
                params: &[],
                session: None,
                application: &application,
            },
            &StandardConverter,
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::BeanCreation { .. }), "{err:?}");
    }

    #[test]
    fn test_param_conversion_failure() {
        let application = SharedScope::new();
        let params = vec![("age".to_string(), "old".to_string())];
        let mut fields = object(json!({ "age": 0 }));
        let err = populate(
            "m",
            &mut fields,
            &ModelSources {
                params: &params,
                session: None,
                application: &application,
            },
            &StandardConverter,
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::Conversion { ref param, .. } if param == "m.age"));
    }
}
