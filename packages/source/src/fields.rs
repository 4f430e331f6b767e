//! Attribute lookup and value cleanup.

use parking_map_source_models::FieldSource;
use serde_json::{Map, Value};

/// Looks up `name` in a record's attributes: exact match first, then a
/// case-insensitive match on the attribute names.
#[must_use]
pub fn lookup<'a>(attributes: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    attributes.get(name).or_else(|| {
        let wanted = name.to_lowercase();
        attributes
            .iter()
            .find(|(key, _)| key.to_lowercase() == wanted)
            .map(|(_, value)| value)
    })
}

/// Renders an attribute value as trimmed text. `null` becomes empty.
#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Reads a numeric attribute from a JSON number or numeric string.
#[must_use]
pub fn value_to_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Resolves a mapped text field for one record.
///
/// A constant always wins. A missing attribute yields an empty string.
#[must_use]
pub fn resolve_text(source: Option<&FieldSource>, attributes: &Map<String, Value>) -> String {
    match source {
        Some(FieldSource::Constant(value)) => value.clone(),
        Some(FieldSource::Field(name)) => lookup(attributes, name)
            .map(value_to_string)
            .unwrap_or_default(),
        None => String::new(),
    }
}

/// Resolves a mapped numeric field for one record.
#[must_use]
pub fn resolve_number(source: Option<&FieldSource>, attributes: &Map<String, Value>) -> Option<f64> {
    match source? {
        FieldSource::Constant(value) => value.trim().parse::<f64>().ok(),
        FieldSource::Field(name) => lookup(attributes, name).and_then(value_to_f64),
    }
}
