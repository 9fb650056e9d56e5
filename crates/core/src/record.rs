use serde_json::{Map, Value};
use thiserror::Error;

/// One flattened upstream entity. Always carries an `id` field.
pub type Record = Map<String, Value>;

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("{0} payload is not a JSON object")]
    NotAnObject(&'static str),
    #[error("{payload} payload is missing `{section}`")]
    MissingSection {
        payload: &'static str,
        section: &'static str,
    },
    #[error("upstream error: {0}")]
    Upstream(String),
}

/// Follows `path` through nested objects, stopping at the first missing step.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Scalar at `path` rendered as a string, or `default` when absent or empty.
pub fn text_at(value: &Value, path: &[&str], default: &str) -> String {
    lookup(value, path)
        .and_then(scalar_text)
        .unwrap_or_else(|| default.to_string())
}

pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Checks the outer shape shared by every upstream payload: a JSON object that
/// is not itself an error report.
pub fn expect_object<'a>(
    raw: &'a Value,
    payload: &'static str,
) -> Result<&'a Map<String, Value>, NormalizeError> {
    let object = raw
        .as_object()
        .ok_or(NormalizeError::NotAnObject(payload))?;

    match upstream_error(object) {
        Some(message) => Err(NormalizeError::Upstream(message)),
        None => Ok(object),
    }
}

fn upstream_error(object: &Map<String, Value>) -> Option<String> {
    let flagged = object.get("status").and_then(Value::as_str) == Some("error");

    match object.get("error") {
        Some(Value::String(message)) => Some(message.clone()),
        Some(error @ Value::Object(_)) => Some(text_at(error, &["message"], "Unknown error")),
        _ if flagged => Some("Unknown error".to_string()),
        _ => None,
    }
}
