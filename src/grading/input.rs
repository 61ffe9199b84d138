//! Test case input adapter
//!
//! Turns a raw test case input string into the positional argument list
//! handed to the submitted function. Pure and deterministic, so "run" and
//! "submit" always see identical arguments for the same test case.

use serde_json::{Number, Value};

use crate::models::InputFormat;

/// Input parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Malformed test case input: {0}")]
    MalformedInput(String),
}

/// Parse `raw` into an ordered argument list according to `format`.
pub fn parse(raw: &str, format: InputFormat) -> Result<Vec<Value>, InputError> {
    match format {
        InputFormat::Json => parse_json(raw),
        InputFormat::SpaceSeparated => Ok(raw.split_whitespace().map(coerce).collect()),
        InputFormat::LineSeparated => Ok(raw.lines().map(coerce).collect()),
    }
}

fn parse_json(raw: &str) -> Result<Vec<Value>, InputError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| InputError::MalformedInput(format!("invalid JSON: {}", e)))?;

    match value {
        Value::Array(items) => Ok(items),
        other => Err(InputError::MalformedInput(format!(
            "expected a JSON array of arguments, got {}",
            json_kind(&other)
        ))),
    }
}

/// Numeric coercion: integer first, then float, otherwise the token as a string.
fn coerce(token: &str) -> Value {
    let trimmed = token.trim();

    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(u) = trimmed.parse::<u64>() {
        return Value::Number(u.into());
    }
    // Rust accepts "inf" and "NaN" as floats; those stay strings
    if looks_numeric(trimmed) {
        if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }

    Value::String(token.to_string())
}

fn looks_numeric(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && s.chars().any(|c| c.is_ascii_digit())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
