//! Result comparator
//!
//! Canonicalizes and compares a serialized return value against the expected
//! output. The same policy object is used for "run" and "submit".

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").expect("static whitespace pattern is valid")
});

/// Equality policy applied by [`compare`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComparisonPolicy {
    /// Absolute tolerance for small magnitudes, relative for large ones.
    /// `None` requires numerically equal values.
    pub float_tolerance: Option<f64>,
}

impl ComparisonPolicy {
    /// Exact comparison: no numeric tolerance
    pub fn exact() -> Self {
        Self::default()
    }

    /// Allow numeric differences up to `tolerance`
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            float_tolerance: Some(tolerance),
        }
    }
}

/// Trim, normalize line endings and collapse every whitespace run to one space.
pub fn canonicalize(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n");
    WHITESPACE_RUN
        .replace_all(normalized.trim(), " ")
        .into_owned()
}

/// Compare `actual` against `expected` under `policy`.
pub fn compare(actual: &str, expected: &str, policy: &ComparisonPolicy) -> bool {
    let actual = canonicalize(actual);
    let expected = canonicalize(expected);

    if actual == expected {
        return true;
    }

    match (parse_json(&actual), parse_json(&expected)) {
        (Some(a), Some(e)) => values_equal(&a, &e, policy),
        // A quoted JSON string on one side matches the same raw text on the other
        (Some(Value::String(s)), None) => canonicalize(&s) == expected,
        (None, Some(Value::String(s))) => canonicalize(&s) == actual,
        _ => false,
    }
}

fn parse_json(s: &str) -> Option<Value> {
    serde_json::from_str(s).ok()
}

fn values_equal(a: &Value, b: &Value, policy: &ComparisonPolicy) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y, policy),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|(x, y)| values_equal(x, y, policy))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y, policy)))
        }
        (Value::String(x), Value::String(y)) => canonicalize(x) == canonicalize(y),
        _ => a == b,
    }
}

fn numbers_equal(x: &serde_json::Number, y: &serde_json::Number, policy: &ComparisonPolicy) -> bool {
    // Integers compare exactly so large values do not lose precision through f64
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }

    let (Some(a), Some(b)) = (x.as_f64(), y.as_f64()) else {
        return false;
    };

    match policy.float_tolerance {
        Some(tolerance) => {
            let scale = a.abs().max(b.abs()).max(1.0);
            (a - b).abs() <= tolerance * scale
        }
        None => a == b,
    }
}
