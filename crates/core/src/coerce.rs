//! Lenient value coercion for free-form option maps.
//!
//! Render, audio and production options arrive as untyped JSON maps and
//! environment strings. Every coercion here is total: a value that cannot
//! be interpreted yields the supplied fallback instead of an error.

use serde_json::Value;

/// String values accepted as `true`.
const TRUTHY: &[&str] = &["1", "true", "yes", "y", "on"];

/// String values accepted as `false`.
const FALSY: &[&str] = &["0", "false", "no", "n", "off", ""];

/// Coerce a JSON value to an integer.
///
/// Numbers are truncated toward zero, booleans map to 0/1, strings must
/// parse as a whole integer after trimming.
pub fn parse_int(value: Option<&Value>, fallback: i64) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(fallback),
        Some(Value::Bool(b)) => i64::from(*b),
        Some(Value::String(s)) => parse_int_str(s, fallback),
        _ => fallback,
    }
}

/// Coerce a raw string (usually from the environment) to an integer.
pub fn parse_int_str(raw: &str, fallback: i64) -> i64 {
    raw.trim().parse::<i64>().unwrap_or(fallback)
}

/// Coerce a JSON value to a finite float.
pub fn parse_float(value: Option<&Value>, fallback: f64) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().filter(|f| f.is_finite()).unwrap_or(fallback),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::String(s)) => parse_float_str(s, fallback),
        _ => fallback,
    }
}

/// Coerce a raw string to a finite float.
pub fn parse_float_str(raw: &str, fallback: f64) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .unwrap_or(fallback)
}

/// Coerce a JSON value to a boolean.
///
/// Numbers are `true` when non-zero. Strings are matched case-insensitively
/// against the usual truthy/falsy spellings; anything else is the fallback.
pub fn parse_bool(value: Option<&Value>, fallback: bool) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(fallback),
        Some(Value::String(s)) => parse_bool_str(s, fallback),
        _ => fallback,
    }
}

/// Coerce a raw string to a boolean.
pub fn parse_bool_str(raw: &str, fallback: bool) -> bool {
    let lowered = raw.trim().to_lowercase();
    if TRUTHY.contains(&lowered.as_str()) {
        true
    } else if FALSY.contains(&lowered.as_str()) {
        false
    } else {
        fallback
    }
}

/// Coerce a JSON value to a non-empty string.
///
/// Scalars are rendered as text; null, empty strings, arrays and objects
/// yield the fallback.
pub fn parse_string(value: Option<&Value>, fallback: &str) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => fallback.to_string(),
    }
}
