//! Leaf-level JSON to dynamic value coercion.

use crate::value::DynamicValue;
use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, Local, SecondsFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use std::str::FromStr;

// Full timestamp with a mandatory offset; the tracker emits `+1300` without a colon.
static DATETIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})$").unwrap()
});

static COMPACT_OFFSET_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[+-]\d{4}$").unwrap()
});

/// Coerce a scalar JSON value. Objects and arrays are the flattener's job and
/// are rendered as compact JSON text if they reach this point.
pub fn coerce_scalar(value: &Value) -> DynamicValue {
    match value {
        Value::Null => DynamicValue::Null,
        Value::Bool(b) => DynamicValue::Bool(*b),
        Value::Number(n) => coerce_number(n),
        Value::String(s) => match parse_datetime(s) {
            Some(dt) => DynamicValue::DateTime(dt),
            None => DynamicValue::String(s.clone()),
        },
        other => DynamicValue::String(other.to_string()),
    }
}

/// i64 when it fits, else f64 when that is exact, else an arbitrary-precision decimal.
pub fn coerce_number(n: &Number) -> DynamicValue {
    if let Some(i) = n.as_i64() {
        return DynamicValue::Int(i);
    }

    if let Some(u) = n.as_u64() {
        let as_float = u as f64;
        if as_float < u64::MAX as f64 && as_float as u64 == u {
            return DynamicValue::Double(as_float);
        }
        return DynamicValue::Decimal(BigDecimal::from(u));
    }

    // Number text is kept verbatim, so only exact doubles stay doubles
    let text = n.to_string();
    match n.as_f64() {
        Some(f) if f.is_finite() && f.to_string() == text => DynamicValue::Double(f),
        _ => BigDecimal::from_str(&text)
            .map(DynamicValue::Decimal)
            .unwrap_or(DynamicValue::String(text)),
    }
}

/// Parse a full timestamp and normalize it to the local offset.
///
/// Accepts RFC 3339 and the compact `+hhmm` offset form.
pub fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    if !DATETIME_REGEX.is_match(s) {
        return None;
    }

    let normalized = if COMPACT_OFFSET_REGEX.is_match(s) {
        let (head, offset) = s.split_at(s.len() - 2);
        format!("{}:{}", head, offset)
    } else {
        s.to_string()
    };

    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.with_timezone(&Local).fixed_offset())
}

/// Format a timestamp so that [`parse_datetime`] reads back the same instant.
pub fn format_datetime(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Render a JSON value as one text segment of a collapsed array.
pub fn render_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => coerce_scalar(other).render(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_compact_offset_is_parsed() {
        let dt = parse_datetime("2024-03-01T09:30:00.000+1300").unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 2, 29, 20, 30, 0).unwrap();
        assert_eq!(dt, expected);
    }

    #[test]
    fn test_datetime_round_trip_is_idempotent() {
        let first = parse_datetime("2023-11-20T17:05:42.123-0530").unwrap();
        let formatted = format_datetime(&first);
        let second = parse_datetime(&formatted).unwrap();

        assert_eq!(first, second);
        assert_eq!(format_datetime(&second), formatted);
    }

    #[test]
    fn test_standard_forms_are_parsed() {
        assert!(parse_datetime("2024-01-02T03:04:05Z").is_some());
        assert!(parse_datetime("2024-01-02T03:04:05+02:00").is_some());
    }

    #[test]
    fn test_non_timestamps_stay_strings() {
        assert!(parse_datetime("2024-01-02").is_none());
        assert!(parse_datetime("2024-01-02T03:04:05").is_none());
        assert_eq!(coerce_scalar(&json!("In Progress")), DynamicValue::from("In Progress"));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(coerce_scalar(&json!(42)), DynamicValue::Int(42));
        assert_eq!(coerce_scalar(&json!(-7)), DynamicValue::Int(-7));
        assert_eq!(coerce_scalar(&json!(2.5)), DynamicValue::Double(2.5));
        assert_eq!(
            coerce_scalar(&json!(9_223_372_036_854_775_808u64)),
            DynamicValue::Double(9_223_372_036_854_775_808.0)
        );
        assert_eq!(
            coerce_scalar(&json!(18_446_744_073_709_551_615u64)),
            DynamicValue::Decimal(BigDecimal::from(18_446_744_073_709_551_615u64))
        );
    }

    #[test]
    fn test_numbers_beyond_u64_keep_every_digit() {
        let value: Value = serde_json::from_str("123456789012345678901").unwrap();
        let coerced = coerce_scalar(&value);

        assert_eq!(
            coerced,
            DynamicValue::Decimal(BigDecimal::from_str("123456789012345678901").unwrap())
        );
        assert_eq!(coerced.render(), "123456789012345678901");

        let value: Value = serde_json::from_str("0.10000000000000000000001").unwrap();
        assert!(matches!(coerce_scalar(&value), DynamicValue::Decimal(_)));

        let value: Value = serde_json::from_str("0.25").unwrap();
        assert_eq!(coerce_scalar(&value), DynamicValue::Double(0.25));
    }

    #[test]
    fn test_null_and_bool() {
        assert_eq!(coerce_scalar(&Value::Null), DynamicValue::Null);
        assert_eq!(coerce_scalar(&json!(true)), DynamicValue::Bool(true));
    }
}
