//! Stock parsers for fields whose wire shape changes between endpoints.
//!
//! Each parser accepts an absent or null column, the expected shape, and the
//! alternate shapes the tracker is known to produce for that kind of field.
//! Anything else is an [`Error::UnsupportedShape`].

use crate::error::Error;
use crate::melt::coerce::parse_datetime;
use crate::melt::field::FieldSpec;
use crate::melt::registry::NESTED_SEPARATOR;
use crate::project::Parser;
use crate::value::{DynamicRecord, DynamicValue};
use bigdecimal::ToPrimitive;
use chrono::{DateTime, FixedOffset};
use std::sync::Arc;

/// Default threshold above which a numeric flag counts as set.
pub const FLAG_THRESHOLD: f64 = 0.01;

fn unsupported(spec: &FieldSpec, value: &DynamicValue) -> Error {
    Error::unsupported(spec.output_name(), value.kind())
}

fn nested_column(spec: &FieldSpec, sub: &str) -> String {
    format!("{}{}{}", spec.output_name(), NESTED_SEPARATOR, sub)
}

/// Flag stored as a number, a string, or a boolean depending on the endpoint.
///
/// Numbers are set when strictly greater than `threshold`. Strings are either
/// `true`/`false` or a number truncated to an integer, so `"0.5"` is unset.
/// The two rules differ on purpose: the string `"0.02"` is unset while the
/// number `0.02` is set, matching how the tracker's endpoints encode the flag.
pub fn threshold_flag(threshold: f64) -> Parser<bool> {
    Arc::new(move |record: &DynamicRecord, spec: &FieldSpec| {
        match record.get(spec.output_name()) {
            None | Some(DynamicValue::Null) => Ok(false),
            Some(DynamicValue::Bool(b)) => Ok(*b),
            Some(DynamicValue::Int(i)) => Ok(*i as f64 > threshold),
            Some(DynamicValue::Double(f)) => Ok(*f > threshold),
            Some(DynamicValue::Decimal(d)) => Ok(d.to_f64().map(|f| f > threshold).unwrap_or(true)),
            Some(value @ DynamicValue::String(s)) => {
                let s = s.trim();
                if s.is_empty() || s.eq_ignore_ascii_case("false") {
                    Ok(false)
                } else if s.eq_ignore_ascii_case("true") {
                    Ok(true)
                } else {
                    s.parse::<f64>()
                        .map(|f| f.trunc() != 0.0)
                        .map_err(|_| unsupported(spec, value))
                }
            }
            Some(other) => Err(unsupported(spec, other)),
        }
    })
}

pub fn flag() -> Parser<bool> {
    threshold_flag(FLAG_THRESHOLD)
}

/// Quantity returned as a bare number, a numeric string, or a `{value: x}` object.
pub fn quantity() -> Parser<f64> {
    Arc::new(|record: &DynamicRecord, spec: &FieldSpec| {
        let value = match record.get(spec.output_name()) {
            Some(value) => value,
            None => match record.get(&nested_column(spec, "value")) {
                Some(value) => value,
                None => return Ok(0.0),
            },
        };

        match value {
            DynamicValue::Null => Ok(0.0),
            DynamicValue::Int(i) => Ok(*i as f64),
            DynamicValue::Double(f) => Ok(*f),
            DynamicValue::Decimal(d) => d.to_f64().ok_or_else(|| unsupported(spec, value)),
            DynamicValue::String(s) if s.trim().is_empty() => Ok(0.0),
            DynamicValue::String(s) => s.trim().parse::<f64>().map_err(|_| unsupported(spec, value)),
            other => Err(unsupported(spec, other)),
        }
    })
}

/// Timestamp embedded at a fixed character offset of a string value.
///
/// Values already coerced to a timestamp pass through unchanged.
pub fn embedded_datetime(offset: usize, len: usize) -> Parser<Option<DateTime<FixedOffset>>> {
    Arc::new(move |record: &DynamicRecord, spec: &FieldSpec| {
        match record.get(spec.output_name()) {
            None | Some(DynamicValue::Null) => Ok(None),
            Some(DynamicValue::DateTime(dt)) => Ok(Some(*dt)),
            Some(value @ DynamicValue::String(s)) => {
                let slice: String = s.chars().skip(offset).take(len).collect();
                if slice.chars().count() < len {
                    return Err(unsupported(spec, value));
                }
                parse_datetime(&slice)
                    .map(Some)
                    .ok_or_else(|| unsupported(spec, value))
            }
            Some(other) => Err(unsupported(spec, other)),
        }
    })
}

/// Timestamp nested one level down, e.g. `{ "start": "..." }` flattened to `Name.start`.
pub fn nested_datetime(sub: &str) -> Parser<Option<DateTime<FixedOffset>>> {
    let sub = sub.to_string();
    Arc::new(move |record: &DynamicRecord, spec: &FieldSpec| {
        let value = record
            .get(&nested_column(spec, &sub))
            .or_else(|| record.get(spec.output_name()));

        match value {
            None | Some(DynamicValue::Null) => Ok(None),
            Some(DynamicValue::DateTime(dt)) => Ok(Some(*dt)),
            Some(value @ DynamicValue::String(s)) => parse_datetime(s)
                .map(Some)
                .ok_or_else(|| unsupported(spec, value)),
            Some(other) => Err(unsupported(spec, other)),
        }
    })
}

/// Multi-valued field joined with commas on the wire (or collapsed by the flattener).
pub fn comma_list() -> Parser<Vec<String>> {
    Arc::new(|record: &DynamicRecord, spec: &FieldSpec| {
        match record.get(spec.output_name()) {
            None | Some(DynamicValue::Null) => Ok(Vec::new()),
            Some(DynamicValue::String(s)) => Ok(split_list(s, ',')),
            Some(value @ (DynamicValue::Int(_) | DynamicValue::Double(_))) => Ok(vec![value.render()]),
            Some(other) => Err(unsupported(spec, other)),
        }
    })
}

/// Split on `separator`, trimming segments and dropping empty ones.
pub fn split_list(s: &str, separator: char) -> Vec<String> {
    s.split(separator)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}
