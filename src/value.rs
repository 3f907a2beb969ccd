//! Dynamic records: the flattened, loosely-typed form of one issue.

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// A single column value inside a [`DynamicRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue {
    /// Explicitly missing. Never the same thing as an empty string.
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    /// Arbitrary-precision fallback for integers that fit neither i64 nor f64 exactly.
    Decimal(BigDecimal),
    String(String),
    /// An absolute instant, carried at the local offset.
    DateTime(DateTime<FixedOffset>),
    /// Only exists while an object is being flattened.
    Nested(DynamicRecord),
}

impl DynamicValue {
    /// Short name of the runtime shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            DynamicValue::Null => "null",
            DynamicValue::Bool(_) => "bool",
            DynamicValue::Int(_) => "int",
            DynamicValue::Double(_) => "double",
            DynamicValue::Decimal(_) => "decimal",
            DynamicValue::String(_) => "string",
            DynamicValue::DateTime(_) => "datetime",
            DynamicValue::Nested(_) => "record",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DynamicValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynamicValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render as a flat text cell. Null renders empty; timestamps use RFC 3339.
    pub fn render(&self) -> String {
        match self {
            DynamicValue::Null => String::new(),
            DynamicValue::Bool(b) => b.to_string(),
            DynamicValue::Int(i) => i.to_string(),
            DynamicValue::Double(f) => f.to_string(),
            DynamicValue::Decimal(d) => d.to_string(),
            DynamicValue::String(s) => s.clone(),
            DynamicValue::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, false),
            DynamicValue::Nested(record) => record
                .iter()
                .map(|(k, v)| format!("{}={}", k, v.render()))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for DynamicValue {
    fn from(s: &str) -> Self {
        DynamicValue::String(s.to_string())
    }
}

impl From<String> for DynamicValue {
    fn from(s: String) -> Self {
        DynamicValue::String(s)
    }
}

impl From<i64> for DynamicValue {
    fn from(i: i64) -> Self {
        DynamicValue::Int(i)
    }
}

impl From<f64> for DynamicValue {
    fn from(f: f64) -> Self {
        DynamicValue::Double(f)
    }
}

impl From<bool> for DynamicValue {
    fn from(b: bool) -> Self {
        DynamicValue::Bool(b)
    }
}

impl Serialize for DynamicValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DynamicValue::Null => serializer.serialize_unit(),
            DynamicValue::Bool(b) => serializer.serialize_bool(*b),
            DynamicValue::Int(i) => serializer.serialize_i64(*i),
            DynamicValue::Double(f) => serializer.serialize_f64(*f),
            // Keep exactness by writing decimals as strings
            DynamicValue::Decimal(d) => serializer.serialize_str(&d.to_string()),
            DynamicValue::String(s) => serializer.serialize_str(s),
            DynamicValue::DateTime(_) => serializer.serialize_str(&self.render()),
            DynamicValue::Nested(record) => record.serialize(serializer),
        }
    }
}

/// An ordered mapping from output column name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DynamicRecord {
    columns: IndexMap<String, DynamicValue>,
}

impl DynamicRecord {
    pub fn new() -> Self {
        DynamicRecord {
            columns: IndexMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&DynamicValue> {
        self.columns.get(column)
    }

    /// Insert or overwrite a column, keeping its original position on overwrite.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<DynamicValue>) {
        self.columns.insert(column.into(), value.into());
    }

    pub fn contains_key(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DynamicValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when no column holds a nested record.
    pub fn is_flat(&self) -> bool {
        !self
            .columns
            .values()
            .any(|v| matches!(v, DynamicValue::Nested(_)))
    }

    /// Insert `value` under `column`, promoting nested records into
    /// `column{separator}child` columns until only scalars remain.
    pub fn insert_flattened(&mut self, column: String, value: DynamicValue, separator: &str) {
        match value {
            DynamicValue::Nested(nested) if nested.is_empty() => {
                self.columns.insert(column, DynamicValue::Null);
            }
            DynamicValue::Nested(nested) => {
                for (child, child_value) in nested.columns {
                    let name = format!("{}{}{}", column, separator, child);
                    self.insert_flattened(name, child_value, separator);
                }
            }
            scalar => {
                self.columns.insert(column, scalar);
            }
        }
    }
}

impl<K: Into<String>, V: Into<DynamicValue>> FromIterator<(K, V)> for DynamicRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = DynamicRecord::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl From<DynamicRecord> for DynamicValue {
    fn from(record: DynamicRecord) -> Self {
        DynamicValue::Nested(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_is_not_empty_string() {
        assert_ne!(DynamicValue::Null, DynamicValue::from(""));
        assert_eq!(DynamicValue::Null.render(), "");
        assert_eq!(DynamicValue::Null.kind(), "null");
    }

    #[test]
    fn test_insert_flattened_promotes_nested() {
        let inner: DynamicRecord = vec![("name", "Done"), ("id", "3")].into_iter().collect();
        let mut outer = DynamicRecord::new();
        outer.insert("Key", "X-1");
        outer.insert_flattened("status".to_string(), DynamicValue::Nested(inner), ".");

        assert!(outer.is_flat());
        assert_eq!(outer.keys().collect::<Vec<_>>(), vec!["Key", "status.name", "status.id"]);
        assert_eq!(outer.get("status.name"), Some(&DynamicValue::from("Done")));
    }

    #[test]
    fn test_empty_nested_becomes_null_column() {
        let mut record = DynamicRecord::new();
        record.insert_flattened("parent".to_string(), DynamicRecord::new().into(), ".");
        assert_eq!(record.get("parent"), Some(&DynamicValue::Null));
    }

    #[test]
    fn test_serialize_preserves_column_order() {
        let mut record = DynamicRecord::new();
        record.insert("b", 2i64);
        record.insert("a", DynamicValue::Null);
        record.insert("c", true);

        let out = serde_json::to_string(&record).unwrap();
        assert_eq!(out, r#"{"b":2,"a":null,"c":true}"#);
        assert_eq!(serde_json::to_value(&record).unwrap(), json!({"b": 2, "a": null, "c": true}));
    }
}
