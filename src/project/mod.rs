//! Typed projection of flattened records.
//!
//! A [`FieldDescriptor`] pairs a [`FieldSpec`] with the Rust type its column
//! should be read as. The default projection is a strict cast: an absent or
//! null column yields the type's empty value, any other shape that does not
//! match the type is a [`Error::TypeMismatch`]. Fields whose wire shape
//! varies between endpoints get a custom parser instead (see [`parsers`]).
//!
//! ```rust
//! use issue_melt::project::FieldDescriptor;
//! use issue_melt::melt::FieldSpec;
//! use issue_melt::value::DynamicRecord;
//!
//! let summary: FieldDescriptor<String> = FieldDescriptor::new(FieldSpec::new("summary").alias("Summary"));
//!
//! let mut record = DynamicRecord::new();
//! record.insert("Summary", "Crash on login");
//! assert_eq!(summary.parse(&record).unwrap(), "Crash on login");
//! ```

pub mod parsers;

use crate::error::{Error, Result};
use crate::melt::field::FieldSpec;
use crate::value::{DynamicRecord, DynamicValue};
use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset};
use std::fmt;
use std::sync::Arc;

/// Strict cast from a stored dynamic value.
pub trait FromDynamic: Sized {
    /// Name used in type-mismatch errors.
    const TYPE_NAME: &'static str;

    fn cast(value: &DynamicValue) -> Option<Self>;

    /// Value for an absent or null column.
    fn empty() -> Self;
}

impl FromDynamic for String {
    const TYPE_NAME: &'static str = "string";

    fn cast(value: &DynamicValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }

    fn empty() -> Self {
        String::new()
    }
}

impl FromDynamic for i64 {
    const TYPE_NAME: &'static str = "int";

    fn cast(value: &DynamicValue) -> Option<Self> {
        match value {
            DynamicValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn empty() -> Self {
        0
    }
}

impl FromDynamic for f64 {
    const TYPE_NAME: &'static str = "double";

    fn cast(value: &DynamicValue) -> Option<Self> {
        match value {
            DynamicValue::Double(f) => Some(*f),
            // Widening: the tracker drops the fraction of whole numbers
            DynamicValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    fn empty() -> Self {
        0.0
    }
}

impl FromDynamic for bool {
    const TYPE_NAME: &'static str = "bool";

    fn cast(value: &DynamicValue) -> Option<Self> {
        match value {
            DynamicValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn empty() -> Self {
        false
    }
}

impl FromDynamic for BigDecimal {
    const TYPE_NAME: &'static str = "decimal";

    fn cast(value: &DynamicValue) -> Option<Self> {
        match value {
            DynamicValue::Decimal(d) => Some(d.clone()),
            DynamicValue::Int(i) => Some(BigDecimal::from(*i)),
            _ => None,
        }
    }

    fn empty() -> Self {
        BigDecimal::from(0)
    }
}

impl FromDynamic for DateTime<FixedOffset> {
    const TYPE_NAME: &'static str = "datetime";

    fn cast(value: &DynamicValue) -> Option<Self> {
        match value {
            DynamicValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// The Unix epoch; use `Option<DateTime<_>>` to tell a missing date apart.
    fn empty() -> Self {
        DateTime::default()
    }
}

impl FromDynamic for Vec<String> {
    const TYPE_NAME: &'static str = "string list";

    fn cast(value: &DynamicValue) -> Option<Self> {
        value.as_str().map(|s| parsers::split_list(s, ','))
    }

    fn empty() -> Self {
        Vec::new()
    }
}

impl<T: FromDynamic> FromDynamic for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn cast(value: &DynamicValue) -> Option<Self> {
        T::cast(value).map(Some)
    }

    fn empty() -> Self {
        None
    }
}

/// Custom extraction logic for one field.
pub type Parser<T> = Arc<dyn Fn(&DynamicRecord, &FieldSpec) -> Result<T> + Send + Sync>;

/// A field declaration plus how to read it back as `T`.
pub struct FieldDescriptor<T> {
    spec: FieldSpec,
    parser: Option<Parser<T>>,
}

impl<T> Clone for FieldDescriptor<T> {
    fn clone(&self) -> Self {
        FieldDescriptor {
            spec: self.spec.clone(),
            parser: self.parser.clone(),
        }
    }
}

impl<T> fmt::Debug for FieldDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("spec", &self.spec)
            .field("custom_parser", &self.parser.is_some())
            .finish()
    }
}

impl<T: FromDynamic> FieldDescriptor<T> {
    pub fn new(spec: FieldSpec) -> Self {
        FieldDescriptor { spec, parser: None }
    }

    /// Replace the default cast with a custom parser.
    pub fn with_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&DynamicRecord, &FieldSpec) -> Result<T> + Send + Sync + 'static,
    {
        self.parser = Some(Arc::new(parser));
        self
    }

    pub fn with_shared_parser(mut self, parser: Parser<T>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    /// Extract this field from a flattened record.
    pub fn parse(&self, record: &DynamicRecord) -> Result<T> {
        match &self.parser {
            Some(parser) => parser(record, &self.spec),
            None => cast_column(record, self.spec.output_name()),
        }
    }
}

/// Default projection of one column.
pub fn cast_column<T: FromDynamic>(record: &DynamicRecord, column: &str) -> Result<T> {
    let mismatch = |found: &'static str| Error::TypeMismatch {
        field: column.to_string(),
        expected: T::TYPE_NAME,
        found,
    };

    match record.get(column) {
        None | Some(DynamicValue::Null) => Ok(T::empty()),
        Some(value) => T::cast(value).ok_or_else(|| mismatch(value.kind())),
    }
}

impl<T> From<&FieldDescriptor<T>> for FieldSpec {
    fn from(descriptor: &FieldDescriptor<T>) -> Self {
        descriptor.spec.clone()
    }
}
