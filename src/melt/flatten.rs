use crate::error::{Error, Result};
use crate::melt::coerce::{coerce_scalar, render_segment};
use crate::melt::field::{FieldSpec, DEFAULT_SEPARATOR};
use crate::melt::registry::FieldRegistry;
use crate::value::{DynamicRecord, DynamicValue};
use serde_json::{Map, Value};

/// Flattens raw issue objects into dynamic records using a field registry
pub struct IssueMelter<'a> {
    registry: &'a FieldRegistry,
}

impl<'a> IssueMelter<'a> {
    pub fn new(registry: &'a FieldRegistry) -> Self {
        IssueMelter { registry }
    }

    /// Melt one raw issue into a flat record
    pub fn melt(&self, issue: &Value) -> Result<DynamicRecord> {
        let obj = match issue {
            Value::Object(obj) => obj,
            other => return Err(Error::unsupported("<issue>", shape_of(other))),
        };

        let container = &self.registry.config().fields_container;
        let mut record = DynamicRecord::new();

        for (key, value) in obj.iter() {
            if self.registry.is_ignored(key) {
                continue;
            }

            match value {
                // The tracker wraps every requested field one level deep
                Value::Object(fields) if key == container => {
                    for (wire, field_value) in fields.iter() {
                        if !self.registry.is_ignored(wire) {
                            self.melt_property(wire, field_value, &mut record);
                        }
                    }
                }
                _ => self.melt_property(key, value, &mut record),
            }
        }

        Ok(record)
    }

    /// Store one registered-level property under every descriptor requesting it
    fn melt_property(&self, wire: &str, value: &Value, record: &mut DynamicRecord) {
        let specs = self.registry.lookup(wire);

        if specs.is_empty() {
            self.store(wire, wire.to_string(), value, record);
            return;
        }

        let mut stored_verbatim = false;
        for spec in specs {
            match (spec.flatten_key(), value) {
                (Some(key), Value::Object(obj)) => {
                    // An absent sub-key is an absent optional attribute, not an error
                    if let Some(sub) = obj.get(key) {
                        self.store(key, spec.output_name().to_string(), sub, record);
                    }
                }
                (Some(key), Value::Array(items)) => {
                    let collapsed = collapse(items, key, spec.collapse_separator());
                    record.insert(spec.output_name(), collapsed);
                }
                (Some(_), Value::Null) => {
                    record.insert(spec.output_name(), DynamicValue::Null);
                }
                (Some(_), scalar) => {
                    // Shape differs from the declaration: keep the value once, under
                    // the first registered descriptor
                    if !stored_verbatim {
                        let name = self
                            .registry
                            .resolve(wire, None)
                            .map_or(wire, FieldSpec::output_name)
                            .to_string();
                        self.store(wire, name, scalar, record);
                        stored_verbatim = true;
                    }
                }
                (None, _) => {
                    self.store(wire, spec.output_name().to_string(), value, record);
                }
            }
        }
    }

    /// Store a value under `column`, promoting nested objects and collapsing arrays
    fn store(&self, wire: &str, column: String, value: &Value, record: &mut DynamicRecord) {
        let separator = &self.registry.config().nested_separator;
        let dynamic = self.to_dynamic(wire, value);
        record.insert_flattened(column, dynamic, separator);
    }

    /// Generic JSON to dynamic conversion; objects become transient nested records
    fn to_dynamic(&self, wire: &str, value: &Value) -> DynamicValue {
        match value {
            Value::Object(obj) => DynamicValue::Nested(self.melt_object(obj)),
            Value::Array(items) => self.collapse_unkeyed(wire, items),
            scalar => coerce_scalar(scalar),
        }
    }

    fn melt_object(&self, obj: &Map<String, Value>) -> DynamicRecord {
        let mut nested = DynamicRecord::new();
        for (key, value) in obj.iter() {
            if self.registry.is_ignored(key) {
                continue;
            }
            nested.insert(key.as_str(), self.to_dynamic(key, value));
        }
        nested
    }

    /// Collapse an array that has no flatten key of its own
    fn collapse_unkeyed(&self, wire: &str, items: &[Value]) -> DynamicValue {
        let keys = self.registry.extract_keys_for(wire);
        let segments: Vec<String> = items
            .iter()
            .filter_map(|item| match item {
                Value::Object(obj) => keys
                    .iter()
                    .find_map(|k| obj.get(*k))
                    .map(render_segment),
                Value::Array(_) | Value::Null => None,
                scalar => Some(render_segment(scalar)),
            })
            .collect();

        DynamicValue::String(segments.join(DEFAULT_SEPARATOR))
    }
}

/// Join the `key` values of every array element carrying it, in source order.
pub fn collapse(items: &[Value], key: &str, separator: &str) -> String {
    items
        .iter()
        .filter_map(|item| item.as_object().and_then(|obj| obj.get(key)))
        .map(render_segment)
        .collect::<Vec<_>>()
        .join(separator)
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Output columns a descriptor list will produce for a fully populated issue
pub fn declared_columns(fields: &[FieldSpec]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for spec in fields {
        if !columns.iter().any(|c| c == spec.output_name()) {
            columns.push(spec.output_name().to_string());
        }
    }
    columns
}
