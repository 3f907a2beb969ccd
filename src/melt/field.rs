use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Separator used when an array is collapsed into one cell.
pub const DEFAULT_SEPARATOR: &str = ", ";

/// Declares one remote field to request and how to name it in the output.
///
/// The output column name is resolved once at construction: the alias when
/// one is given, otherwise the wire name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawFieldSpec", into = "RawFieldSpec")]
pub struct FieldSpec {
    wire_name: String,
    alias: String,
    flatten_key: Option<String>,
    separator: String,
    output_name: String,
}

impl FieldSpec {
    pub fn new(wire_name: impl Into<String>) -> Self {
        let wire_name = wire_name.into();
        FieldSpec {
            output_name: wire_name.clone(),
            wire_name,
            alias: String::new(),
            flatten_key: None,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    /// Set the output column name. An empty alias falls back to the wire name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self.output_name = if self.alias.is_empty() {
            self.wire_name.clone()
        } else {
            self.alias.clone()
        };
        self
    }

    /// Extract this sub-key from object values (or from each element of array values).
    pub fn flatten(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.flatten_key = if key.is_empty() { None } else { Some(key) };
        self
    }

    /// Separator used when an array value is collapsed into one string.
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn wire_name(&self) -> &str {
        &self.wire_name
    }

    pub fn alias_name(&self) -> &str {
        &self.alias
    }

    pub fn flatten_key(&self) -> Option<&str> {
        self.flatten_key.as_deref()
    }

    pub fn collapse_separator(&self) -> &str {
        &self.separator
    }

    /// Column name this field is stored under in a flattened record.
    pub fn output_name(&self) -> &str {
        &self.output_name
    }
}

/// Shorthand: `wire[.flattenKey][=Alias]`, e.g. `status.name=Status`.
impl FromStr for FieldSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (path, alias) = match s.split_once('=') {
            Some((path, alias)) => (path.trim(), alias.trim()),
            None => (s, ""),
        };
        let (wire, flatten_key) = match path.split_once('.') {
            Some((wire, key)) => (wire, key),
            None => (path, ""),
        };

        if wire.is_empty() {
            return Err(Error::Config(format!("field `{}` has no wire name", s)));
        }

        Ok(FieldSpec::new(wire).flatten(flatten_key).alias(alias))
    }
}

#[derive(Serialize, Deserialize)]
struct RawFieldSpec {
    wire: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    flatten: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    separator: Option<String>,
}

impl From<RawFieldSpec> for FieldSpec {
    fn from(raw: RawFieldSpec) -> Self {
        let mut spec = FieldSpec::new(raw.wire)
            .alias(raw.alias)
            .flatten(raw.flatten.unwrap_or_default());
        if let Some(sep) = raw.separator {
            spec = spec.separator(sep);
        }
        spec
    }
}

impl From<FieldSpec> for RawFieldSpec {
    fn from(spec: FieldSpec) -> Self {
        let separator = if spec.separator == DEFAULT_SEPARATOR {
            None
        } else {
            Some(spec.separator)
        };
        RawFieldSpec {
            wire: spec.wire_name,
            alias: spec.alias,
            flatten: spec.flatten_key,
            separator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_name_defaults_to_wire_name() {
        let spec = FieldSpec::new("customfield_10016");
        assert_eq!(spec.output_name(), "customfield_10016");

        let spec = FieldSpec::new("customfield_10016").alias("");
        assert_eq!(spec.output_name(), "customfield_10016");
    }

    #[test]
    fn test_alias_wins_when_present() {
        let spec = FieldSpec::new("status").flatten("name").alias("Status");
        assert_eq!(spec.output_name(), "Status");
        assert_eq!(spec.flatten_key(), Some("name"));
    }

    #[test]
    fn test_shorthand_parsing() {
        let spec: FieldSpec = "status.name=Status".parse().unwrap();
        assert_eq!(spec.wire_name(), "status");
        assert_eq!(spec.flatten_key(), Some("name"));
        assert_eq!(spec.output_name(), "Status");

        let spec: FieldSpec = "summary".parse().unwrap();
        assert_eq!(spec.flatten_key(), None);
        assert_eq!(spec.output_name(), "summary");

        assert!("=Alias".parse::<FieldSpec>().is_err());
    }

    #[test]
    fn test_json_config_form() {
        let spec: FieldSpec = serde_json::from_value(json!({
            "wire": "customfield_10020",
            "alias": "Sprint",
            "flatten": "name",
            "separator": ","
        }))
        .unwrap();

        assert_eq!(spec.output_name(), "Sprint");
        assert_eq!(spec.collapse_separator(), ",");

        let back = serde_json::to_value(&spec).unwrap();
        assert_eq!(back["wire"], "customfield_10020");
        assert_eq!(back["flatten"], "name");
    }
}
