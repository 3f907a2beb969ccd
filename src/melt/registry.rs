//! Run-scoped index from wire field name to the descriptors requesting it.
//!
//! A registry is built once per paginated query and is read-only afterwards;
//! every page of that query is flattened against the same registry.

use crate::error::{Error, Result};
use crate::melt::field::FieldSpec;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Default separator between a parent column and a promoted child column.
pub const NESTED_SEPARATOR: &str = ".";

/// Immutable configuration handed to the registry builder.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Property whose children are promoted into the record root.
    pub fields_container: String,

    /// Properties dropped at every level, registered or not.
    pub ignored: Vec<String>,

    /// Sub-keys tried, in order, when an array of objects has no flatten key.
    pub extract_keys: Vec<String>,

    /// Separator between a parent column and a promoted child column.
    pub nested_separator: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            fields_container: String::from("fields"),
            ignored: [
                // pagination metadata
                "startAt",
                "maxResults",
                "total",
                "isLast",
                "nextPageToken",
                // housekeeping
                "self",
                "expand",
                "iconUrl",
                "avatarUrls",
                // API echo
                "names",
                "schema",
                "renderedFields",
                "operations",
                "editmeta",
                "changelog",
                "versionedRepresentations",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            extract_keys: ["value", "name", "displayName", "key"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            nested_separator: String::from(NESTED_SEPARATOR),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldRegistry {
    by_wire: HashMap<String, Vec<FieldSpec>>,
    wire_order: Vec<String>,
    ignored: HashSet<String>,
    config: RegistryConfig,
}

impl FieldRegistry {
    /// Build a registry from a descriptor list.
    ///
    /// Descriptors sharing a wire name are kept in registration order. A later
    /// descriptor repeating an earlier one's flatten key for the same wire
    /// name is dropped: first registered wins.
    pub fn build<'a, I>(fields: I, config: RegistryConfig) -> Result<Self>
    where
        I: IntoIterator<Item = &'a FieldSpec>,
    {
        let mut by_wire: HashMap<String, Vec<FieldSpec>> = HashMap::new();
        let mut wire_order = Vec::new();

        for spec in fields {
            if spec.wire_name().is_empty() {
                return Err(Error::Config("field descriptor with empty wire name".to_string()));
            }

            let entry = by_wire.entry(spec.wire_name().to_string()).or_insert_with(|| {
                wire_order.push(spec.wire_name().to_string());
                Vec::new()
            });

            if entry.iter().any(|s| s.flatten_key() == spec.flatten_key()) {
                debug!(
                    wire = spec.wire_name(),
                    flatten_key = ?spec.flatten_key(),
                    "duplicate field descriptor ignored"
                );
                continue;
            }
            entry.push(spec.clone());
        }

        let ignored = config.ignored.iter().cloned().collect();

        Ok(FieldRegistry {
            by_wire,
            wire_order,
            ignored,
            config,
        })
    }

    /// Descriptors registered for a wire name, in registration order.
    pub fn lookup(&self, wire_name: &str) -> &[FieldSpec] {
        self.by_wire
            .get(wire_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolve one descriptor: the one with a matching flatten key if any,
    /// otherwise the first registered.
    pub fn resolve(&self, wire_name: &str, flatten_key: Option<&str>) -> Option<&FieldSpec> {
        let specs = self.lookup(wire_name);
        specs
            .iter()
            .find(|s| flatten_key.is_some() && s.flatten_key() == flatten_key)
            .or_else(|| specs.first())
    }

    /// Sub-keys to pull out of array elements for a field with no flatten key.
    pub fn extract_keys_for(&self, wire_name: &str) -> Vec<&str> {
        let registered: Vec<&str> = self
            .lookup(wire_name)
            .iter()
            .filter_map(FieldSpec::flatten_key)
            .collect();

        if registered.is_empty() {
            self.config.extract_keys.iter().map(String::as_str).collect()
        } else {
            registered
        }
    }

    pub fn is_ignored(&self, property: &str) -> bool {
        self.ignored.contains(property)
    }

    /// Unique wire names to request, in first-registered order.
    pub fn wire_names(&self) -> Vec<String> {
        self.wire_order.clone()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(specs: &[FieldSpec]) -> FieldRegistry {
        FieldRegistry::build(specs, RegistryConfig::default()).unwrap()
    }

    #[test]
    fn test_multiple_descriptors_share_a_wire_name() {
        let specs = vec![
            FieldSpec::new("assignee").flatten("displayName").alias("Assignee"),
            FieldSpec::new("assignee").flatten("emailAddress").alias("Assignee Email"),
            FieldSpec::new("summary"),
        ];
        let reg = registry(&specs);

        assert_eq!(reg.lookup("assignee").len(), 2);
        assert_eq!(reg.wire_names(), vec!["assignee", "summary"]);
        assert_eq!(
            reg.resolve("assignee", Some("emailAddress")).map(FieldSpec::output_name),
            Some("Assignee Email")
        );
        assert_eq!(reg.resolve("assignee", None).map(FieldSpec::output_name), Some("Assignee"));
    }

    #[test]
    fn test_duplicate_flatten_key_first_registered_wins() {
        let specs = vec![
            FieldSpec::new("status").flatten("name").alias("Status"),
            FieldSpec::new("status").flatten("name").alias("State"),
        ];
        let reg = registry(&specs);

        assert_eq!(reg.lookup("status").len(), 1);
        assert_eq!(reg.resolve("status", Some("name")).map(FieldSpec::output_name), Some("Status"));
    }

    #[test]
    fn test_unregistered_defaults() {
        let reg = registry(&[FieldSpec::new("labels")]);

        assert!(reg.resolve("created", None).is_none());
        assert!(reg.lookup("created").is_empty());
        assert_eq!(reg.extract_keys_for("components"), vec!["value", "name", "displayName", "key"]);
        assert!(reg.is_ignored("self"));
        assert!(reg.is_ignored("nextPageToken"));
        assert!(!reg.is_ignored("key"));
    }

    #[test]
    fn test_registered_flatten_keys_drive_extraction() {
        let reg = registry(&[FieldSpec::new("fixVersions").flatten("name")]);
        assert_eq!(reg.extract_keys_for("fixVersions"), vec!["name"]);
    }

    #[test]
    fn test_empty_wire_name_rejected() {
        let specs = vec![FieldSpec::new("")];
        assert!(FieldRegistry::build(&specs, RegistryConfig::default()).is_err());
    }
}
