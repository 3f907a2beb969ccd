//! Catalog of commonly requested tracker fields.
//!
//! Custom field codes differ per tracker instance, so fields backed by custom
//! fields (sprint, story points) take the code as an argument.

use crate::error::Result;
use crate::melt::FieldSpec;
use crate::project::{parsers, FieldDescriptor};
use crate::value::{DynamicRecord, DynamicValue};
use chrono::{DateTime, FixedOffset};

pub fn summary() -> FieldSpec {
    FieldSpec::new("summary").alias("Summary")
}

pub fn status() -> FieldSpec {
    FieldSpec::new("status").flatten("name").alias("Status")
}

pub fn issue_type() -> FieldSpec {
    FieldSpec::new("issuetype").flatten("name").alias("Issue Type")
}

pub fn priority() -> FieldSpec {
    FieldSpec::new("priority").flatten("name").alias("Priority")
}

pub fn assignee() -> FieldSpec {
    FieldSpec::new("assignee").flatten("displayName").alias("Assignee")
}

pub fn reporter() -> FieldSpec {
    FieldSpec::new("reporter").flatten("displayName").alias("Reporter")
}

pub fn created() -> FieldSpec {
    FieldSpec::new("created").alias("Created")
}

pub fn updated() -> FieldSpec {
    FieldSpec::new("updated").alias("Updated")
}

pub fn resolved() -> FieldSpec {
    FieldSpec::new("resolutiondate").alias("Resolved")
}

pub fn labels() -> FieldSpec {
    FieldSpec::new("labels").alias("Labels")
}

pub fn components() -> FieldSpec {
    FieldSpec::new("components").flatten("name").alias("Components")
}

pub fn fix_versions() -> FieldSpec {
    FieldSpec::new("fixVersions").flatten("name").alias("Fix Versions")
}

/// Sprint assignments, collapsed to sprint names in assignment order.
pub fn sprint(code: &str) -> FieldSpec {
    FieldSpec::new(code).flatten("name").alias("Sprint").separator(",")
}

pub fn story_points(code: &str) -> FieldSpec {
    FieldSpec::new(code).alias("Story Points")
}

/// The standard report column set
pub fn default_report(sprint_code: &str, points_code: &str) -> Vec<FieldSpec> {
    vec![
        summary(),
        issue_type(),
        status(),
        priority(),
        assignee(),
        reporter(),
        created(),
        updated(),
        resolved(),
        labels(),
        components(),
        fix_versions(),
        sprint(sprint_code),
        story_points(points_code),
    ]
}

/// A strongly-shaped report row.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRow {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub assignee: String,
    pub created: Option<DateTime<FixedOffset>>,
    pub resolved: Option<DateTime<FixedOffset>>,
    pub story_points: f64,
    pub sprints: Vec<String>,
}

/// Typed descriptors backing [`IssueRow`].
pub struct ReportFields {
    pub key: FieldDescriptor<String>,
    pub summary: FieldDescriptor<String>,
    pub status: FieldDescriptor<String>,
    pub assignee: FieldDescriptor<String>,
    pub created: FieldDescriptor<Option<DateTime<FixedOffset>>>,
    pub resolved: FieldDescriptor<Option<DateTime<FixedOffset>>>,
    pub story_points: FieldDescriptor<f64>,
    pub sprints: FieldDescriptor<Vec<String>>,
}

impl ReportFields {
    pub fn new(sprint_code: &str, points_code: &str) -> Self {
        ReportFields {
            // Always present on issues, never requested as a field
            key: FieldDescriptor::new(FieldSpec::new("key")),
            summary: FieldDescriptor::new(summary()),
            status: FieldDescriptor::new(status()),
            assignee: FieldDescriptor::new(assignee()),
            created: FieldDescriptor::new(created()),
            resolved: FieldDescriptor::new(resolved()),
            story_points: FieldDescriptor::new(story_points(points_code))
                .with_shared_parser(parsers::quantity()),
            sprints: FieldDescriptor::new(sprint(sprint_code)).with_shared_parser(parsers::comma_list()),
        }
    }

    /// Field list to hand to the query engine
    pub fn specs(&self) -> Vec<FieldSpec> {
        vec![
            self.summary.spec().clone(),
            self.status.spec().clone(),
            self.assignee.spec().clone(),
            self.created.spec().clone(),
            self.resolved.spec().clone(),
            self.story_points.spec().clone(),
            self.sprints.spec().clone(),
        ]
    }

    pub fn project(&self, record: &DynamicRecord) -> Result<IssueRow> {
        Ok(IssueRow {
            key: self.key.parse(record)?,
            summary: self.summary.parse(record)?,
            status: self.status.parse(record)?,
            assignee: self.assignee.parse(record)?,
            created: self.created.parse(record)?,
            resolved: self.resolved.parse(record)?,
            story_points: self.story_points.parse(record)?,
            sprints: self.sprints.parse(record)?,
        })
    }
}

/// Render a projected row back into a flat record, e.g. for export
impl From<&IssueRow> for DynamicRecord {
    fn from(row: &IssueRow) -> Self {
        let mut record = DynamicRecord::new();
        record.insert("Key", row.key.as_str());
        record.insert("Summary", row.summary.as_str());
        record.insert("Status", row.status.as_str());
        record.insert("Assignee", row.assignee.as_str());
        record.insert(
            "Created",
            row.created.map(DynamicValue::DateTime).unwrap_or(DynamicValue::Null),
        );
        record.insert(
            "Resolved",
            row.resolved.map(DynamicValue::DateTime).unwrap_or(DynamicValue::Null),
        );
        record.insert("Story Points", row.story_points);
        record.insert("Sprint", row.sprints.join(","));
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::melt::{FieldRegistry, IssueMelter, RegistryConfig};
    use serde_json::json;

    #[test]
    fn test_default_report_wire_names_are_unique() {
        let fields = default_report("customfield_10020", "customfield_10016");
        let registry = FieldRegistry::build(&fields, RegistryConfig::default()).unwrap();
        assert_eq!(registry.wire_names().len(), fields.len());
    }

    #[test]
    fn test_project_melted_issue_into_row() {
        let report = ReportFields::new("customfield_10020", "customfield_10016");
        let specs = report.specs();
        let registry = FieldRegistry::build(&specs, RegistryConfig::default()).unwrap();

        let issue = json!({
            "id": "10001",
            "key": "PROJ-7",
            "fields": {
                "summary": "Export breaks on unicode",
                "status": {"name": "In Progress"},
                "assignee": null,
                "created": "2024-04-02T08:15:00.000+0200",
                "resolutiondate": null,
                "customfield_10016": {"value": 5},
                "customfield_10020": [{"name": "Sprint 12"}, {"name": "Sprint 13"}]
            }
        });

        let record = IssueMelter::new(&registry).melt(&issue).unwrap();
        let row = report.project(&record).unwrap();

        assert_eq!(row.key, "PROJ-7");
        assert_eq!(row.status, "In Progress");
        assert_eq!(row.assignee, "");
        assert!(row.created.is_some());
        assert_eq!(row.resolved, None);
        assert_eq!(row.story_points, 5.0);
        assert_eq!(row.sprints, vec!["Sprint 12", "Sprint 13"]);

        let flat = DynamicRecord::from(&row);
        assert_eq!(flat.get("Sprint"), Some(&DynamicValue::from("Sprint 12,Sprint 13")));
    }
}
