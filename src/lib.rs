//! # Issue Melt - Tracker Query and Flattening Toolkit
//!
//! Queries a ticket-tracking search API and melts its nested, loosely-typed
//! JSON issues into flat records ready for CSV or spreadsheet export.
//!
//! ## Modules
//!
//! - **melt**: Field descriptors, the per-query field registry and the issue flattener
//! - **query**: Search transports and the cursor-driven pagination engine
//! - **project**: Typed projection of flattened records, with parsers for polymorphic fields
//! - **catalog**: Common tracker fields and a typed report row
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use issue_melt::melt::FieldSpec;
//! use issue_melt::query::{ClientConfig, HttpSearchClient, QueryEngine};
//!
//! # async fn run() -> issue_melt::Result<()> {
//! let client = HttpSearchClient::new(ClientConfig::from_env()?)?;
//! let engine = QueryEngine::new(client);
//!
//! let fields = vec![
//!     FieldSpec::new("summary").alias("Summary"),
//!     FieldSpec::new("status").flatten("name").alias("Status"),
//! ];
//! let records = engine.run_query("project = X", &fields).await?;
//!
//! for record in &records {
//!     println!("{:?} {:?}", record.get("Summary"), record.get("Status"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Offline melting
//!
//! ```rust
//! use issue_melt::melt::{FieldRegistry, FieldSpec, IssueMelter, RegistryConfig};
//! use issue_melt::value::DynamicValue;
//! use serde_json::json;
//!
//! let fields = vec![FieldSpec::new("status").flatten("name").alias("Status")];
//! let registry = FieldRegistry::build(&fields, RegistryConfig::default()).unwrap();
//!
//! let issue = json!({"key": "X-1", "fields": {"status": {"name": "Done"}}});
//! let record = IssueMelter::new(&registry).melt(&issue).unwrap();
//!
//! assert_eq!(record.get("Status"), Some(&DynamicValue::from("Done")));
//! ```

pub mod catalog;
pub mod error;
pub mod melt;
pub mod project;
pub mod query;
pub mod value;

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use melt::{FieldRegistry, FieldSpec, IssueMelter, RegistryConfig};
pub use project::{FieldDescriptor, FromDynamic};
pub use query::{ClientConfig, HttpSearchClient, QueryEngine, QueryOptions, QueryOutcome, QueryWarning};
pub use value::{DynamicRecord, DynamicValue};

/// Main entry point: run one fully paginated query over HTTP
pub async fn run_query(
    config: ClientConfig,
    jql: &str,
    fields: &[FieldSpec],
) -> Result<Vec<DynamicRecord>> {
    let engine = QueryEngine::new(HttpSearchClient::new(config)?);
    engine.run_query(jql, fields).await
}
