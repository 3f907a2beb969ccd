//! Issue melting - flatten nested tracker JSON into flat records
//!
//! A [`FieldRegistry`] built from the caller's [`FieldSpec`] list decides, per
//! property, whether a value is stored verbatim, split into named sub-columns,
//! or collapsed from an array into one delimited string. [`IssueMelter`]
//! applies those decisions to one raw issue at a time.

pub mod coerce;
pub mod field;
pub mod flatten;
pub mod registry;
pub mod writer;

pub use field::{FieldSpec, DEFAULT_SEPARATOR};
pub use flatten::{collapse, declared_columns, IssueMelter};
pub use registry::{FieldRegistry, RegistryConfig, NESTED_SEPARATOR};
pub use writer::{CsvRecordWriter, JsonLinesWriter};
