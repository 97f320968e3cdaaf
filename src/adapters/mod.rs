//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external libraries:
//! - `logistic`: exported logistic-regression model (serde_json, sha2)
//! - `remote`: HTTP scoring service client (ureq)
//! - `retry`: bounded retry decorator for any classifier
//! - `sqlite`: SQLite for scored visit history
//! - `tabular`: CSV ingestion and table export
//! - `json`: JSON report export
//! - `sanitize`: PII filtering for logs

pub mod json;
pub mod logistic;
pub mod remote;
pub mod retry;
pub mod sanitize;
pub mod sqlite;
pub mod tabular;

// Re-export adapter errors for lib.rs
pub use logistic::ModelLoadError;
pub use sqlite::StorageError;
pub use tabular::{ExportError, IngestError};
