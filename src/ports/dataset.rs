//! Dataset and export ports: Traits for ingestion and report output.

use crate::domain::{PatientReport, Visit, VisitLog};

/// Column names of the tabular dataset.
pub const PATIENT_ID_COLUMN: &str = "Patient_ID";
pub const DATE_COLUMN: &str = "Date";

/// Source of visit rows for one analysis.
pub trait DatasetSource {
    /// Error type for ingestion.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load an immutable snapshot of the dataset.
    ///
    /// # Errors
    /// Returns error if the dataset is unreadable or lacks required columns.
    fn load(&self) -> Result<Vec<Visit>, Self::Error>;
}

impl DatasetSource for VisitLog {
    type Error = std::convert::Infallible;

    fn load(&self) -> Result<Vec<Visit>, Self::Error> {
        Ok(self.snapshot())
    }
}

/// Sink for finished patient reports.
pub trait ReportExporter {
    /// Error type for export.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Write the reports.
    ///
    /// # Errors
    /// Returns error if the output cannot be written.
    fn export(&self, reports: &[PatientReport]) -> Result<(), Self::Error>;
}
