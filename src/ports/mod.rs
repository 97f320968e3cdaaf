//! Ports layer: Trait definitions for external collaborators.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the analysis core and external systems (model, storage, files).

mod classifier;
mod dataset;
mod storage;

pub use classifier::{Classifier, ClassifierError, ScoringRequest};
pub use dataset::{DatasetSource, ReportExporter, DATE_COLUMN, PATIENT_ID_COLUMN};
pub use storage::{RecordPage, RiskRecord, VisitStore};
