//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application.

mod analysis;
mod history;
mod scoring;

pub use analysis::{group_by_patient, Analysis, AnalysisService};
pub use history::{HistoryService, RecordSummary};
pub use scoring::{RiskScorer, ScoredBatch, ScoringOutcome, ScoringWarning};
