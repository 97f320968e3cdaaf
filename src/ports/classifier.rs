//! Classifier port: Trait for the anemia classification model.
//!
//! This trait abstracts the model (local artifact or remote scoring service)
//! from the risk scorer.

use chrono::NaiveDate;

use crate::domain::LabPanel;

/// Errors raised by a classifier for a single scoring call.
///
/// These never abort a batch: the risk scorer records the affected row as
/// unscored and moves on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifierError {
    #[error("Scoring backend unavailable: {0}")]
    Unavailable(String),

    #[error("Scoring call timed out")]
    Timeout,

    #[error("Scoring backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed scoring response: {0}")]
    MalformedResponse(String),

    #[error("Model produced a non-finite score")]
    NonFinite,
}

/// One row handed to the classifier.
///
/// Local models only read `features`; remote backends also forward the
/// patient and date so that the service can persist the record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringRequest {
    pub patient_id: Option<i64>,
    pub visit_date: Option<NaiveDate>,
    pub features: LabPanel,
}

/// Trait for binary anemia classifiers.
pub trait Classifier: Send + Sync {
    /// Probability mass of the positive ("anemic") class.
    ///
    /// # Returns
    /// A probability in `[0, 1]`.
    ///
    /// # Errors
    /// Returns `ClassifierError` if the call fails or the response is unusable.
    fn predict_proba(&self, request: &ScoringRequest) -> Result<f64, ClassifierError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}
