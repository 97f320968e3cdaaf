//! Risk scoring service: Turns visits into risk percentages.
//!
//! The scorer owns the classifier handle for the whole process. Scoring a
//! batch either fails up front (a row lacks a feature) or returns one entry
//! per row, with `None` where the classifier could not answer.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{MissingFeatureError, ScoredVisit, Visit};
use crate::ports::{Classifier, ClassifierError, ScoringRequest};

/// A row whose probability is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringWarning {
    /// Row index within the scored batch
    pub row: usize,
    pub patient_id: Option<i64>,
    pub visit_date: Option<NaiveDate>,
    pub reason: String,
}

impl std::fmt::Display for ScoringWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.visit_date {
            Some(date) => write!(f, "row {} ({}): {}", self.row, date, self.reason),
            None => write!(f, "row {}: {}", self.row, self.reason),
        }
    }
}

/// Per-row probabilities of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringOutcome {
    /// Percent in [0, 100] rounded to one decimal, in input order
    pub probabilities: Vec<Option<f64>>,
    pub warnings: Vec<ScoringWarning>,
}

/// Scored visits of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBatch {
    pub visits: Vec<ScoredVisit>,
    pub warnings: Vec<ScoringWarning>,
}

impl ScoredBatch {
    /// Number of rows that received a probability.
    #[must_use]
    pub fn scored_count(&self) -> usize {
        self.visits
            .iter()
            .filter(|v| v.risk_probability.is_some())
            .count()
    }
}

/// Convert a positive-class probability to a percentage with one decimal.
fn to_percent(probability: f64) -> Result<f64, ClassifierError> {
    if !probability.is_finite() {
        return Err(ClassifierError::NonFinite);
    }
    if !(0.0..=1.0).contains(&probability) {
        return Err(ClassifierError::MalformedResponse(format!(
            "probability {probability} outside [0, 1]"
        )));
    }
    Ok((probability * 1000.0).round() / 10.0)
}

/// Service wrapping the classifier.
pub struct RiskScorer<C: Classifier + ?Sized> {
    classifier: Arc<C>,
}

impl<C: Classifier + ?Sized> RiskScorer<C> {
    /// Create a scorer owning `classifier`.
    pub fn new(classifier: Arc<C>) -> Self {
        tracing::info!("Risk scorer using {}", classifier.describe());
        Self { classifier }
    }

    /// Score every row of the batch.
    ///
    /// # Errors
    /// Returns `MissingFeatureError` without scoring anything if any row
    /// lacks a required feature.
    pub fn score(&self, visits: &[Visit]) -> Result<ScoringOutcome, MissingFeatureError> {
        let batch = self.score_visits(visits)?;
        Ok(ScoringOutcome {
            probabilities: batch.visits.iter().map(|v| v.risk_probability).collect(),
            warnings: batch.warnings,
        })
    }

    /// Score every row and attach the result to a copy of the visit.
    ///
    /// # Errors
    /// Returns `MissingFeatureError` if any row lacks a required feature.
    pub fn score_visits(&self, visits: &[Visit]) -> Result<ScoredBatch, MissingFeatureError> {
        MissingFeatureError::check(visits)?;

        let mut scored = Vec::with_capacity(visits.len());
        let mut warnings = Vec::new();

        for (row, visit) in visits.iter().enumerate() {
            // Checked above; a failure here means the batch changed shape.
            let panel = visit.lab_panel().map_err(|columns| MissingFeatureError {
                columns,
                rows: vec![row],
            })?;

            let request = ScoringRequest {
                patient_id: visit.patient_id,
                visit_date: visit.visit_date,
                features: panel,
            };

            let risk_probability = match self
                .classifier
                .predict_proba(&request)
                .and_then(to_percent)
            {
                Ok(percent) => Some(percent),
                Err(e) => {
                    tracing::warn!(row, "Scoring failed, probability unavailable: {}", e);
                    warnings.push(ScoringWarning {
                        row,
                        patient_id: visit.patient_id,
                        visit_date: visit.visit_date,
                        reason: e.to_string(),
                    });
                    None
                }
            };

            scored.push(ScoredVisit {
                patient_id: visit.patient_id,
                visit_date: visit.visit_date,
                panel,
                risk_probability,
            });
        }

        tracing::debug!(
            rows = scored.len(),
            failed = warnings.len(),
            "Scored batch"
        );

        Ok(ScoredBatch {
            visits: scored,
            warnings,
        })
    }
}
