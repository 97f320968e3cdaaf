//! History service: Records scored visits and replays stored history.

use std::sync::Arc;

use crate::domain::{PatientSeries, ScoredVisit};
use crate::ports::{RecordPage, VisitStore};
use crate::HemotrendError;

/// Outcome of recording a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub saved: usize,
    pub failed: usize,
}

/// Service for visit persistence.
pub struct HistoryService<S>
where
    S: VisitStore,
{
    store: Arc<S>,
}

impl<S> HistoryService<S>
where
    S: VisitStore,
    S::Error: Into<crate::adapters::StorageError>,
{
    /// Create a new history service.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Save every visit of a scored batch.
    ///
    /// A failed save is logged and counted; it never aborts the batch, since
    /// the analysis itself does not depend on persistence.
    pub fn record_batch(&self, visits: &[ScoredVisit]) -> RecordSummary {
        let mut summary = RecordSummary::default();

        for visit in visits {
            match self.store.save(visit) {
                Ok(_) => summary.saved += 1,
                Err(e) => {
                    let e: crate::adapters::StorageError = e.into();
                    tracing::warn!("Failed to save scored visit: {}", e);
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            "Recorded {} visits ({} failed)",
            summary.saved,
            summary.failed
        );
        summary
    }

    /// Rebuild a patient's series from stored records.
    ///
    /// # Errors
    /// Returns error if storage fails or the patient has no records.
    pub fn patient_series(&self, patient_id: i64) -> Result<PatientSeries, HemotrendError> {
        let records = self
            .store
            .history(patient_id)
            .map_err(|e| HemotrendError::Storage(e.into()))?;

        if records.is_empty() {
            return Err(HemotrendError::PatientNotFound(patient_id));
        }

        let visits = records.iter().map(|r| r.to_scored_visit()).collect();
        Ok(PatientSeries::new(Some(patient_id), visits))
    }

    /// One page of a patient's stored records.
    ///
    /// # Errors
    /// Returns error if storage fails.
    pub fn records(
        &self,
        patient_id: i64,
        offset: usize,
        limit: usize,
    ) -> Result<RecordPage, HemotrendError> {
        self.store
            .history_paginated(patient_id, offset, limit)
            .map_err(|e| HemotrendError::Storage(e.into()))
    }

    /// Total number of stored records.
    ///
    /// # Errors
    /// Returns error if storage fails.
    pub fn count(&self) -> Result<usize, HemotrendError> {
        self.store
            .count()
            .map_err(|e| HemotrendError::Storage(e.into()))
    }
}
