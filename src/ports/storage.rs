//! Storage port: Trait for persisting scored visits.
//!
//! Trend and forecast logic only read history through this trait and never
//! depend on the storage technology behind it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{LabPanel, ScoredVisit};

/// A persisted scored visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRecord {
    pub id: i64,
    pub patient_id: Option<i64>,
    pub visit_date: Option<NaiveDate>,
    pub panel: LabPanel,
    pub probability: Option<f64>,
    pub prediction: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl RiskRecord {
    /// Convert back to a scored visit for analysis.
    #[must_use]
    pub fn to_scored_visit(&self) -> ScoredVisit {
        ScoredVisit {
            patient_id: self.patient_id,
            visit_date: self.visit_date,
            panel: self.panel,
            risk_probability: self.probability,
        }
    }
}

/// A page of records with pagination metadata.
#[derive(Debug, Clone)]
pub struct RecordPage {
    /// Records in this page
    pub items: Vec<RiskRecord>,
    /// Total count of records for the patient
    pub total_count: usize,
    /// Current page offset
    pub offset: usize,
    /// Page size limit
    pub limit: usize,
    /// Whether there are more pages
    pub has_more: bool,
}

impl RecordPage {
    /// Create a new record page.
    #[must_use]
    pub fn new(items: Vec<RiskRecord>, total_count: usize, offset: usize, limit: usize) -> Self {
        let has_more = offset + items.len() < total_count;
        Self {
            items,
            total_count,
            offset,
            limit,
            has_more,
        }
    }

    /// Get the next page offset.
    #[must_use]
    pub fn next_offset(&self) -> Option<usize> {
        self.has_more.then_some(self.offset + self.limit)
    }
}

/// Trait for visit persistence.
pub trait VisitStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Save a scored visit together with its prediction.
    ///
    /// # Returns
    /// The record id.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn save(&self, visit: &ScoredVisit) -> Result<i64, Self::Error>;

    /// Load a patient's records ordered by visit date, then insertion.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn history(&self, patient_id: i64) -> Result<Vec<RiskRecord>, Self::Error>;

    /// Load a patient's records with pagination.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn history_paginated(
        &self,
        patient_id: i64,
        offset: usize,
        limit: usize,
    ) -> Result<RecordPage, Self::Error>;

    /// Count all stored records.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn count(&self) -> Result<usize, Self::Error>;

    /// Delete a record by id.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn delete(&self, id: i64) -> Result<(), Self::Error>;

    /// Delete all records.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn clear_all(&self) -> Result<(), Self::Error>;
}
