//! Visit types for anemia risk monitoring.
//!
//! A visit is one blood panel for one patient at one point in time. The five
//! model features follow the column names of the anemia training dataset.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Number of features consumed by the classifier.
pub const FEATURE_COUNT: usize = 5;

/// Feature names in classifier order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = ["Gender", "Hemoglobin", "MCH", "MCHC", "MCV"];

/// Probability (in percent) at or above which a visit is flagged positive.
pub const POSITIVE_THRESHOLD: f64 = 50.0;

/// A batch contains rows that do not supply every required feature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing required features [{}] in rows {:?}", .columns.join(", "), .rows)]
pub struct MissingFeatureError {
    /// Absent feature names, in classifier order
    pub columns: Vec<&'static str>,
    /// Indices of the incomplete rows
    pub rows: Vec<usize>,
}

impl MissingFeatureError {
    /// Check a batch, failing on the first incomplete row and naming every
    /// absent column across the batch.
    ///
    /// # Errors
    /// Returns `MissingFeatureError` if any row is incomplete.
    pub fn check(visits: &[Visit]) -> Result<(), Self> {
        let mut rows = Vec::new();
        let mut absent = [false; FEATURE_COUNT];

        for (index, visit) in visits.iter().enumerate() {
            let missing = visit.missing_features();
            if missing.is_empty() {
                continue;
            }
            rows.push(index);
            for (slot, name) in absent.iter_mut().zip(FEATURE_NAMES) {
                if missing.contains(&name) {
                    *slot = true;
                }
            }
        }

        if rows.is_empty() {
            return Ok(());
        }

        let columns = FEATURE_NAMES
            .iter()
            .zip(absent)
            .filter(|(_, is_absent)| *is_absent)
            .map(|(name, _)| *name)
            .collect();
        Err(Self { columns, rows })
    }
}

/// One lab panel as supplied by ingestion.
///
/// Every field may be absent. Rows with an absent lab feature cannot be
/// scored; rows with an absent date cannot take part in trend math.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    /// Patient identifier (absent in single-patient mode)
    pub patient_id: Option<i64>,

    /// Calendar date of the visit
    pub visit_date: Option<NaiveDate>,

    /// Gender code: 0 = female, 1 = male
    pub gender: Option<f64>,

    /// Hemoglobin in g/dL
    pub hemoglobin: Option<f64>,

    /// Mean corpuscular hemoglobin in pg
    pub mch: Option<f64>,

    /// Mean corpuscular hemoglobin concentration in g/dL
    pub mchc: Option<f64>,

    /// Mean corpuscular volume in fL
    pub mcv: Option<f64>,
}

impl Visit {
    /// Build a fully populated visit.
    #[must_use]
    pub fn new(patient_id: Option<i64>, visit_date: Option<NaiveDate>, panel: LabPanel) -> Self {
        Self {
            patient_id,
            visit_date,
            gender: Some(panel.gender),
            hemoglobin: Some(panel.hemoglobin),
            mch: Some(panel.mch),
            mchc: Some(panel.mchc),
            mcv: Some(panel.mcv),
        }
    }

    /// Names of the required features this visit does not supply.
    #[must_use]
    pub fn missing_features(&self) -> Vec<&'static str> {
        [self.gender, self.hemoglobin, self.mch, self.mchc, self.mcv]
            .iter()
            .zip(FEATURE_NAMES)
            .filter(|(value, _)| value.is_none())
            .map(|(_, name)| name)
            .collect()
    }

    /// Extract the complete lab panel.
    ///
    /// # Errors
    /// Returns the names of the absent features.
    pub fn lab_panel(&self) -> Result<LabPanel, Vec<&'static str>> {
        match (self.gender, self.hemoglobin, self.mch, self.mchc, self.mcv) {
            (Some(gender), Some(hemoglobin), Some(mch), Some(mchc), Some(mcv)) => Ok(LabPanel {
                gender,
                hemoglobin,
                mch,
                mchc,
                mcv,
            }),
            _ => Err(self.missing_features()),
        }
    }
}

/// The five classifier features of one visit, all present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct LabPanel {
    pub gender: f64,
    pub hemoglobin: f64,
    pub mch: f64,
    pub mchc: f64,
    pub mcv: f64,
}

impl LabPanel {
    /// Convert features to the classifier input vector.
    /// Order: Gender, Hemoglobin, MCH, MCHC, MCV
    #[must_use]
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [self.gender, self.hemoglobin, self.mch, self.mchc, self.mcv]
    }
}

/// A visit annotated with the classifier output.
///
/// Lab values are copied from the source visit and never altered by scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredVisit {
    pub patient_id: Option<i64>,
    pub visit_date: Option<NaiveDate>,
    pub panel: LabPanel,

    /// Risk in percent, one decimal place. `None` when scoring failed.
    pub risk_probability: Option<f64>,
}

impl ScoredVisit {
    /// Positive flag, only defined when a probability is present.
    #[must_use]
    pub fn prediction(&self) -> Option<bool> {
        self.risk_probability.map(|p| p >= POSITIVE_THRESHOLD)
    }
}

/// The visits of one patient, sorted ascending by visit date.
///
/// The sort is stable: visits sharing a date keep their input order, and
/// undated visits follow all dated ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientSeries {
    patient_id: Option<i64>,
    visits: Vec<ScoredVisit>,
}

impl PatientSeries {
    /// Build a series, sorting the visits by date.
    #[must_use]
    pub fn new(patient_id: Option<i64>, mut visits: Vec<ScoredVisit>) -> Self {
        visits.sort_by_key(|v| (v.visit_date.is_none(), v.visit_date));
        Self { patient_id, visits }
    }

    #[must_use]
    pub fn patient_id(&self) -> Option<i64> {
        self.patient_id
    }

    #[must_use]
    pub fn visits(&self) -> &[ScoredVisit] {
        &self.visits
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.visits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    /// Whether any visit carries a date. Undated series only support
    /// distribution views.
    #[must_use]
    pub fn has_dates(&self) -> bool {
        self.visits.iter().any(|v| v.visit_date.is_some())
    }

    /// Risk probabilities in visit order, `None` where scoring failed.
    #[must_use]
    pub fn probabilities(&self) -> Vec<Option<f64>> {
        self.visits.iter().map(|v| v.risk_probability).collect()
    }

    /// Hemoglobin readings in visit order.
    #[must_use]
    pub fn hemoglobin_values(&self) -> Vec<f64> {
        self.visits.iter().map(|v| v.panel.hemoglobin).collect()
    }

    /// Most recent visit date.
    #[must_use]
    pub fn last_visit_date(&self) -> Option<NaiveDate> {
        self.visits.iter().rev().find_map(|v| v.visit_date)
    }
}

/// Append-only log of manually entered visits.
///
/// Analyses never see the log itself, only a snapshot taken when the
/// analysis starts.
#[derive(Debug, Clone, Default)]
pub struct VisitLog {
    entries: Vec<Visit>,
}

impl VisitLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a visit to the log.
    pub fn append(&mut self, visit: Visit) {
        self.entries.push(visit);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Immutable copy of the log as it stands now.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Visit> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel(hemoglobin: f64) -> LabPanel {
        LabPanel {
            gender: 0.0,
            hemoglobin,
            mch: 22.0,
            mchc: 30.0,
            mcv: 80.0,
        }
    }

    fn scored(date: Option<&str>, hemoglobin: f64) -> ScoredVisit {
        ScoredVisit {
            patient_id: Some(1),
            visit_date: date.map(|d| d.parse().expect("valid date")),
            panel: panel(hemoglobin),
            risk_probability: Some(10.0),
        }
    }

    #[test]
    fn test_panel_to_array_order() {
        let p = LabPanel {
            gender: 1.0,
            hemoglobin: 13.5,
            mch: 27.0,
            mchc: 33.0,
            mcv: 88.0,
        };
        assert_eq!(p.to_array(), [1.0, 13.5, 27.0, 33.0, 88.0]);
    }

    #[test]
    fn test_missing_features_named_in_order() {
        let visit = Visit {
            gender: Some(1.0),
            hemoglobin: None,
            mch: Some(25.0),
            mchc: Some(31.0),
            mcv: None,
            ..Default::default()
        };
        assert_eq!(visit.missing_features(), vec!["Hemoglobin", "MCV"]);
        assert_eq!(visit.lab_panel(), Err(vec!["Hemoglobin", "MCV"]));
    }

    #[test]
    fn test_missing_feature_error_names_columns_and_rows() {
        let complete = Visit::new(None, None, panel(12.0));
        let no_mch = Visit {
            mch: None,
            ..complete.clone()
        };
        let no_gender = Visit {
            gender: None,
            ..complete.clone()
        };

        assert!(MissingFeatureError::check(&[complete.clone()]).is_ok());

        let err = MissingFeatureError::check(&[complete, no_mch, no_gender])
            .expect_err("Should reject batch");
        assert_eq!(err.columns, vec!["Gender", "MCH"]);
        assert_eq!(err.rows, vec![1, 2]);
        assert!(err.to_string().contains("Gender, MCH"));
    }

    #[test]
    fn test_prediction_only_with_probability() {
        let mut visit = scored(Some("2024-01-01"), 12.0);
        visit.risk_probability = Some(50.0);
        assert_eq!(visit.prediction(), Some(true));
        visit.risk_probability = Some(49.9);
        assert_eq!(visit.prediction(), Some(false));
        visit.risk_probability = None;
        assert_eq!(visit.prediction(), None);
    }

    #[test]
    fn test_series_sort_is_stable_and_undated_last() {
        let series = PatientSeries::new(
            Some(1),
            vec![
                scored(None, 1.0),
                scored(Some("2024-03-01"), 2.0),
                scored(Some("2024-01-01"), 3.0),
                scored(Some("2024-03-01"), 4.0),
            ],
        );
        assert_eq!(series.hemoglobin_values(), vec![3.0, 2.0, 4.0, 1.0]);
        assert_eq!(series.last_visit_date(), "2024-03-01".parse().ok());
        assert!(series.has_dates());
    }

    #[test]
    fn test_visit_log_snapshot_is_detached() {
        let mut log = VisitLog::new();
        log.append(Visit::new(Some(7), None, panel(12.0)));
        let snapshot = log.snapshot();
        log.append(Visit::new(Some(7), None, panel(11.0)));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len(), 2);
    }
}
