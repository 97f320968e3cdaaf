//! Next-visit forecasting.
//!
//! A forecast is a single synthetic visit 30 days after the last known one.
//! It is recomputed on every request and never stored as a visit.
//!
//! The projection itself is a [`ForecastPolicy`] so that alternative
//! sensitivity coefficients or windows can be swapped in without touching
//! callers. [`LinearTrendPolicy`] is the default.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::trend::{mean_first_difference, smooth_probabilities, DEFAULT_SMOOTHING_WINDOW};
use super::visit::PatientSeries;

/// Fixed single-step horizon.
pub const FORECAST_HORIZON_DAYS: i64 = 30;

/// Minimum number of scored visits needed to forecast.
pub const MIN_FORECAST_HISTORY: usize = 3;

/// Lowest hemoglobin a projection may report, in g/dL.
pub const HEMOGLOBIN_FLOOR: f64 = 5.0;

/// Bounds for a projected risk probability, in percent.
pub const PROBABILITY_BOUNDS: (f64, f64) = (5.0, 95.0);

/// Synthetic next-visit estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub forecast_date: NaiveDate,
    pub forecast_hemoglobin: Option<f64>,
    /// Projected risk in percent, always within [`PROBABILITY_BOUNDS`]
    pub forecast_probability: f64,
}

/// The tail window of the history contains unusable values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error(
    "malformed history for patient {} at visit {visit_index}: invalid {}",
    .patient_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
    .fields.join(", ")
)]
pub struct MalformedHistoryError {
    pub patient_id: Option<i64>,
    /// Index of the offending visit in the series
    pub visit_index: usize,
    pub fields: Vec<&'static str>,
}

/// Strategy for projecting the next visit from a patient's history.
pub trait ForecastPolicy: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Project the next visit.
    ///
    /// # Returns
    /// `None` when the history is too short to forecast.
    ///
    /// # Errors
    /// Returns `MalformedHistoryError` if the values the projection depends on
    /// are missing or non-numeric.
    fn project(&self, history: &PatientSeries)
        -> Result<Option<ForecastPoint>, MalformedHistoryError>;
}

/// Current smoothed probability plus a hemoglobin-driven trend impact.
///
/// `sensitivity` converts a hemoglobin trend (g/dL per visit) into
/// percentage points of risk. It is a heuristic linear coefficient, not a
/// fitted parameter, and only holds near the observed operating point,
/// hence the clamp to [`PROBABILITY_BOUNDS`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearTrendPolicy {
    /// Number of most recent visits used for the hemoglobin trend
    pub hemoglobin_window: usize,
    /// Risk points gained per g/dL of hemoglobin lost per visit
    pub sensitivity: f64,
    /// Trailing moving-average span for the current probability
    pub smoothing_window: usize,
}

impl Default for LinearTrendPolicy {
    fn default() -> Self {
        Self {
            hemoglobin_window: 3,
            sensitivity: 8.0,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
        }
    }
}

impl LinearTrendPolicy {
    /// Default policy with a different smoothing window.
    #[must_use]
    pub fn with_smoothing_window(mut self, window: usize) -> Self {
        self.smoothing_window = window.max(1);
        self
    }
}

impl ForecastPolicy for LinearTrendPolicy {
    fn name(&self) -> &'static str {
        "linear-trend"
    }

    fn project(
        &self,
        history: &PatientSeries,
    ) -> Result<Option<ForecastPoint>, MalformedHistoryError> {
        let probabilities: Vec<f64> = history
            .visits()
            .iter()
            .filter_map(|v| v.risk_probability)
            .collect();

        let last_date = match history.last_visit_date() {
            Some(date) if probabilities.len() >= MIN_FORECAST_HISTORY => date,
            _ => {
                tracing::debug!(
                    scored = probabilities.len(),
                    "Insufficient history for forecast"
                );
                return Ok(None);
            }
        };

        // Hemoglobin is measured on every visit, scored or not.
        let visits = history.visits();
        let window = self.hemoglobin_window.max(2).min(visits.len());
        let start = visits.len() - window;

        let mut hemoglobin = Vec::with_capacity(window);
        for (offset, visit) in visits[start..].iter().enumerate() {
            let mut fields = Vec::new();
            if visit.visit_date.is_none() {
                fields.push("visit_date");
            }
            if !visit.panel.hemoglobin.is_finite() {
                fields.push("hemoglobin");
            }
            if !fields.is_empty() {
                return Err(MalformedHistoryError {
                    patient_id: history.patient_id(),
                    visit_index: start + offset,
                    fields,
                });
            }
            hemoglobin.push(visit.panel.hemoglobin);
        }

        let hb_trend = mean_first_difference(&hemoglobin).unwrap_or(0.0);
        let last_hb = hemoglobin[hemoglobin.len() - 1];
        let next_hb = (last_hb + hb_trend).max(HEMOGLOBIN_FLOOR);

        let smoothed = smooth_probabilities(&probabilities, self.smoothing_window);
        let current = smoothed[smoothed.len() - 1];

        let trend_impact = -hb_trend * self.sensitivity;
        let (low, high) = PROBABILITY_BOUNDS;
        let future_probability = (current + trend_impact).clamp(low, high);
        let forecast_date = last_date + Duration::days(FORECAST_HORIZON_DAYS);

        tracing::debug!(
            policy = self.name(),
            hb_trend,
            current,
            trend_impact,
            future_probability,
            "Projected next visit"
        );

        Ok(Some(ForecastPoint {
            forecast_date,
            forecast_hemoglobin: Some(next_hb),
            forecast_probability: future_probability,
        }))
    }
}

/// Forecast the next visit with the default policy.
///
/// # Errors
/// Returns `MalformedHistoryError` if the tail window is unusable.
pub fn forecast(history: &PatientSeries) -> Result<Option<ForecastPoint>, MalformedHistoryError> {
    LinearTrendPolicy::default().project(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::visit::{LabPanel, ScoredVisit};

    fn date(s: &str) -> NaiveDate {
        s.parse().expect("valid date")
    }

    fn visit(day: Option<&str>, hemoglobin: f64, probability: Option<f64>) -> ScoredVisit {
        ScoredVisit {
            patient_id: Some(1),
            visit_date: day.map(date),
            panel: LabPanel {
                gender: 0.0,
                hemoglobin,
                mch: 22.0,
                mchc: 30.0,
                mcv: 80.0,
            },
            risk_probability: probability,
        }
    }

    fn series(rows: &[(&str, f64, f64)]) -> PatientSeries {
        PatientSeries::new(
            Some(1),
            rows.iter()
                .map(|(d, hb, p)| visit(Some(d), *hb, Some(*p)))
                .collect(),
        )
    }

    #[test]
    fn test_steep_rise_forecast() {
        let history = series(&[
            ("2024-01-01", 13.0, 30.0),
            ("2024-01-31", 12.4, 45.0),
            ("2024-03-01", 11.6, 62.0),
            ("2024-03-31", 10.8, 78.0),
        ]);

        let point = forecast(&history).expect("well formed").expect("enough history");

        assert_eq!(point.forecast_date, date("2024-04-30"));
        // hb trend over last 3 visits = -0.8, impact = +6.4 on smoothed 61.67
        assert!((point.forecast_probability - 68.0667).abs() < 1e-3);
        assert!((point.forecast_probability - 78.0).abs() <= 15.0);
        let hb = point.forecast_hemoglobin.expect("hemoglobin projected");
        assert!((hb - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_insufficient_history() {
        let history = series(&[("2024-01-01", 13.0, 30.0), ("2024-02-01", 12.0, 40.0)]);
        assert_eq!(forecast(&history), Ok(None));

        // Three visits but one unscored
        let history = PatientSeries::new(
            Some(1),
            vec![
                visit(Some("2024-01-01"), 13.0, Some(30.0)),
                visit(Some("2024-02-01"), 12.0, None),
                visit(Some("2024-03-01"), 11.0, Some(50.0)),
            ],
        );
        assert_eq!(forecast(&history), Ok(None));
    }

    #[test]
    fn test_undated_series_is_insufficient() {
        let history = PatientSeries::new(
            None,
            vec![
                visit(None, 13.0, Some(30.0)),
                visit(None, 12.0, Some(40.0)),
                visit(None, 11.0, Some(50.0)),
            ],
        );
        assert_eq!(forecast(&history), Ok(None));
    }

    #[test]
    fn test_malformed_tail_is_an_error() {
        let history = PatientSeries::new(
            Some(1),
            vec![
                visit(Some("2024-01-01"), 13.0, Some(30.0)),
                visit(Some("2024-02-01"), f64::NAN, Some(40.0)),
                visit(Some("2024-03-01"), 11.0, Some(50.0)),
            ],
        );
        let err = forecast(&history).expect_err("NaN hemoglobin");
        assert_eq!(err.patient_id, Some(1));
        assert_eq!(err.visit_index, 1);
        assert_eq!(err.fields, vec!["hemoglobin"]);

        let history = PatientSeries::new(
            Some(1),
            vec![
                visit(Some("2024-01-01"), 13.0, Some(30.0)),
                visit(Some("2024-02-01"), 12.0, Some(40.0)),
                visit(None, 11.0, Some(50.0)),
            ],
        );
        let err = forecast(&history).expect_err("undated tail visit");
        assert_eq!(err.fields, vec!["visit_date"]);
        assert_eq!(
            err.to_string(),
            "malformed history for patient 1 at visit 2: invalid visit_date"
        );
    }

    #[test]
    fn test_unscored_latest_visit_anchors_forecast() {
        let history = PatientSeries::new(
            Some(1),
            vec![
                visit(Some("2024-01-01"), 13.0, Some(30.0)),
                visit(Some("2024-02-01"), 12.0, Some(40.0)),
                visit(Some("2024-03-01"), 11.0, Some(50.0)),
                visit(Some("2024-06-01"), 7.0, None),
            ],
        );

        let point = forecast(&history).expect("well formed").expect("enough history");

        assert_eq!(point.forecast_date, date("2024-07-01"));
        // hb window 12.0, 11.0, 7.0 gives a trend of -2.5, so 7.0 - 2.5 hits the floor
        assert_eq!(point.forecast_hemoglobin, Some(HEMOGLOBIN_FLOOR));
        // smoothed current 40.0 plus 2.5 * 8
        assert!((point.forecast_probability - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_visit_outside_window_is_ignored() {
        let history = series(&[
            ("2024-01-01", 13.0, 40.0),
            ("2024-02-01", 13.0, 40.0),
            ("2024-03-01", 13.0, 40.0),
            ("2024-04-01", 13.0, 40.0),
        ]);
        let mut visits = history.visits().to_vec();
        visits[0].panel.hemoglobin = f64::NAN;
        let history = PatientSeries::new(Some(1), visits);

        let point = forecast(&history).expect("tail is clean").expect("enough history");
        assert!((point.forecast_probability - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_hemoglobin_floor_and_probability_clamp() {
        let history = series(&[
            ("2024-01-01", 14.0, 60.0),
            ("2024-02-01", 9.0, 80.0),
            ("2024-03-01", 5.5, 90.0),
        ]);
        let point = forecast(&history).expect("well formed").expect("enough history");
        assert_eq!(point.forecast_hemoglobin, Some(HEMOGLOBIN_FLOOR));
        assert_eq!(point.forecast_probability, 95.0);

        let history = series(&[
            ("2024-01-01", 8.0, 10.0),
            ("2024-02-01", 12.0, 8.0),
            ("2024-03-01", 16.0, 6.0),
        ]);
        let point = forecast(&history).expect("well formed").expect("enough history");
        assert_eq!(point.forecast_probability, 5.0);
    }

    #[test]
    fn test_custom_policy_sensitivity() {
        let history = series(&[
            ("2024-01-01", 13.0, 40.0),
            ("2024-02-01", 12.0, 40.0),
            ("2024-03-01", 11.0, 40.0),
        ]);
        let policy = LinearTrendPolicy {
            sensitivity: 2.0,
            ..LinearTrendPolicy::default()
        };
        let point = policy.project(&history).expect("well formed").expect("enough history");
        assert!((point.forecast_probability - 42.0).abs() < 1e-9);
    }
}
