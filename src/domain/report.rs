//! Per-patient analysis results handed to renderers and exporters.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::forecast::ForecastPoint;
use super::recommendation::{ForecastOutlook, HemoglobinTrend, Recommendation};
use super::trend::TrendClassification;
use super::visit::ScoredVisit;

/// Hemoglobin below which a reading counts as low on the charts.
pub const CHART_LOW_HEMOGLOBIN: f64 = 12.0;

/// One row of the patient table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedVisit {
    pub visit: ScoredVisit,
    pub recommendation: Recommendation,
}

/// One point of the risk-over-time chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub probability: f64,
}

/// Distribution view of hemoglobin, available with or without dates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HemoglobinSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Readings below [`CHART_LOW_HEMOGLOBIN`]
    pub below_low_threshold: usize,
}

impl HemoglobinSummary {
    /// Summarize finite readings, `None` if there are none.
    #[must_use]
    pub fn from_readings(readings: &[f64]) -> Option<Self> {
        let finite: Vec<f64> = readings.iter().copied().filter(|x| x.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }

        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = finite.iter().sum::<f64>() / finite.len() as f64;
        let below_low_threshold = finite.iter().filter(|&&x| x < CHART_LOW_HEMOGLOBIN).count();

        Some(Self {
            count: finite.len(),
            min,
            max,
            mean,
            below_low_threshold,
        })
    }
}

/// Forecast point with its advisory annotations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub point: ForecastPoint,
    pub recommendation: Recommendation,
    pub outlook: ForecastOutlook,
}

/// Forecast state of a patient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ForecastState {
    /// The series has no dates, only distribution views apply
    Undated,
    /// Fewer than three scored, dated visits
    InsufficientHistory,
    Projected(ForecastSummary),
}

/// Everything computed for one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientReport {
    pub patient_id: Option<i64>,
    pub visits: Vec<AnnotatedVisit>,
    /// Risk trend, absent for undated series
    pub risk_trend: Option<TrendClassification>,
    pub hemoglobin_trend: HemoglobinTrend,
    pub hemoglobin_summary: Option<HemoglobinSummary>,
    pub chart: Vec<ChartPoint>,
    pub forecast: ForecastState,
}
