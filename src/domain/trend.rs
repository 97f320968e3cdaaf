//! Risk trend analysis over a patient's visit sequence.
//!
//! Slopes are visit-indexed: the unit is percentage points per visit, not
//! per day, because visit spacing is irregular.

use serde::{Deserialize, Serialize};

/// Default trailing moving-average span for noisy probability series.
pub const DEFAULT_SMOOTHING_WINDOW: usize = 3;

/// Mean visit-to-visit change above which risk is rising rapidly.
const RAPID_INCREASE_THRESHOLD: f64 = 5.0;

/// Direction of the risk trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrendLabel {
    /// Fewer than two probabilities available
    InsufficientData,
    /// Mean change <= 0
    StableOrImproving,
    /// 0 < mean change <= 5
    SlowlyIncreasing,
    /// Mean change > 5
    RapidlyIncreasing,
}

impl TrendLabel {
    /// Classify a visit-to-visit mean delta.
    #[must_use]
    pub fn from_slope(slope: f64) -> Self {
        if slope > RAPID_INCREASE_THRESHOLD {
            Self::RapidlyIncreasing
        } else if slope > 0.0 {
            Self::SlowlyIncreasing
        } else {
            Self::StableOrImproving
        }
    }

    /// Get a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::InsufficientData => "Not enough scored visits to assess the risk trend",
            Self::StableOrImproving => "Risk appears stable or improving",
            Self::SlowlyIncreasing => "Risk is slowly increasing - keep monitoring",
            Self::RapidlyIncreasing => "Risk is increasing rapidly - medical review recommended",
        }
    }
}

impl std::fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientData => write!(f, "insufficient-data"),
            Self::StableOrImproving => write!(f, "stable-or-improving"),
            Self::SlowlyIncreasing => write!(f, "slowly-increasing"),
            Self::RapidlyIncreasing => write!(f, "rapidly-increasing"),
        }
    }
}

/// Result of classifying a probability series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendClassification {
    /// Mean first difference, absent when data is insufficient
    pub slope: Option<f64>,
    pub label: TrendLabel,
}

impl TrendClassification {
    fn insufficient() -> Self {
        Self {
            slope: None,
            label: TrendLabel::InsufficientData,
        }
    }
}

/// Trailing moving average over `values`.
///
/// Index `i` averages `values[i + 1 - window ..= i]`, using fewer points at
/// the start of the series. Never reads past index `i`. A window of 0 or 1
/// returns the input unchanged.
#[must_use]
pub fn smooth_probabilities(values: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 {
        return values.to_vec();
    }

    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, &x) in values.iter().enumerate() {
        sum += x;
        if i >= window {
            sum -= values[i - window];
        }
        let n = (i + 1).min(window);
        out.push(sum / n as f64);
    }
    out
}

/// Arithmetic mean of consecutive differences, `None` for fewer than 2 values.
#[must_use]
pub fn mean_first_difference(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let total: f64 = values.windows(2).map(|w| w[1] - w[0]).sum();
    Some(total / (values.len() - 1) as f64)
}

/// Trend analyzer with an optional smoothing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendAnalyzer {
    smoothing_window: usize,
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl TrendAnalyzer {
    /// Analyzer working on the raw series.
    #[must_use]
    pub fn new() -> Self {
        Self {
            smoothing_window: 1,
        }
    }

    /// Analyzer that smooths the series with a trailing moving average first.
    #[must_use]
    pub fn with_smoothing(window: usize) -> Self {
        Self {
            smoothing_window: window.max(1),
        }
    }

    /// Classify the trend of an ordered probability series, skipping nulls.
    #[must_use]
    pub fn classify(&self, probabilities: &[Option<f64>]) -> TrendClassification {
        let present: Vec<f64> = probabilities.iter().flatten().copied().collect();
        let series = smooth_probabilities(&present, self.smoothing_window);

        match mean_first_difference(&series) {
            Some(slope) => TrendClassification {
                slope: Some(slope),
                label: TrendLabel::from_slope(slope),
            },
            None => TrendClassification::insufficient(),
        }
    }
}

/// Classify the raw probability series.
#[must_use]
pub fn classify_trend(probabilities: &[Option<f64>]) -> TrendClassification {
    TrendAnalyzer::new().classify(probabilities)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_steep_rise_is_rapid() {
        let trend = classify_trend(&some(&[30.0, 45.0, 62.0, 78.0]));
        assert_eq!(trend.slope, Some(16.0));
        assert_eq!(trend.label, TrendLabel::RapidlyIncreasing);
    }

    #[test]
    fn test_threshold_boundaries() {
        assert_eq!(
            classify_trend(&some(&[10.0, 15.0])).label,
            TrendLabel::SlowlyIncreasing
        );
        assert_eq!(
            classify_trend(&some(&[40.0, 40.0])).label,
            TrendLabel::StableOrImproving
        );
        assert_eq!(
            classify_trend(&some(&[60.0, 20.0])).label,
            TrendLabel::StableOrImproving
        );
        assert_eq!(TrendLabel::from_slope(5.0001), TrendLabel::RapidlyIncreasing);
    }

    #[test]
    fn test_insufficient_data() {
        let trend = classify_trend(&[Some(40.0), None, None]);
        assert_eq!(trend.slope, None);
        assert_eq!(trend.label, TrendLabel::InsufficientData);
        assert_eq!(classify_trend(&[]).label, TrendLabel::InsufficientData);
    }

    #[test]
    fn test_nulls_are_skipped_not_zeroed() {
        let trend = classify_trend(&[Some(20.0), None, Some(24.0), Some(28.0)]);
        assert_eq!(trend.slope, Some(4.0));
        assert_eq!(trend.label, TrendLabel::SlowlyIncreasing);
    }

    #[test]
    fn test_smoothing_uses_partial_windows() {
        let smoothed = smooth_probabilities(&[30.0, 60.0, 90.0, 30.0], 3);
        assert_eq!(smoothed, vec![30.0, 45.0, 60.0, 60.0]);
        assert_eq!(smooth_probabilities(&[1.0, 5.0], 1), vec![1.0, 5.0]);
    }

    #[test]
    fn test_smoothed_analyzer() {
        let trend = TrendAnalyzer::with_smoothing(3).classify(&some(&[30.0, 60.0, 90.0, 30.0]));
        assert_eq!(trend.slope, Some(10.0));
        assert_eq!(trend.label, TrendLabel::RapidlyIncreasing);
    }

    #[test]
    fn test_label_display() {
        assert_eq!(TrendLabel::RapidlyIncreasing.to_string(), "rapidly-increasing");
        assert_eq!(TrendLabel::InsufficientData.to_string(), "insufficient-data");
    }
}
