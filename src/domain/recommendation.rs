//! Advisory categories for visits and forecasts.

use serde::{Deserialize, Serialize};

/// Hemoglobin below this level (g/dL) warrants caution even at low risk.
pub const LOW_HEMOGLOBIN_THRESHOLD: f64 = 11.0;

/// Change in hemoglobin (g/dL) over two visits that counts as a real trend.
const HEMOGLOBIN_TREND_DELTA: f64 = 1.0;

/// Advisory category for a (probability, hemoglobin) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recommendation {
    /// Scoring failed for this visit
    Unavailable,
    /// Probability >= 80
    HighRisk,
    /// Probability >= 50
    ModerateRisk,
    /// Low risk but hemoglobin below 11 g/dL
    LowHemoglobinCaution,
    /// No indicators
    Stable,
}

impl Recommendation {
    /// Get the advice text shown next to the category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Unavailable => "Prediction unavailable - scoring backend error",
            Self::HighRisk => "High risk - consult a doctor soon",
            Self::ModerateRisk => "Moderate risk - repeat test and monitor diet",
            Self::LowHemoglobinCaution => "Low hemoglobin - review iron intake",
            Self::Stable => "Stable - continue monitoring",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::HighRisk => write!(f, "high-risk"),
            Self::ModerateRisk => write!(f, "moderate-risk"),
            Self::LowHemoglobinCaution => write!(f, "low-hemoglobin-caution"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

/// Map a risk probability (percent) and hemoglobin reading to a category.
///
/// Probability takes priority: a high probability overrides a normal
/// hemoglobin reading.
#[must_use]
pub fn recommend(probability: Option<f64>, hemoglobin: f64) -> Recommendation {
    let Some(probability) = probability else {
        return Recommendation::Unavailable;
    };

    if probability >= 80.0 {
        Recommendation::HighRisk
    } else if probability >= 50.0 {
        Recommendation::ModerateRisk
    } else if hemoglobin < LOW_HEMOGLOBIN_THRESHOLD {
        Recommendation::LowHemoglobinCaution
    } else {
        Recommendation::Stable
    }
}

/// Short-horizon hemoglobin trend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum HemoglobinTrend {
    /// Fewer than three readings
    InsufficientHistory,
    /// Dropped by at least 1 g/dL over two visits
    Worsening { magnitude: f64 },
    /// Rose by at least 1 g/dL over two visits
    Improving { magnitude: f64 },
    Stable,
}

impl HemoglobinTrend {
    /// Size of the change, for worsening or improving trends.
    #[must_use]
    pub fn magnitude(&self) -> Option<f64> {
        match self {
            Self::Worsening { magnitude } | Self::Improving { magnitude } => Some(*magnitude),
            Self::InsufficientHistory | Self::Stable => None,
        }
    }

    /// Machine-readable status.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::InsufficientHistory => "insufficient-history",
            Self::Worsening { .. } => "worsening",
            Self::Improving { .. } => "improving",
            Self::Stable => "stable",
        }
    }
}

impl std::fmt::Display for HemoglobinTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientHistory => {
                write!(f, "Insufficient visit history to analyze trend")
            }
            Self::Worsening { magnitude } => write!(
                f,
                "Hemoglobin dropped {magnitude:.1} g/dL recently - worsening trend"
            ),
            Self::Improving { magnitude } => {
                write!(f, "Hemoglobin improved {magnitude:.1} g/dL recently")
            }
            Self::Stable => write!(f, "Hemoglobin is relatively stable"),
        }
    }
}

/// Compare the latest hemoglobin reading with the one two visits earlier.
///
/// `readings` must be in chronological order.
#[must_use]
pub fn trend_message(readings: &[f64]) -> HemoglobinTrend {
    if readings.len() < 3 {
        return HemoglobinTrend::InsufficientHistory;
    }

    let delta = readings[readings.len() - 1] - readings[readings.len() - 3];
    if delta <= -HEMOGLOBIN_TREND_DELTA {
        HemoglobinTrend::Worsening {
            magnitude: delta.abs(),
        }
    } else if delta >= HEMOGLOBIN_TREND_DELTA {
        HemoglobinTrend::Improving { magnitude: delta }
    } else {
        HemoglobinTrend::Stable
    }
}

/// Outlook for a forecast probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForecastOutlook {
    /// Projected risk >= 80
    LikelyWorsening,
    /// Projected risk >= 60
    GraduallyIncreasing,
    StableOrImproving,
}

impl ForecastOutlook {
    /// Classify a projected probability (percent).
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 80.0 {
            Self::LikelyWorsening
        } else if probability >= 60.0 {
            Self::GraduallyIncreasing
        } else {
            Self::StableOrImproving
        }
    }

    /// Get a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::LikelyWorsening => {
                "High likelihood of anemia worsening - medical review recommended"
            }
            Self::GraduallyIncreasing => "Risk is gradually increasing - monitor closely",
            Self::StableOrImproving => "Risk expected to remain stable or improve",
        }
    }
}
