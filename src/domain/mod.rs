//! Domain layer: Core business types and logic.
//!
//! This module contains pure Rust types and the three pure analytic
//! components: trend analysis, forecasting and recommendations. Nothing here
//! performs I/O or holds state between calls.

mod forecast;
mod recommendation;
mod report;
mod trend;
mod visit;

pub use forecast::{
    forecast, ForecastPoint, ForecastPolicy, LinearTrendPolicy, MalformedHistoryError,
    FORECAST_HORIZON_DAYS, HEMOGLOBIN_FLOOR, MIN_FORECAST_HISTORY, PROBABILITY_BOUNDS,
};
pub use recommendation::{
    recommend, trend_message, ForecastOutlook, HemoglobinTrend, Recommendation,
    LOW_HEMOGLOBIN_THRESHOLD,
};
pub use report::{
    AnnotatedVisit, ChartPoint, ForecastState, ForecastSummary, HemoglobinSummary, PatientReport,
    CHART_LOW_HEMOGLOBIN,
};
pub use trend::{
    classify_trend, mean_first_difference, smooth_probabilities, TrendAnalyzer,
    TrendClassification, TrendLabel, DEFAULT_SMOOTHING_WINDOW,
};
pub use visit::{
    LabPanel, MissingFeatureError, PatientSeries, ScoredVisit, Visit, VisitLog, FEATURE_COUNT,
    FEATURE_NAMES, POSITIVE_THRESHOLD,
};
