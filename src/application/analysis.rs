//! Analysis service: Per-patient trend, forecast and recommendations.
//!
//! This service coordinates:
//! - Patient selection and grouping
//! - Risk scoring of every visit
//! - Trend classification and hemoglobin trend messages
//! - Next-visit forecasting through a pluggable policy
//! - Recommendations for visits and forecasts

use std::collections::HashMap;

use crate::application::scoring::{RiskScorer, ScoringWarning};
use crate::domain::{
    recommend, trend_message, AnnotatedVisit, ChartPoint, ForecastOutlook, ForecastPolicy,
    ForecastState, ForecastSummary, HemoglobinSummary, HemoglobinTrend, LinearTrendPolicy,
    MalformedHistoryError, PatientReport, PatientSeries, ScoredVisit, TrendAnalyzer, Visit,
};
use crate::ports::{Classifier, DatasetSource};
use crate::HemotrendError;

/// Reports of one analysis run.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub reports: Vec<PatientReport>,
    /// Rows whose probability is unavailable
    pub warnings: Vec<ScoringWarning>,
    /// Series left out because their forecast window is malformed
    pub failures: Vec<MalformedHistoryError>,
}

/// Split scored visits into per-patient series, in order of first appearance.
///
/// Visits without a patient id form a single group.
#[must_use]
pub fn group_by_patient(visits: Vec<ScoredVisit>) -> Vec<PatientSeries> {
    let mut index: HashMap<Option<i64>, usize> = HashMap::new();
    let mut groups: Vec<(Option<i64>, Vec<ScoredVisit>)> = Vec::new();

    for visit in visits {
        let slot = *index.entry(visit.patient_id).or_insert_with(|| {
            groups.push((visit.patient_id, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(visit);
    }

    groups
        .into_iter()
        .map(|(patient_id, visits)| PatientSeries::new(patient_id, visits))
        .collect()
}

/// Service producing patient reports.
pub struct AnalysisService<C: Classifier + ?Sized> {
    scorer: RiskScorer<C>,
    trend: TrendAnalyzer,
    policy: Box<dyn ForecastPolicy>,
}

impl<C: Classifier + ?Sized> AnalysisService<C> {
    /// Create a service with a raw-series trend and the default forecast policy.
    pub fn new(scorer: RiskScorer<C>) -> Self {
        Self {
            scorer,
            trend: TrendAnalyzer::new(),
            policy: Box::new(LinearTrendPolicy::default()),
        }
    }

    #[must_use]
    pub fn with_trend_analyzer(mut self, trend: TrendAnalyzer) -> Self {
        self.trend = trend;
        self
    }

    #[must_use]
    pub fn with_forecast_policy(mut self, policy: Box<dyn ForecastPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn scorer(&self) -> &RiskScorer<C> {
        &self.scorer
    }

    /// Load a snapshot from `source` and analyze it.
    ///
    /// # Errors
    /// Returns error if the source cannot be read or the analysis fails.
    pub fn analyze_source<S>(&self, source: &S, patient: Option<i64>) -> crate::Result<Analysis>
    where
        S: DatasetSource,
        HemotrendError: From<S::Error>,
    {
        let visits = source.load()?;
        self.analyze(&visits, patient)
    }

    /// Score the visits and build one report per patient.
    ///
    /// With `patient` set, only that patient's visits are scored.
    ///
    /// A series whose forecast window holds malformed values is reported in
    /// [`Analysis::failures`] and does not affect the other series.
    ///
    /// # Errors
    /// Returns error if a row lacks a feature or the selected patient has no
    /// visits.
    pub fn analyze(&self, visits: &[Visit], patient: Option<i64>) -> crate::Result<Analysis> {
        let selected: Vec<Visit> = match patient {
            Some(id) => {
                let rows: Vec<Visit> = visits
                    .iter()
                    .filter(|v| v.patient_id == Some(id))
                    .cloned()
                    .collect();
                if rows.is_empty() {
                    return Err(HemotrendError::PatientNotFound(id));
                }
                rows
            }
            None => visits.to_vec(),
        };

        let batch = self.scorer.score_visits(&selected)?;
        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for series in group_by_patient(batch.visits) {
            match self.analyze_series(&series) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::warn!("Series skipped: {}", e);
                    failures.push(e);
                }
            }
        }

        tracing::info!(
            "Analyzed {} visits across {} series ({} unavailable, {} skipped)",
            selected.len(),
            reports.len(),
            batch.warnings.len(),
            failures.len()
        );

        Ok(Analysis {
            reports,
            warnings: batch.warnings,
            failures,
        })
    }

    /// Build the report of an already-scored series.
    ///
    /// # Errors
    /// Returns `MalformedHistoryError` if the forecast window is unusable.
    pub fn analyze_series(
        &self,
        series: &PatientSeries,
    ) -> Result<PatientReport, MalformedHistoryError> {
        let visits: Vec<AnnotatedVisit> = series
            .visits()
            .iter()
            .map(|v| AnnotatedVisit {
                visit: v.clone(),
                recommendation: recommend(v.risk_probability, v.panel.hemoglobin),
            })
            .collect();
        let hemoglobin_summary = HemoglobinSummary::from_readings(&series.hemoglobin_values());

        if !series.has_dates() {
            return Ok(PatientReport {
                patient_id: series.patient_id(),
                visits,
                risk_trend: None,
                hemoglobin_trend: HemoglobinTrend::InsufficientHistory,
                hemoglobin_summary,
                chart: Vec::new(),
                forecast: ForecastState::Undated,
            });
        }

        let dated: Vec<&ScoredVisit> = series
            .visits()
            .iter()
            .filter(|v| v.visit_date.is_some())
            .collect();

        let probabilities: Vec<Option<f64>> = dated.iter().map(|v| v.risk_probability).collect();
        let readings: Vec<f64> = dated.iter().map(|v| v.panel.hemoglobin).collect();
        let chart = dated
            .iter()
            .filter_map(|v| match (v.visit_date, v.risk_probability) {
                (Some(date), Some(probability)) => Some(ChartPoint { date, probability }),
                _ => None,
            })
            .collect();

        let forecast = match self.policy.project(series)? {
            Some(point) => {
                let hemoglobin = point
                    .forecast_hemoglobin
                    .or_else(|| readings.last().copied())
                    .unwrap_or(f64::NAN);
                ForecastState::Projected(ForecastSummary {
                    point,
                    recommendation: recommend(Some(point.forecast_probability), hemoglobin),
                    outlook: ForecastOutlook::from_probability(point.forecast_probability),
                })
            }
            None => ForecastState::InsufficientHistory,
        };

        Ok(PatientReport {
            patient_id: series.patient_id(),
            visits,
            risk_trend: Some(self.trend.classify(&probabilities)),
            hemoglobin_trend: trend_message(&readings),
            hemoglobin_summary,
            chart,
            forecast,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LabPanel, Recommendation, TrendLabel, VisitLog};
    use crate::ports::{ClassifierError, ScoringRequest};
    use chrono::NaiveDate;
    use std::sync::Arc;

    /// Looks up the probability by hemoglobin; unknown readings fail.
    struct TableClassifier(Vec<(f64, f64)>);

    impl Classifier for TableClassifier {
        fn predict_proba(&self, request: &ScoringRequest) -> Result<f64, ClassifierError> {
            self.0
                .iter()
                .find(|(hb, _)| *hb == request.features.hemoglobin)
                .map(|(_, p)| *p)
                .ok_or_else(|| ClassifierError::Unavailable("no entry".into()))
        }

        fn describe(&self) -> String {
            "table".into()
        }
    }

    fn service(table: &[(f64, f64)]) -> AnalysisService<TableClassifier> {
        AnalysisService::new(RiskScorer::new(Arc::new(TableClassifier(table.to_vec()))))
    }

    fn visit(patient_id: Option<i64>, date: Option<&str>, hemoglobin: f64) -> Visit {
        Visit::new(
            patient_id,
            date.map(|d| d.parse().expect("valid date")),
            LabPanel {
                gender: 0.0,
                hemoglobin,
                mch: 22.0,
                mchc: 30.0,
                mcv: 80.0,
            },
        )
    }

    const STEEP_RISE: [(f64, f64); 4] = [(13.0, 0.30), (12.4, 0.45), (11.6, 0.62), (10.8, 0.78)];

    fn steep_rise_visits(patient_id: Option<i64>) -> Vec<Visit> {
        vec![
            visit(patient_id, Some("2024-01-01"), 13.0),
            visit(patient_id, Some("2024-01-31"), 12.4),
            visit(patient_id, Some("2024-03-01"), 11.6),
            visit(patient_id, Some("2024-03-31"), 10.8),
        ]
    }

    #[test]
    fn test_end_to_end_steep_rise() {
        let analysis = service(&STEEP_RISE)
            .analyze(&steep_rise_visits(Some(1)), None)
            .expect("Should analyze");
        assert!(analysis.warnings.is_empty());
        assert_eq!(analysis.reports.len(), 1);
        let report = &analysis.reports[0];

        let trend = report.risk_trend.expect("dated series has a trend");
        assert_eq!(trend.label, TrendLabel::RapidlyIncreasing);
        assert!((trend.slope.expect("slope") - 16.0).abs() < 1e-9);

        assert!(matches!(
            report.hemoglobin_trend,
            HemoglobinTrend::Worsening { magnitude } if (magnitude - 1.6).abs() < 1e-9
        ));
        assert_eq!(report.chart.len(), 4);

        let ForecastState::Projected(summary) = report.forecast else {
            panic!("Expected a forecast, got {:?}", report.forecast);
        };
        let p = summary.point.forecast_probability;
        assert!((5.0..=95.0).contains(&p));
        assert!((p - 78.0).abs() <= 15.0);
        assert_eq!(
            summary.point.forecast_date,
            NaiveDate::from_ymd_opt(2024, 4, 30).expect("valid date")
        );
        assert_eq!(summary.recommendation, Recommendation::ModerateRisk);
        assert_eq!(summary.outlook, ForecastOutlook::GraduallyIncreasing);

        let recommendations: Vec<_> = report.visits.iter().map(|v| v.recommendation).collect();
        assert_eq!(
            recommendations,
            vec![
                Recommendation::Stable,
                Recommendation::Stable,
                Recommendation::ModerateRisk,
                Recommendation::ModerateRisk,
            ]
        );
    }

    #[test]
    fn test_null_probability_is_unavailable_and_skipped_by_trend() {
        let mut visits = steep_rise_visits(Some(2));
        visits.insert(1, visit(Some(2), Some("2024-01-15"), 5.5));

        let analysis = service(&STEEP_RISE)
            .analyze(&visits, None)
            .expect("Should analyze");
        assert_eq!(analysis.warnings.len(), 1);

        let report = &analysis.reports[0];
        assert_eq!(report.visits.len(), 5);
        assert_eq!(report.visits[1].visit.risk_probability, None);
        assert_eq!(report.visits[1].recommendation, Recommendation::Unavailable);

        let trend = report.risk_trend.expect("trend");
        assert!((trend.slope.expect("slope") - 16.0).abs() < 1e-9);
        assert_eq!(report.chart.len(), 4);
    }

    #[test]
    fn test_undated_series_gets_distribution_only() {
        let visits = vec![
            visit(None, None, 13.0),
            visit(None, None, 12.4),
            visit(None, None, 11.6),
        ];
        let analysis = service(&STEEP_RISE)
            .analyze(&visits, None)
            .expect("Should analyze");
        let report = &analysis.reports[0];

        assert_eq!(report.risk_trend, None);
        assert_eq!(report.forecast, ForecastState::Undated);
        assert!(report.chart.is_empty());
        assert_eq!(report.hemoglobin_summary.expect("summary").count, 3);
    }

    #[test]
    fn test_short_history_is_informational() {
        let visits = steep_rise_visits(Some(3))[..2].to_vec();
        let analysis = service(&STEEP_RISE)
            .analyze(&visits, None)
            .expect("Should analyze");
        let report = &analysis.reports[0];

        assert_eq!(report.forecast, ForecastState::InsufficientHistory);
        assert_eq!(report.hemoglobin_trend, HemoglobinTrend::InsufficientHistory);
        assert_eq!(
            report.risk_trend.expect("trend").label,
            TrendLabel::RapidlyIncreasing
        );
    }

    #[test]
    fn test_patients_are_grouped_and_selectable() {
        let mut visits = steep_rise_visits(Some(10));
        visits.extend(steep_rise_visits(Some(20)));
        let service = service(&STEEP_RISE);

        let all = service.analyze(&visits, None).expect("Should analyze");
        let ids: Vec<_> = all.reports.iter().map(|r| r.patient_id).collect();
        assert_eq!(ids, vec![Some(10), Some(20)]);

        let one = service.analyze(&visits, Some(20)).expect("Should analyze");
        assert_eq!(one.reports.len(), 1);
        assert_eq!(one.reports[0].visits.len(), 4);

        assert!(matches!(
            service.analyze(&visits, Some(99)),
            Err(HemotrendError::PatientNotFound(99))
        ));
    }

    #[test]
    fn test_missing_feature_aborts_analysis() {
        let mut visits = steep_rise_visits(Some(1));
        visits[2].mcv = None;
        assert!(matches!(
            service(&STEEP_RISE).analyze(&visits, None),
            Err(HemotrendError::MissingFeature(_))
        ));
    }

    #[test]
    fn test_malformed_series_does_not_hide_other_patients() {
        let mut visits = steep_rise_visits(Some(1))[1..].to_vec();
        let mut broken = steep_rise_visits(Some(2))[1..].to_vec();
        broken[2].visit_date = None;
        visits.extend(broken);

        let analysis = service(&STEEP_RISE)
            .analyze(&visits, None)
            .expect("Should analyze");

        assert_eq!(analysis.reports.len(), 1);
        assert_eq!(analysis.reports[0].patient_id, Some(1));
        assert!(matches!(
            analysis.reports[0].forecast,
            ForecastState::Projected(_)
        ));

        assert_eq!(analysis.failures.len(), 1);
        let failure = &analysis.failures[0];
        assert_eq!(failure.patient_id, Some(2));
        assert_eq!(failure.visit_index, 2);
        assert_eq!(failure.fields, vec!["visit_date"]);
    }

    #[test]
    fn test_manual_entry_log_is_analyzed_as_snapshot() {
        let mut log = VisitLog::new();
        for v in steep_rise_visits(None) {
            log.append(v);
        }
        let service = service(&STEEP_RISE);
        let analysis = service.analyze_source(&log, None).expect("Should analyze");
        log.append(visit(None, Some("2024-05-01"), 10.8));

        assert_eq!(analysis.reports[0].visits.len(), 4);
        assert_eq!(log.len(), 5);
    }
}
