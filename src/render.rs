//! Plain-text rendering of patient reports for the terminal.

use std::fmt::{self, Write};

use crate::domain::{ForecastState, PatientReport, CHART_LOW_HEMOGLOBIN};

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
}

/// Render one report as a block of text.
#[must_use]
pub fn render_report(report: &PatientReport) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, report);
    out
}

fn write_report(out: &mut impl Write, report: &PatientReport) -> fmt::Result {
    match report.patient_id {
        Some(id) => writeln!(out, "Patient {id} ({} visits)", report.visits.len())?,
        None => writeln!(out, "Single patient ({} visits)", report.visits.len())?,
    }
    writeln!(
        out,
        "{:<10}  {:>6}  {:>5}  {:>5}  {:>5}  {:>6}  {:>6}  Recommendation",
        "Date", "Gender", "Hb", "MCH", "MCHC", "MCV", "Risk%"
    )?;

    for row in &report.visits {
        let v = &row.visit;
        let date = v
            .visit_date
            .map_or_else(|| "-".to_string(), |d| d.to_string());
        writeln!(
            out,
            "{:<10}  {:>6}  {:>5.1}  {:>5.1}  {:>5.1}  {:>6.1}  {:>6}  {} ({})",
            date,
            v.panel.gender,
            v.panel.hemoglobin,
            v.panel.mch,
            v.panel.mchc,
            v.panel.mcv,
            fmt_opt(v.risk_probability),
            row.recommendation,
            row.recommendation.advice()
        )?;
    }

    if let Some(trend) = report.risk_trend {
        match trend.slope {
            Some(slope) => writeln!(
                out,
                "Risk trend: {} ({slope:+.1} pts/visit). {}",
                trend.label,
                trend.label.description()
            )?,
            None => writeln!(out, "Risk trend: {}", trend.label.description())?,
        }
        writeln!(out, "Hemoglobin trend: {}", report.hemoglobin_trend)?;
    }

    if let Some(summary) = report.hemoglobin_summary {
        writeln!(
            out,
            "Hemoglobin: n={} min {:.1} max {:.1} mean {:.2}, {} below {:.1} g/dL",
            summary.count,
            summary.min,
            summary.max,
            summary.mean,
            summary.below_low_threshold,
            CHART_LOW_HEMOGLOBIN
        )?;
    }

    match report.forecast {
        ForecastState::Undated => {
            writeln!(out, "Forecast: no visit dates, distribution view only")
        }
        ForecastState::InsufficientHistory => {
            writeln!(out, "Forecast: need at least 3 scored visits to forecast")
        }
        ForecastState::Projected(summary) => writeln!(
            out,
            "Forecast {}: risk {:.1}%, hemoglobin {} g/dL -> {} ({})\n  {}",
            summary.point.forecast_date,
            summary.point.forecast_probability,
            fmt_opt(summary.point.forecast_hemoglobin),
            summary.recommendation,
            summary.recommendation.advice(),
            summary.outlook.description()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AnnotatedVisit, ForecastOutlook, ForecastPoint, ForecastSummary, HemoglobinSummary,
        HemoglobinTrend, LabPanel, Recommendation, ScoredVisit, TrendClassification, TrendLabel,
    };

    fn report(forecast: ForecastState) -> PatientReport {
        PatientReport {
            patient_id: Some(3),
            visits: vec![AnnotatedVisit {
                visit: ScoredVisit {
                    patient_id: Some(3),
                    visit_date: "2024-02-01".parse().ok(),
                    panel: LabPanel {
                        gender: 1.0,
                        hemoglobin: 10.5,
                        mch: 21.0,
                        mchc: 29.0,
                        mcv: 77.0,
                    },
                    risk_probability: None,
                },
                recommendation: Recommendation::Unavailable,
            }],
            risk_trend: Some(TrendClassification {
                slope: None,
                label: TrendLabel::InsufficientData,
            }),
            hemoglobin_trend: HemoglobinTrend::InsufficientHistory,
            hemoglobin_summary: None,
            chart: Vec::new(),
            forecast,
        }
    }

    #[test]
    fn test_unavailable_row_is_shown() {
        let text = render_report(&report(ForecastState::InsufficientHistory));
        assert!(text.starts_with("Patient 3 (1 visits)"));
        assert!(text.contains("2024-02-01"));
        assert!(text.contains("unavailable"));
        assert!(text.contains("need at least 3 scored visits"));
    }

    #[test]
    fn test_forecast_line() {
        let text = render_report(&report(ForecastState::Projected(ForecastSummary {
            point: ForecastPoint {
                forecast_date: "2024-03-02".parse().expect("valid date"),
                forecast_hemoglobin: Some(9.7),
                forecast_probability: 83.26,
            },
            recommendation: Recommendation::HighRisk,
            outlook: ForecastOutlook::LikelyWorsening,
        })));
        assert!(text.contains("Forecast 2024-03-02: risk 83.3%"));
        assert!(text.contains("hemoglobin 9.7 g/dL -> high-risk"));
    }

    #[test]
    fn test_trend_and_summary_lines() {
        let mut report = report(ForecastState::Undated);
        report.risk_trend = Some(TrendClassification {
            slope: Some(16.0),
            label: TrendLabel::RapidlyIncreasing,
        });
        report.hemoglobin_summary = HemoglobinSummary::from_readings(&[13.0, 11.5, 10.0]);

        let text = render_report(&report);
        assert!(text.contains("(+16.0 pts/visit)"));
        assert!(text.contains("Hemoglobin: n=3 min 10.0 max 13.0 mean 11.50, 2 below 12.0 g/dL"));
        assert!(text.ends_with("Forecast: no visit dates, distribution view only\n"));
    }
}
