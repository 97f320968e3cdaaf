//! JSON export of full patient reports.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::adapters::ExportError;
use crate::domain::PatientReport;
use crate::ports::ReportExporter;

/// Writes all reports as one pretty-printed JSON array.
#[derive(Debug, Clone)]
pub struct JsonReportExporter {
    path: PathBuf,
}

impl JsonReportExporter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportExporter for JsonReportExporter {
    type Error = ExportError;

    fn export(&self, reports: &[PatientReport]) -> Result<(), Self::Error> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut writer, reports)?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        tracing::info!(
            "JSON export completed: {} reports to {}",
            reports.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AnnotatedVisit, ForecastState, HemoglobinTrend, LabPanel, Recommendation, ScoredVisit,
    };

    #[test]
    fn test_export_is_readable_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");

        let report = PatientReport {
            patient_id: None,
            visits: vec![AnnotatedVisit {
                visit: ScoredVisit {
                    patient_id: None,
                    visit_date: None,
                    panel: LabPanel {
                        gender: 0.0,
                        hemoglobin: 9.8,
                        mch: 20.0,
                        mchc: 28.0,
                        mcv: 75.0,
                    },
                    risk_probability: Some(91.4),
                },
                recommendation: Recommendation::HighRisk,
            }],
            risk_trend: None,
            hemoglobin_trend: HemoglobinTrend::InsufficientHistory,
            hemoglobin_summary: None,
            chart: Vec::new(),
            forecast: ForecastState::Undated,
        };

        JsonReportExporter::new(&path)
            .export(&[report])
            .expect("Should export");

        let text = std::fs::read_to_string(&path).expect("read");
        let value: serde_json::Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(value[0]["forecast"]["status"], "undated");
        assert_eq!(value[0]["visits"][0]["recommendation"], "high-risk");
        assert_eq!(value[0]["hemoglobin_trend"]["status"], "insufficient-history");
        assert!(value[0]["visits"][0]["visit"]["risk_probability"].is_number());
    }
}
