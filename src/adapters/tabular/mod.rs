//! Tabular adapter: CSV dataset ingestion and report export.
//!
//! The input layout is the anemia dataset layout: `Gender, Hemoglobin, MCH,
//! MCHC, MCV`, optionally with `Patient_ID` and `Date` columns. Column order
//! does not matter and extra columns are ignored.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::domain::{PatientReport, Visit, FEATURE_NAMES};
use crate::ports::{DatasetSource, ReportExporter, DATE_COLUMN, PATIENT_ID_COLUMN};

/// Error type for dataset ingestion.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Dataset is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Invalid value {value:?} in column {column} at line {line}")]
    InvalidValue {
        line: u64,
        column: String,
        value: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to read dataset: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for report export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cell contents treated as absent.
fn is_blank(cell: &str) -> bool {
    cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("na")
}

/// Parse a visit date, accepting a bare date or a date with a time part.
fn parse_date(cell: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(cell, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(cell, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

/// Parse a lab value. Non-finite values such as `inf` are rejected.
fn parse_lab_value(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Parse a patient id. Integral floats such as `7.0` are accepted.
fn parse_patient_id(cell: &str) -> Option<i64> {
    cell.parse::<i64>().ok().or_else(|| {
        cell.parse::<f64>()
            .ok()
            .filter(|x| x.is_finite() && x.fract() == 0.0)
            .map(|x| x as i64)
    })
}

/// Column positions resolved from the header row.
struct ColumnMap {
    patient_id: Option<usize>,
    date: Option<usize>,
    features: [usize; FEATURE_NAMES.len()],
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, IngestError> {
        let find = |name: &str| headers.iter().position(|h| h == name);

        let mut missing = Vec::new();
        let mut features = [0usize; FEATURE_NAMES.len()];
        for (slot, name) in features.iter_mut().zip(FEATURE_NAMES) {
            match find(name) {
                Some(index) => *slot = index,
                None => missing.push(name.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(IngestError::MissingColumns(missing));
        }

        Ok(Self {
            patient_id: find(PATIENT_ID_COLUMN),
            date: find(DATE_COLUMN),
            features,
        })
    }
}

/// CSV file on disk.
#[derive(Debug, Clone)]
pub struct CsvDataset {
    path: PathBuf,
}

impl CsvDataset {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse visits from any reader.
    ///
    /// # Errors
    /// Returns error on missing columns or unparseable cells.
    pub fn read_from<R: std::io::Read>(reader: R) -> Result<Vec<Visit>, IngestError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns = ColumnMap::from_headers(reader.headers()?)?;
        let mut visits = Vec::new();

        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, csv::Position::line);
            let cell = |index: usize| record.get(index).unwrap_or("");
            let invalid = |column: &str, value: &str| IngestError::InvalidValue {
                line,
                column: column.to_string(),
                value: value.to_string(),
            };

            let patient_id = match columns.patient_id.map(cell) {
                Some(raw) if !is_blank(raw) => {
                    Some(parse_patient_id(raw).ok_or_else(|| invalid(PATIENT_ID_COLUMN, raw))?)
                }
                _ => None,
            };

            let visit_date = match columns.date.map(cell) {
                Some(raw) if !is_blank(raw) => {
                    Some(parse_date(raw).ok_or_else(|| invalid(DATE_COLUMN, raw))?)
                }
                _ => None,
            };

            let mut values = [None; FEATURE_NAMES.len()];
            for ((value, index), name) in values.iter_mut().zip(columns.features).zip(FEATURE_NAMES)
            {
                let raw = cell(index);
                if !is_blank(raw) {
                    *value = Some(parse_lab_value(raw).ok_or_else(|| invalid(name, raw))?);
                }
            }
            let [gender, hemoglobin, mch, mchc, mcv] = values;

            visits.push(Visit {
                patient_id,
                visit_date,
                gender,
                hemoglobin,
                mch,
                mchc,
                mcv,
            });
        }

        Ok(visits)
    }
}

impl DatasetSource for CsvDataset {
    type Error = IngestError;

    fn load(&self) -> Result<Vec<Visit>, Self::Error> {
        let file = File::open(&self.path)?;
        let visits = Self::read_from(file)?;
        tracing::info!("Loaded {} rows from {}", visits.len(), self.path.display());
        Ok(visits)
    }
}

/// One row of the tabular export.
#[derive(Debug, Clone, Serialize)]
struct ExportRow {
    #[serde(rename = "Patient_ID")]
    patient_id: Option<i64>,
    #[serde(rename = "Date")]
    date: Option<String>,
    #[serde(rename = "Gender")]
    gender: f64,
    #[serde(rename = "Hemoglobin")]
    hemoglobin: f64,
    #[serde(rename = "MCH")]
    mch: f64,
    #[serde(rename = "MCHC")]
    mchc: f64,
    #[serde(rename = "MCV")]
    mcv: f64,
    #[serde(rename = "Risk Probability (%)")]
    risk_probability: Option<f64>,
    #[serde(rename = "Prediction")]
    prediction: Option<u8>,
    #[serde(rename = "Recommendation")]
    recommendation: String,
}

/// Writes the annotated visit table of every report to one CSV file.
#[derive(Debug, Clone)]
pub struct CsvTableExporter {
    path: PathBuf,
}

impl CsvTableExporter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportExporter for CsvTableExporter {
    type Error = ExportError;

    fn export(&self, reports: &[PatientReport]) -> Result<(), Self::Error> {
        let mut writer = csv::Writer::from_path(&self.path)?;
        let mut rows = 0usize;

        for annotated in reports.iter().flat_map(|r| &r.visits) {
            let visit = &annotated.visit;
            writer.serialize(ExportRow {
                patient_id: visit.patient_id,
                date: visit.visit_date.map(|d| d.format("%Y-%m-%d").to_string()),
                gender: visit.panel.gender,
                hemoglobin: visit.panel.hemoglobin,
                mch: visit.panel.mch,
                mchc: visit.panel.mchc,
                mcv: visit.panel.mcv,
                risk_probability: visit.risk_probability,
                prediction: visit.prediction().map(u8::from),
                recommendation: annotated.recommendation.to_string(),
            })?;
            rows += 1;
        }

        writer.flush()?;
        tracing::info!("CSV export completed: {} rows to {}", rows, self.path.display());
        Ok(())
    }
}
