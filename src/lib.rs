//! # Hemotrend
//!
//! Anemia risk monitoring over successive blood-panel visits.
//!
//! This crate provides:
//! - Risk scoring of lab panels through a pluggable classifier
//! - Risk trend classification over a patient's visit history
//! - One-step-ahead forecasting of hemoglobin and risk probability
//! - Clinical-style recommendations for visits and forecasts
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Visits, series and the pure analytic components
//! - `ports`: Trait definitions for external collaborators
//! - `adapters`: Concrete implementations (logistic model, HTTP client, SQLite, CSV)
//! - `application`: Use cases orchestrating domain and ports
//! - `config`: Layered runtime configuration
//! - `render`: Plain-text report rendering

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod render;

pub use domain::{
    ForecastPoint, HemoglobinTrend, LabPanel, PatientSeries, Recommendation, ScoredVisit,
    TrendClassification, TrendLabel, Visit,
};

/// Result type for Hemotrend operations
pub type Result<T> = std::result::Result<T, HemotrendError>;

/// Main error type for Hemotrend
#[derive(Debug, thiserror::Error)]
pub enum HemotrendError {
    #[error(transparent)]
    MissingFeature(#[from] domain::MissingFeatureError),

    #[error(transparent)]
    MalformedHistory(#[from] domain::MalformedHistoryError),

    #[error("Dataset rejected: {0}")]
    Ingest(#[from] adapters::IngestError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] adapters::StorageError),

    #[error("Model not loaded: {0}")]
    ModelNotLoaded(#[from] adapters::ModelLoadError),

    #[error("Export failed: {0}")]
    Export(#[from] adapters::ExportError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No visits found for patient {0}")]
    PatientNotFound(i64),
}

impl From<std::convert::Infallible> for HemotrendError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}
