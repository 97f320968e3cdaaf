//! Logistic adapter: Implementation of Classifier from an exported model.
//!
//! The artifact is a JSON export of a standardize-then-logistic-regression
//! pipeline trained on `[Gender, Hemoglobin, MCH, MCHC, MCV]`.
//!
//! # Integrity
//!
//! The artifact is loaded once at startup. When a SHA-256 pin is
//! configured, the file digest must match it before anything is parsed.
//! Any load failure is fatal: the process must not score with no model.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{FEATURE_COUNT, FEATURE_NAMES};
use crate::ports::{Classifier, ClassifierError, ScoringRequest};

/// File name looked up when the model path is a directory.
pub const MODEL_FILE_NAME: &str = "anemia_model.json";

/// Error type for model loading.
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("Model artifact not found at {0:?}")]
    NotFound(PathBuf),

    #[error("Failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid model format: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Model digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Invalid model parameters: {0}")]
    InvalidParameters(String),
}

/// Model parameters exported by the training pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedLogisticModel {
    pub feature_names: Vec<String>,
    pub scaler_mean: Vec<f64>,
    pub scaler_scale: Vec<f64>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl ExportedLogisticModel {
    /// Check feature order, vector lengths and numeric sanity.
    fn validate(&self) -> Result<(), ModelLoadError> {
        if self.feature_names != FEATURE_NAMES {
            return Err(ModelLoadError::InvalidParameters(format!(
                "feature_names must be {FEATURE_NAMES:?}, got {:?}",
                self.feature_names
            )));
        }
        if self.scaler_mean.len() != FEATURE_COUNT
            || self.scaler_scale.len() != FEATURE_COUNT
            || self.coefficients.len() != FEATURE_COUNT
        {
            return Err(ModelLoadError::InvalidParameters(
                "Model parameter lengths do not match feature_names length".into(),
            ));
        }
        let all_finite = self
            .scaler_mean
            .iter()
            .chain(&self.scaler_scale)
            .chain(&self.coefficients)
            .chain(std::iter::once(&self.intercept))
            .all(|x| x.is_finite());
        if !all_finite {
            return Err(ModelLoadError::InvalidParameters(
                "Model parameters must be finite".into(),
            ));
        }
        if self.scaler_scale.iter().any(|s| *s == 0.0) {
            return Err(ModelLoadError::InvalidParameters(
                "scaler_scale must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

fn sha256_hex_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Logistic-regression classifier loaded from disk.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    model: ExportedLogisticModel,
    digest: String,
}

impl LogisticModel {
    /// Load the model artifact.
    ///
    /// `path` may be the JSON file itself or a directory containing
    /// [`MODEL_FILE_NAME`].
    ///
    /// # Errors
    /// Returns error if the file is missing, does not match the pinned digest,
    /// or holds invalid parameters.
    pub fn load(path: &Path, expected_sha256: Option<&str>) -> Result<Self, ModelLoadError> {
        let model_path = if path.is_dir() {
            path.join(MODEL_FILE_NAME)
        } else {
            path.to_path_buf()
        };
        if !model_path.exists() {
            return Err(ModelLoadError::NotFound(model_path));
        }

        let bytes = std::fs::read(&model_path)?;
        let digest = sha256_hex_bytes(&bytes);

        if let Some(expected) = expected_sha256 {
            let expected = expected.trim().to_ascii_lowercase();
            if expected != digest {
                tracing::error!("Model digest mismatch for {:?}", model_path);
                return Err(ModelLoadError::DigestMismatch {
                    expected,
                    actual: digest,
                });
            }
        } else {
            tracing::warn!("No model digest pinned; loading {:?} unverified", model_path);
        }

        let model = Self::from_bytes(&bytes)?;
        tracing::info!(
            "Loaded model from {:?} (sha256={}, n_features={})",
            model_path,
            &digest[..12],
            FEATURE_COUNT
        );

        Ok(model)
    }

    /// Parse and validate a model from JSON bytes.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or parameters are invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelLoadError> {
        let model: ExportedLogisticModel = serde_json::from_slice(bytes)?;
        Self::from_parameters(model).map(|mut m| {
            m.digest = sha256_hex_bytes(bytes);
            m
        })
    }

    /// Build a model from in-memory parameters.
    ///
    /// # Errors
    /// Returns error if parameters are invalid.
    pub fn from_parameters(model: ExportedLogisticModel) -> Result<Self, ModelLoadError> {
        model.validate()?;
        Ok(Self {
            model,
            digest: String::new(),
        })
    }

    /// SHA-256 of the loaded artifact (empty for in-memory models).
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    fn linear_score(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let m = &self.model;
        features
            .iter()
            .zip(&m.scaler_mean)
            .zip(&m.scaler_scale)
            .zip(&m.coefficients)
            .map(|(((x, mean), scale), coef)| coef * (x - mean) / scale)
            .sum::<f64>()
            + m.intercept
    }
}

impl Classifier for LogisticModel {
    fn predict_proba(&self, request: &ScoringRequest) -> Result<f64, ClassifierError> {
        let features = request.features.to_array();
        if features.iter().any(|x| !x.is_finite()) {
            return Err(ClassifierError::NonFinite);
        }

        let probability = sigmoid(self.linear_score(&features));
        if probability.is_finite() {
            Ok(probability)
        } else {
            Err(ClassifierError::NonFinite)
        }
    }

    fn describe(&self) -> String {
        if self.digest.is_empty() {
            "logistic model (in-memory)".to_string()
        } else {
            format!("logistic model sha256:{}", &self.digest[..12])
        }
    }
}
