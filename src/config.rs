//! Runtime configuration.
//!
//! Sources, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. A TOML file (`--config PATH` or `HEMOTREND_CONFIG`)
//! 3. `HEMOTREND_*` environment variables
//!
//! ```toml
//! [model]
//! path = "models/anemia_model.json"
//! sha256 = "…"
//!
//! [scoring]
//! backend = "remote"
//! endpoint = "http://127.0.0.1:8000/predict"
//! request_delay_ms = 250
//!
//! [analysis]
//! smoothing_window = 3
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::DEFAULT_SMOOTHING_WINDOW;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "HEMOTREND_CONFIG";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which classifier backs the risk scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringBackend {
    /// Logistic model loaded from disk
    #[default]
    Local,
    /// HTTP scoring service
    Remote,
}

impl FromStr for ScoringBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            _ => Err(()),
        }
    }
}

/// Where log lines go. Reports are always printed to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    #[default]
    Stderr,
    File,
}

impl FromStr for LogMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stderr" => Ok(Self::Stderr),
            "file" => Ok(Self::File),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model artifact, or a directory containing `anemia_model.json`
    pub path: PathBuf,
    /// Expected SHA-256 of the artifact (hex)
    pub sha256: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/anemia_model.json"),
            sha256: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub backend: ScoringBackend,
    /// Full URL of the remote `/predict` endpoint
    pub endpoint: String,
    /// Minimum spacing between remote calls
    pub request_delay_ms: u64,
    /// Per-call timeout for remote calls
    pub timeout_ms: u64,
    /// Extra attempts after a transient failure (0 = single attempt)
    pub max_retries: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            backend: ScoringBackend::Local,
            endpoint: "http://127.0.0.1:8000/predict".to_string(),
            request_delay_ms: 250,
            timeout_ms: 5000,
            max_retries: 0,
        }
    }
}

impl ScoringConfig {
    #[must_use]
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Trailing moving-average span for smoothed probabilities
    pub smoothing_window: usize,
    /// Classify the trend on the smoothed series instead of the raw one
    pub smooth_trend: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            smooth_trend: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("hemotrend.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub mode: LogMode,
    /// Log file used when `mode = "file"`
    pub file: PathBuf,
    /// `EnvFilter` directives; `RUST_LOG` wins when set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            mode: LogMode::Stderr,
            file: PathBuf::from("hemotrend.log"),
            filter: "info".to_string(),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub scoring: ScoringConfig,
    pub analysis: AnalysisConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES")
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl AppConfig {
    /// Load configuration from a TOML file. Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Resolve the full configuration from all sources.
    ///
    /// # Errors
    /// Returns error if a source is unreadable or the result is invalid.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let file = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HEMOTREND_*` overrides read through `lookup`.
    ///
    /// # Errors
    /// Returns error if an override does not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HEMOTREND_MODEL_PATH") {
            self.model.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("HEMOTREND_MODEL_SHA256") {
            self.model.sha256 = Some(v);
        }

        if let Some(v) = lookup("HEMOTREND_SCORING_BACKEND") {
            self.scoring.backend = parse_value("HEMOTREND_SCORING_BACKEND", &v)?;
        }
        if let Some(v) = lookup("HEMOTREND_SCORING_ENDPOINT") {
            self.scoring.endpoint = v;
        }
        if let Some(v) = lookup("HEMOTREND_REQUEST_DELAY_MS") {
            self.scoring.request_delay_ms = parse_value("HEMOTREND_REQUEST_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("HEMOTREND_TIMEOUT_MS") {
            self.scoring.timeout_ms = parse_value("HEMOTREND_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("HEMOTREND_MAX_RETRIES") {
            self.scoring.max_retries = parse_value("HEMOTREND_MAX_RETRIES", &v)?;
        }

        if let Some(v) = lookup("HEMOTREND_SMOOTHING_WINDOW") {
            self.analysis.smoothing_window = parse_value("HEMOTREND_SMOOTHING_WINDOW", &v)?;
        }
        if let Some(v) = lookup("HEMOTREND_SMOOTH_TREND") {
            self.analysis.smooth_trend = parse_bool(&v);
        }

        if let Some(v) = lookup("HEMOTREND_DB_PATH") {
            self.storage.database_path = PathBuf::from(v);
        }

        if let Some(v) = lookup("HEMOTREND_LOG_MODE") {
            self.logging.mode = parse_value("HEMOTREND_LOG_MODE", &v)?;
        }
        if let Some(v) = lookup("HEMOTREND_LOG_FILE") {
            self.logging.file = PathBuf::from(v);
        }
        if let Some(v) = lookup("HEMOTREND_LOG") {
            self.logging.filter = v;
        }

        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns error on values no component can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis.smoothing_window == 0 {
            return Err(ConfigError::Invalid(
                "analysis.smoothing_window must be at least 1".into(),
            ));
        }
        if self.scoring.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "scoring.timeout_ms must be positive".into(),
            ));
        }
        if self.scoring.backend == ScoringBackend::Remote && self.scoring.endpoint.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "scoring.endpoint is required for the remote backend".into(),
            ));
        }
        if let Some(pin) = &self.model.sha256 {
            let pin = pin.trim();
            if pin.len() != 64 || !pin.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::Invalid(
                    "model.sha256 must be 64 hex characters".into(),
                ));
            }
        }
        Ok(())
    }
}
