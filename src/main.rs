//! Hemotrend: Anemia risk trend and forecast analysis.
//!
//! Main entry point for the command-line application.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hemotrend::adapters::json::JsonReportExporter;
use hemotrend::adapters::logistic::LogisticModel;
use hemotrend::adapters::remote::RemoteClassifier;
use hemotrend::adapters::retry::RetryingClassifier;
use hemotrend::adapters::sanitize::SanitizingMakeWriter;
use hemotrend::adapters::sqlite::SqliteVisitStore;
use hemotrend::adapters::tabular::{CsvDataset, CsvTableExporter};
use hemotrend::application::{AnalysisService, HistoryService, RiskScorer};
use hemotrend::config::{AppConfig, LogMode, LoggingConfig, ScoringBackend};
use hemotrend::domain::{LinearTrendPolicy, PatientReport, TrendAnalyzer};
use hemotrend::ports::{Classifier, ReportExporter};
use hemotrend::render::render_report;

#[derive(Debug, Parser)]
#[command(name = "hemotrend", version, about = "Anemia risk trend and forecast analysis")]
struct Cli {
    /// TOML configuration file (overrides HEMOTREND_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Score a visit dataset and report trend, forecast and recommendations
    Analyze {
        /// CSV with Gender, Hemoglobin, MCH, MCHC, MCV (and optionally Patient_ID, Date)
        #[arg(value_name = "CSV")]
        input: PathBuf,

        /// Only analyze this patient
        #[arg(long)]
        patient: Option<i64>,

        /// Save scored visits to the history database
        #[arg(long)]
        record: bool,

        /// Write the full reports as JSON
        #[arg(long, value_name = "PATH")]
        json: Option<PathBuf>,

        /// Write the annotated visit table as CSV
        #[arg(long = "csv", value_name = "PATH")]
        csv_out: Option<PathBuf>,
    },

    /// Re-analyze a patient's stored history
    History {
        patient_id: i64,

        /// Write the report as JSON
        #[arg(long, value_name = "PATH")]
        json: Option<PathBuf>,
    },
}

/// Open the log file for appending, creating missing parent directories.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {parent:?}"))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {path:?}"))
}

fn init_tracing(logging: &LoggingConfig) -> Result<WorkerGuard> {
    // Reports go to stdout; logs never do.
    let (writer, guard) = match logging.mode {
        LogMode::File => tracing_appender::non_blocking(open_log_file(&logging.file)?),
        LogMode::Stderr => tracing_appender::non_blocking(std::io::stderr()),
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(SanitizingMakeWriter::new(writer)),
        )
        .init();

    Ok(guard)
}

/// Build the classifier once at startup. Failure here is fatal.
fn build_classifier(config: &AppConfig) -> Result<Arc<dyn Classifier>> {
    let base: Arc<dyn Classifier> = match config.scoring.backend {
        ScoringBackend::Local => {
            let model = LogisticModel::load(&config.model.path, config.model.sha256.as_deref())
                .context("Refusing to start without a valid model")?;
            Arc::new(model)
        }
        ScoringBackend::Remote => Arc::new(RemoteClassifier::new(
            config.scoring.endpoint.clone(),
            config.scoring.request_delay(),
            config.scoring.timeout(),
        )),
    };

    if config.scoring.max_retries == 0 {
        return Ok(base);
    }
    Ok(Arc::new(RetryingClassifier::new(
        base,
        config.scoring.max_retries,
        config.scoring.request_delay(),
    )))
}

fn build_service(config: &AppConfig) -> Result<AnalysisService<dyn Classifier>> {
    let window = config.analysis.smoothing_window;
    let trend = if config.analysis.smooth_trend {
        TrendAnalyzer::with_smoothing(window)
    } else {
        TrendAnalyzer::new()
    };

    Ok(
        AnalysisService::new(RiskScorer::new(build_classifier(config)?))
            .with_trend_analyzer(trend)
            .with_forecast_policy(Box::new(
                LinearTrendPolicy::default().with_smoothing_window(window),
            )),
    )
}

fn print_reports(reports: &[PatientReport]) {
    for report in reports {
        println!("{}", render_report(report));
    }
}

fn export(reports: &[PatientReport], json: Option<PathBuf>, csv: Option<PathBuf>) -> Result<()> {
    if let Some(path) = json {
        JsonReportExporter::new(path).export(reports)?;
    }
    if let Some(path) = csv {
        CsvTableExporter::new(path).export(reports)?;
    }
    Ok(())
}

fn run(cli: Cli, config: &AppConfig) -> Result<()> {
    let service = build_service(config)?;

    match cli.command {
        Command::Analyze {
            input,
            patient,
            record,
            json,
            csv_out,
        } => {
            let analysis = service
                .analyze_source(&CsvDataset::new(input.clone()), patient)
                .with_context(|| format!("Analysis of {} failed", input.display()))?;

            for warning in &analysis.warnings {
                eprintln!("warning: prediction unavailable for {warning}");
            }
            for failure in &analysis.failures {
                eprintln!("error: {failure}");
            }
            print_reports(&analysis.reports);
            if analysis.reports.is_empty() {
                if let Some(failure) = analysis.failures.first() {
                    return Err(failure.clone().into());
                }
            }

            if record {
                match SqliteVisitStore::new(&config.storage.database_path) {
                    Ok(store) => {
                        let history = HistoryService::new(Arc::new(store));
                        let visits: Vec<_> = analysis
                            .reports
                            .iter()
                            .flat_map(|r| r.visits.iter().map(|v| v.visit.clone()))
                            .collect();
                        let summary = history.record_batch(&visits);
                        if summary.failed > 0 {
                            eprintln!("warning: {} visits not recorded", summary.failed);
                        }
                    }
                    Err(e) => tracing::warn!("History not recorded: {}", e),
                }
            }

            export(&analysis.reports, json, csv_out)?;
        }
        Command::History { patient_id, json } => {
            let store = SqliteVisitStore::new(&config.storage.database_path)
                .context("Failed to open history database")?;
            let history = HistoryService::new(Arc::new(store));
            let series = history.patient_series(patient_id)?;
            let report = service.analyze_series(&series)?;

            print_reports(std::slice::from_ref(&report));
            export(std::slice::from_ref(&report), json, None)?;
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Invalid configuration")?;
    let _guard = init_tracing(&config.logging)?;

    tracing::info!("Starting Hemotrend...");
    let result = run(cli, &config);
    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    tracing::info!("Hemotrend finished.");
    result
}
