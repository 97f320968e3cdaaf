//! Remote adapter: Implementation of Classifier over the scoring HTTP API.
//!
//! Each row is sent as `POST /predict`. The service scores the row, stores
//! it, and answers `{"result": {"probability": <percent>, ...}, "record_id": N}`.
//!
//! Successive calls are paced by a fixed delay to respect the service's
//! rate limit, and every call has its own timeout. There is no retry here;
//! wrap the client in `RetryingClassifier` for that.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::ports::{Classifier, ClassifierError, ScoringRequest};

/// Request body of `POST /predict`.
#[derive(Debug, Clone, Serialize)]
struct PredictPayload {
    patient_id: i64,
    date: String,
    #[serde(rename = "Gender")]
    gender: i64,
    #[serde(rename = "Hemoglobin")]
    hemoglobin: f64,
    #[serde(rename = "MCH")]
    mch: f64,
    #[serde(rename = "MCHC")]
    mchc: f64,
    #[serde(rename = "MCV")]
    mcv: f64,
}

impl From<&ScoringRequest> for PredictPayload {
    fn from(request: &ScoringRequest) -> Self {
        let f = &request.features;
        Self {
            patient_id: request.patient_id.unwrap_or(0),
            date: request
                .visit_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            gender: f.gender.round() as i64,
            hemoglobin: f.hemoglobin,
            mch: f.mch,
            mchc: f.mchc,
            mcv: f.mcv,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PredictResponse {
    result: PredictResult,
    #[serde(default)]
    record_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PredictResult {
    #[serde(default)]
    probability: Option<f64>,
}

/// Enforces a minimum spacing between successive calls.
#[derive(Debug)]
pub struct RequestPacer {
    delay: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestPacer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last: Mutex::new(None),
        }
    }

    /// Block until `delay` has passed since the previous call, then mark now.
    pub fn wait(&self) {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    use std::error::Error as _;
    transport
        .source()
        .and_then(|e| e.downcast_ref::<std::io::Error>())
        .map(|e| {
            matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        })
        .unwrap_or(false)
}

/// HTTP client for the remote scoring endpoint.
pub struct RemoteClassifier {
    agent: ureq::Agent,
    endpoint: String,
    pacer: RequestPacer,
}

impl RemoteClassifier {
    /// Create a client for `endpoint` (the full `/predict` URL).
    #[must_use]
    pub fn new(endpoint: impl Into<String>, request_delay: Duration, timeout: Duration) -> Self {
        let endpoint = endpoint.into();
        tracing::info!(
            "Initializing remote scoring client for {} (delay={:?}, timeout={:?})",
            endpoint,
            request_delay,
            timeout
        );
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            endpoint,
            pacer: RequestPacer::new(request_delay),
        }
    }

    fn parse_response(response: ureq::Response) -> Result<f64, ClassifierError> {
        let body: PredictResponse = response
            .into_json()
            .map_err(|e| ClassifierError::MalformedResponse(e.to_string()))?;

        let percent = body.result.probability.ok_or_else(|| {
            ClassifierError::MalformedResponse("result.probability missing".into())
        })?;
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(ClassifierError::MalformedResponse(format!(
                "probability {percent} outside [0, 100]"
            )));
        }

        if let Some(record_id) = body.record_id {
            tracing::debug!(record_id, "Remote service stored scored visit");
        }
        Ok(percent / 100.0)
    }
}

impl Classifier for RemoteClassifier {
    fn predict_proba(&self, request: &ScoringRequest) -> Result<f64, ClassifierError> {
        let payload = PredictPayload::from(request);
        self.pacer.wait();

        match self.agent.post(&self.endpoint).send_json(&payload) {
            Ok(response) if response.status() == 200 => Self::parse_response(response),
            Ok(response) => Err(ClassifierError::Status {
                status: response.status(),
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Status(status, response)) => Err(ClassifierError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) if is_timeout(&transport) => {
                Err(ClassifierError::Timeout)
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(ClassifierError::Unavailable(transport.to_string()))
            }
        }
    }

    fn describe(&self) -> String {
        format!("remote scoring service at {}", self.endpoint)
    }
}
