//! Bounded retry decorator for classifiers.

use std::sync::Arc;
use std::time::Duration;

use crate::ports::{Classifier, ClassifierError, ScoringRequest};

/// Whether a classifier failure may succeed on a second attempt.
fn is_transient(error: &ClassifierError) -> bool {
    match error {
        ClassifierError::Unavailable(_) | ClassifierError::Timeout => true,
        ClassifierError::Status { status, .. } => *status == 429 || *status >= 500,
        ClassifierError::MalformedResponse(_) | ClassifierError::NonFinite => false,
    }
}

/// Retries transient failures of the wrapped classifier with a fixed delay.
pub struct RetryingClassifier<C: Classifier + ?Sized> {
    inner: Arc<C>,
    max_retries: u32,
    delay: Duration,
}

impl<C: Classifier + ?Sized> RetryingClassifier<C> {
    #[must_use]
    pub fn new(inner: Arc<C>, max_retries: u32, delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            delay,
        }
    }
}

impl<C: Classifier + ?Sized> Classifier for RetryingClassifier<C> {
    fn predict_proba(&self, request: &ScoringRequest) -> Result<f64, ClassifierError> {
        let mut attempt = 0;
        loop {
            match self.inner.predict_proba(request) {
                Ok(p) => return Ok(p),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    attempt += 1;
                    tracing::warn!(
                        "Scoring attempt {} of {} failed: {}; retrying in {:?}",
                        attempt,
                        self.max_retries + 1,
                        e,
                        self.delay
                    );
                    std::thread::sleep(self.delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} (max {} retries)",
            self.inner.describe(),
            self.max_retries
        )
    }
}
