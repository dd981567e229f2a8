//! Provider → rules → sink pipeline for a single image.

use crate::config::ThresholdConfig;
use crate::provider::{
    AttributeCategory, AttributeProvider, ImageRef, ProviderError, MAX_ATTRIBUTE_FACES,
};
use crate::rules::{self, Verdict};
use crate::sink::{ResultSink, SinkError};
use std::collections::BTreeSet;
use std::time::Duration;

/// How retryable provider errors are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total provider calls, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Result of checking one image.
#[derive(Debug)]
pub enum CheckOutcome {
    Evaluated {
        verdict: Verdict,
        attempts: u32,
        /// Set when the sink rejected the record; the verdict stands regardless.
        sink_error: Option<SinkError>,
    },
    NotEvaluable {
        error: ProviderError,
        attempts: u32,
    },
}

impl CheckOutcome {
    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            CheckOutcome::Evaluated { verdict, .. } => Some(verdict),
            CheckOutcome::NotEvaluable { .. } => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            CheckOutcome::Evaluated { attempts, .. } | CheckOutcome::NotEvaluable { attempts, .. } => {
                *attempts
            }
        }
    }
}

pub struct Checker<P, S> {
    provider: P,
    sink: S,
    config: ThresholdConfig,
    retry: RetryPolicy,
    requested: BTreeSet<AttributeCategory>,
    max_faces: u32,
}

impl<P: AttributeProvider, S: ResultSink> Checker<P, S> {
    pub fn new(provider: P, sink: S, config: ThresholdConfig) -> Self {
        Self {
            provider,
            sink,
            config,
            retry: RetryPolicy::default(),
            requested: AttributeCategory::avatar_set(),
            max_faces: MAX_ATTRIBUTE_FACES,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Faces requested from the provider, clamped to `1..=MAX_ATTRIBUTE_FACES`.
    /// Must be at least 2 for multiple faces to be noticed.
    pub fn with_max_faces(mut self, max_faces: u32) -> Self {
        self.max_faces = max_faces.clamp(1, MAX_ATTRIBUTE_FACES);
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Fetch attributes for `image`, evaluate them and record the verdict
    /// under `source`. Nothing is recorded when no payload was obtained.
    pub fn check(&self, image: &ImageRef, source: &str) -> CheckOutcome {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempts = 0;

        let payload = loop {
            attempts += 1;
            match self.provider.detect(image, &self.requested, self.max_faces) {
                Ok(payload) => break payload,
                Err(error) if error.is_retryable() && attempts < max_attempts => {
                    tracing::warn!(
                        source,
                        attempt = attempts,
                        max_attempts,
                        error = %error,
                        "provider call failed; retrying"
                    );
                    if !self.retry.backoff.is_zero() {
                        std::thread::sleep(self.retry.backoff);
                    }
                }
                Err(error) => {
                    tracing::warn!(source, attempts, error = %error, "image not evaluable");
                    return CheckOutcome::NotEvaluable { error, attempts };
                }
            }
        };

        let verdict = rules::evaluate(&payload, &self.config);
        tracing::info!(
            source,
            valid = verdict.is_valid,
            faces = verdict.face_count,
            "avatar checked"
        );

        let sink_error = match self.sink.record(&verdict, source) {
            Ok(()) => None,
            Err(err) => {
                tracing::error!(source, error = %err, "failed to record verdict");
                Some(err)
            }
        };

        CheckOutcome::Evaluated {
            verdict,
            attempts,
            sink_error,
        }
    }
}
