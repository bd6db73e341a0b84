use serde_json::Value;
use std::time::Duration;

use super::connection::ApiConnectionError;
use super::transport::{JsonPost, JsonTransport};

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct CandidateFailure {
    pub url: String,
    pub error: ApiConnectionError,
}

#[derive(Debug)]
pub enum Resolution {
    /// First candidate that answered 2xx with a JSON body.
    Resolved { url: String, data: Value },
    /// Every candidate failed; one entry per candidate, in scan order.
    Exhausted { failures: Vec<CandidateFailure> },
}

impl Resolution {
    pub fn is_success(&self) -> bool {
        matches!(self, Resolution::Resolved { .. })
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Resolution::Resolved { url, .. } => Some(url),
            Resolution::Exhausted { .. } => None,
        }
    }
}

/// Scans candidate endpoints strictly one after another. Remote workflows are
/// not idempotent, so candidates are never raced in parallel. No preference is
/// remembered between calls.
pub struct EndpointResolver<'a> {
    transport: &'a dyn JsonTransport,
    attempt_timeout: Duration,
}

impl<'a> EndpointResolver<'a> {
    pub fn new(transport: &'a dyn JsonTransport) -> Self {
        Self {
            transport,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub async fn resolve<S: AsRef<str>>(&self, candidates: &[S], payload: &Value) -> Resolution {
        let mut failures = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let url = candidate.as_ref();
            match self.attempt(url, payload).await {
                Ok(data) => {
                    tracing::info!(url, failed_before = failures.len(), "endpoint candidate resolved");
                    return Resolution::Resolved {
                        url: url.to_string(),
                        data,
                    };
                }
                Err(error) => {
                    tracing::warn!(url, error = %error, "endpoint candidate failed");
                    failures.push(CandidateFailure {
                        url: url.to_string(),
                        error,
                    });
                }
            }
        }

        tracing::error!(candidates = candidates.len(), "all endpoint candidates failed");
        Resolution::Exhausted { failures }
    }

    async fn attempt(&self, url: &str, payload: &Value) -> Result<Value, ApiConnectionError> {
        let reply = self
            .transport
            .post_json(JsonPost::new(url, payload, self.attempt_timeout))
            .await?
            .error_for_status()?;

        // 2xx with a non-JSON body is a soft failure for this candidate only
        reply.json::<Value>().map_err(|e| {
            let preview: String = reply.body.chars().take(100).collect();
            tracing::warn!(url, preview = %preview, "success status but body is not JSON");
            e
        })
    }
}
