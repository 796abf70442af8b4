//! Recovery for writes that must land.
//!
//! An outer attempt loop around the whole pipeline, then an optional
//! fallback endpoint. Every attempt, including the fallback, carries the
//! same idempotency key so the backend can collapse duplicates.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::client::orchestrated::ApiClient;
use crate::client::transport::Transport;
use crate::client::types::{ApiError, ApiRequest, ApiResult, Method};
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::retries::should_retry;

const MAX_WRITE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecovery {
    attempts: u32,
    fallback_path: Option<String>,
    backoff: Duration,
}

impl Default for WriteRecovery {
    fn default() -> Self {
        Self {
            attempts: MAX_WRITE_ATTEMPTS,
            fallback_path: None,
            backoff: Duration::from_secs(1),
        }
    }
}

impl WriteRecovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamped to 1..=3.
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.clamp(1, MAX_WRITE_ATTEMPTS);
        self
    }

    pub fn fallback(mut self, path: impl Into<String>) -> Self {
        self.fallback_path = Some(path.into());
        self
    }

    /// Base delay between outer attempts, grown linearly.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.attempts
    }

    pub fn fallback_path(&self) -> Option<&str> {
        self.fallback_path.as_deref()
    }

    /// Delay after the `attempt`-th failure, capped at three backoff steps.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.backoff,
            self.backoff.saturating_mul(MAX_WRITE_ATTEMPTS),
        )
    }
}

/// Timeouts and transient failures are worth another attempt.
fn is_recoverable(err: &ApiError) -> bool {
    matches!(err, ApiError::Timeout { .. }) || should_retry(err)
}

impl<T: Transport> ApiClient<T> {
    /// Send a write through the full pipeline up to `recovery.max_attempts()`
    /// times, then once to the fallback path if one is configured and the
    /// last failure was recoverable.
    pub async fn write_with_recovery<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        recovery: &WriteRecovery,
    ) -> ApiResult<Value> {
        if method.is_read() {
            return Err(ApiError::InvalidRequest(format!(
                "write recovery does not apply to {method}"
            )));
        }

        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("unserializable body: {e}")))?;
        let idempotency_key = Uuid::new_v4();

        let mut attempt = 1;
        let last_err = loop {
            let mut request = ApiRequest::new(method, path, Some(body.clone()));
            request.idempotency_key = Some(idempotency_key);

            match self.inner().dispatch(request).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < recovery.attempts && is_recoverable(&err) => {
                    let delay = recovery.delay_for(attempt);
                    tracing::warn!(
                        method = %method,
                        path = %path,
                        attempt,
                        max_attempts = recovery.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => break err,
            }
        };

        let fallback = match recovery.fallback_path() {
            Some(fallback) if is_recoverable(&last_err) => fallback,
            _ => return Err(last_err),
        };

        tracing::warn!(
            method = %method,
            path = %path,
            fallback = %fallback,
            error = %last_err,
            "Write attempts exhausted, using fallback endpoint"
        );

        let mut request = ApiRequest::new(method, fallback, Some(body));
        request.idempotency_key = Some(idempotency_key);
        self.inner().dispatch(request).await
    }
}
