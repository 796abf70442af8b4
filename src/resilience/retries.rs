//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether an error is transient
//! - Re-run an attempt with linear backoff, bounded by the profile
//!
//! # Design Decisions
//! - Connection failures and 5xx are retried; 503 is left to the breaker
//! - 4xx and 499 are terminal
//! - The attempt number is handed to the operation so it can be reported

use std::future::Future;
use std::time::Duration;

use crate::client::types::{ApiError, NetworkErrorKind, SERVICE_UNAVAILABLE};
use crate::observability::metrics;
use crate::platform::PlatformProfile;
use crate::resilience::backoff::calculate_backoff;

/// Whether `err` is worth retrying immediately.
pub fn should_retry(err: &ApiError) -> bool {
    match err {
        ApiError::Network { kind, .. } => !matches!(kind, NetworkErrorKind::Other),
        ApiError::Status { status, .. } => *status >= 500 && *status != SERVICE_UNAVAILABLE,
        ApiError::ServiceUnavailable { .. }
        | ApiError::ConnectionInterrupted { .. }
        | ApiError::CircuitOpen { .. }
        | ApiError::Timeout { .. }
        | ApiError::Decode(_)
        | ApiError::InvalidRequest(_) => false,
    }
}

/// Bounded linear retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    pub fn from_profile(profile: &PlatformProfile) -> Self {
        Self::new(
            profile.max_retries,
            profile.retry_base_delay,
            profile.retry_max_delay,
        )
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay, self.max_delay)
    }

    /// Run `op` until it succeeds, fails terminally, or retries run out.
    ///
    /// `op` receives the attempt number, starting at 0.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && should_retry(&err) => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    tracing::info!(
                        request = %label,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying request"
                    );
                    metrics::record_retry(err.kind());
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
