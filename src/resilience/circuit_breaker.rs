//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: a single probe is testing whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= threshold
//! Open → Half-Open: first call after reset_timeout since the last failure
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails (or is abandoned)
//! ```
//!
//! # Design Decisions
//! - One breaker per backend, shared by every caller through `Arc`
//! - Fail fast in Open state (the wrapped operation is never invoked)
//! - Single probe in Half-Open (prevents hammering a recovering backend)

use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::client::types::ApiError;
use crate::observability::metrics;
use crate::platform::PlatformProfile;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Raised instead of running the operation while the circuit is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("circuit open, retry in {}ms", retry_in.as_millis())]
pub struct CircuitOpenError {
    /// Time left until a probe will be allowed; zero while a probe is running.
    pub retry_in: Duration,
}

impl From<CircuitOpenError> for ApiError {
    fn from(e: CircuitOpenError) -> Self {
        ApiError::CircuitOpen {
            retry_in: e.retry_in,
        }
    }
}

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure: Option<Instant>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

/// Consecutive-failure circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
            }),
        }
    }

    pub fn from_profile(profile: &PlatformProfile) -> Self {
        Self::new(profile.failure_threshold, profile.reset_timeout)
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure: inner.last_failure,
        }
    }

    /// Force the breaker closed and forget past failures.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.last_failure = None;
        metrics::record_breaker_state(CircuitState::Closed);
        tracing::info!("Circuit breaker reset");
    }

    /// Run `op` through the breaker; every `Err` counts as a failure.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        self.execute_with(op, |_| true).await
    }

    /// Run `op` through the breaker; `is_failure` decides which errors count.
    ///
    /// Errors that do not count are treated like a success: the backend
    /// answered, so it is reachable.
    pub async fn execute_with<T, E, F, Fut, C>(&self, op: F, is_failure: C) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
        C: Fn(&E) -> bool,
    {
        let permit = self.acquire()?;
        let result = op().await;
        match &result {
            Err(e) if is_failure(e) => permit.failure(),
            _ => permit.success(),
        }
        result
    }

    /// Whether a call made now could be let through, without changing state.
    ///
    /// Used to fail fast before waiting for anything else; the call must
    /// still go through [`acquire`](Self::acquire) when it is ready to run.
    pub fn check(&self) -> Result<(), CircuitOpenError> {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Err(CircuitOpenError {
                retry_in: Duration::ZERO,
            }),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(self.reset_timeout);
                if elapsed >= self.reset_timeout {
                    Ok(())
                } else {
                    Err(CircuitOpenError {
                        retry_in: self.reset_timeout - elapsed,
                    })
                }
            }
        }
    }

    /// Count a failure observed outside any permit, such as a deadline that
    /// dropped the call before it could report.
    pub fn record_failure(&self) {
        self.on_failure(false);
    }

    /// Ask for permission to run one call.
    pub fn acquire(&self) -> Result<Permit<'_>, CircuitOpenError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::HalfOpen => {
                tracing::debug!("Circuit half-open with probe in flight, rejecting call");
                Err(CircuitOpenError {
                    retry_in: Duration::ZERO,
                })
            }
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(self.reset_timeout);

                if elapsed >= self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    metrics::record_breaker_state(CircuitState::HalfOpen);
                    tracing::info!(
                        consecutive_failures = inner.consecutive_failures,
                        "Circuit breaker half-open, letting probe through"
                    );
                    Ok(Permit::new(self, true))
                } else {
                    Err(CircuitOpenError {
                        retry_in: self.reset_timeout - elapsed,
                    })
                }
            }
        }
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.lock();
        if probe {
            inner.state = CircuitState::Closed;
            inner.consecutive_failures = 0;
            metrics::record_breaker_state(CircuitState::Closed);
            tracing::info!("Probe succeeded, circuit breaker closed");
        } else if inner.state == CircuitState::Closed {
            inner.consecutive_failures = 0;
        }
    }

    fn on_failure(&self, probe: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        if probe {
            inner.state = CircuitState::Open;
            metrics::record_breaker_state(CircuitState::Open);
            tracing::warn!(
                consecutive_failures = inner.consecutive_failures,
                "Probe failed, circuit breaker re-opened"
            );
        } else if inner.state == CircuitState::Closed
            && inner.consecutive_failures >= self.failure_threshold
        {
            inner.state = CircuitState::Open;
            metrics::record_breaker_state(CircuitState::Open);
            tracing::warn!(
                consecutive_failures = inner.consecutive_failures,
                threshold = self.failure_threshold,
                reset_timeout_ms = self.reset_timeout.as_millis() as u64,
                "Circuit breaker opened"
            );
        } else {
            tracing::debug!(
                consecutive_failures = inner.consecutive_failures,
                threshold = self.failure_threshold,
                state = %inner.state,
                "Circuit breaker failure recorded"
            );
        }
    }

    fn on_abandoned_probe(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            // last_failure untouched: the next call may probe right away
            inner.state = CircuitState::Open;
            metrics::record_breaker_state(CircuitState::Open);
            tracing::debug!("Probe abandoned before completing, circuit back to open");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }
}

/// Permission to run one call. Report the outcome with `success` or `failure`.
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    /// True when this call is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.on_abandoned_probe();
        }
    }
}
