//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call from the client:
//!     → circuit_breaker.rs (fail fast while open, single probe when half-open)
//!     → timeouts.rs (queue enforces the per-task deadline)
//!     → retries.rs (classify error, retry transient ones)
//!     → backoff.rs (linear delay between attempts)
//! ```
//!
//! # Design Decisions
//! - 503 is an overload signal for the breaker, never an immediate retry
//! - 499 is terminal; retrying an abandoned request risks duplicate writes
//! - Breaker is an explicit object shared through `Arc`, not a global

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitOpenError, CircuitState};
pub use retries::{should_retry, RetryPolicy};
pub use timeouts::DeadlineExceeded;
