//! Metrics collection.
//!
//! # Metrics
//! - `api_client_requests_total` (counter): finished calls by method, outcome
//! - `api_client_request_duration_seconds` (histogram): end-to-end latency
//! - `api_client_retries_total` (counter): retries by error kind
//! - `api_client_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `api_client_queue_active` / `api_client_queue_waiting` (gauges)
//! - `api_client_dedup_hits_total` (counter): reads that joined an in-flight call

use metrics::{counter, gauge, histogram};
use std::time::Instant;

use crate::resilience::circuit_breaker::CircuitState;

pub fn record_request(method: &str, outcome: &str, start_time: Instant) {
    let duration = start_time.elapsed().as_secs_f64();
    counter!(
        "api_client_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!(
        "api_client_request_duration_seconds",
        "method" => method.to_string(),
        "outcome" => outcome.to_string()
    )
    .record(duration);
}

pub fn record_retry(kind: &str) {
    counter!("api_client_retries_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_breaker_state(state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("api_client_breaker_state").set(value);
}

pub fn record_queue_depth(active: usize, waiting: usize) {
    gauge!("api_client_queue_active").set(active as f64);
    gauge!("api_client_queue_waiting").set(waiting as f64);
}

pub fn record_dedup_hit() {
    counter!("api_client_dedup_hits_total").increment(1);
}
