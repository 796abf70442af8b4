//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! queue / breaker / retries / client produce:
//!     → tracing events (module path is the subsystem tag)
//!     → metrics.rs (counters, gauges, histograms via the `metrics` facade)
//!
//! Consumers:
//!     → whatever subscriber logging.rs installs (stdout by default)
//!     → whatever recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - Request ID is attached to every event about a request
//! - Metrics are no-ops until the host installs a recorder

pub mod logging;
pub mod metrics;
