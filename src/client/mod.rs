//! Orchestrated API client.
//!
//! # Data Flow
//! ```text
//! caller → orchestrated.rs (get/post/put/patch/delete)
//!     → dedup (reads only)
//!     → resilience::circuit_breaker::check (fail fast while open)
//!     → queue (slot, spacing, deadline)
//!     → resilience::circuit_breaker (gate again once the slot is held)
//!     → resilience::retries (transient errors only)
//!     → transport.rs (reqwest, correlation headers, status mapping)
//!
//! write.rs adds an outer attempt loop and a fallback endpoint for
//! selected writes.
//! ```

pub mod orchestrated;
pub mod transport;
pub mod types;
pub mod write;

pub use orchestrated::{ApiClient, ClientParts};
pub use transport::{HttpTransport, Transport};
pub use types::{ApiError, ApiRequest, ApiResult, Method, NetworkErrorKind};
pub use write::WriteRecovery;
