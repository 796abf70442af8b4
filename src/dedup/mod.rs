//! Single-flight deduplication for idempotent reads.
//!
//! # Data Flow
//! ```text
//! deduped(key, make)
//!     → live entry for key? clone its shared future and await it
//!     → otherwise build the future, store a weak handle, await it
//!     → on settle the future removes its own entry
//! ```
//!
//! # Design Decisions
//! - Only reads go through here; writes are never coalesced
//! - The map holds weak handles, so callers that all give up drop the
//!   request (and release its queue slot) instead of parking it in the map

pub mod in_flight;

pub use in_flight::InFlightCache;
