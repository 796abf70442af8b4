//! Platform detection and per-platform tuning.
//!
//! # Data Flow
//! ```text
//! OS identifier (config or std::env::consts::OS)
//!     → Platform::from_os_identifier
//!     → PlatformProfile::for_platform (+ config overrides)
//!     → passed by value into queue, breaker and retry policy
//! ```
//!
//! # Design Decisions
//! - Resolved exactly once at startup; nothing downstream branches on the OS
//! - Strict profile exists because iOS drops parallel connections aggressively

pub mod profile;

pub use profile::{Platform, PlatformProfile};
