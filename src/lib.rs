//! Resilient JSON API client for mobile backends.

pub mod client;
pub mod config;
pub mod dedup;
pub mod observability;
pub mod platform;
pub mod queue;
pub mod resilience;

pub use client::{ApiClient, ApiError, ApiResult, HttpTransport, Method, Transport, WriteRecovery};
pub use config::schema::ClientConfig;
pub use platform::{Platform, PlatformProfile};
