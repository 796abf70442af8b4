//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::platform::{Platform, PlatformProfile};

/// Root configuration for the client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL (e.g., "https://api.example.com").
    pub base_url: String,

    /// OS identifier used to pick the platform profile. Detected when unset.
    pub platform: Option<String>,

    /// Per-field overrides applied on top of the platform profile.
    pub profile: ProfileOverrides,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            platform: None,
            profile: ProfileOverrides::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Platform named in the config, or the running one.
    pub fn platform(&self) -> Platform {
        match &self.platform {
            Some(os) => Platform::from_os_identifier(os),
            None => Platform::current(),
        }
    }

    /// Platform defaults with any configured overrides applied.
    pub fn resolve_profile(&self) -> PlatformProfile {
        self.profile.apply(PlatformProfile::for_platform(self.platform()))
    }
}

/// Optional overrides for individual profile fields.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfileOverrides {
    pub max_concurrent: Option<usize>,
    pub min_interval_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub failure_threshold: Option<u32>,
    pub reset_timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
}

impl ProfileOverrides {
    pub fn apply(&self, mut profile: PlatformProfile) -> PlatformProfile {
        if let Some(v) = self.max_concurrent {
            profile.max_concurrent = v;
        }
        if let Some(v) = self.min_interval_ms {
            profile.min_interval = Duration::from_millis(v);
        }
        if let Some(v) = self.request_timeout_ms {
            profile.request_timeout = Duration::from_millis(v);
        }
        if let Some(v) = self.failure_threshold {
            profile.failure_threshold = v;
        }
        if let Some(v) = self.reset_timeout_ms {
            profile.reset_timeout = Duration::from_millis(v);
        }
        if let Some(v) = self.max_retries {
            profile.max_retries = v;
        }
        if let Some(v) = self.retry_base_delay_ms {
            profile.retry_base_delay = Duration::from_millis(v);
        }
        if let Some(v) = self.retry_max_delay_ms {
            profile.retry_max_delay = Duration::from_millis(v);
        }
        profile
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
