//! Static per-device concurrency and timing parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Operating system family the client runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Other,
}

impl Platform {
    /// Map an OS identifier (`"ios"`, `"android"`, `"linux"`, ...) to a platform.
    pub fn from_os_identifier(os: &str) -> Self {
        match os.trim().to_ascii_lowercase().as_str() {
            "ios" | "iphoneos" | "ipados" => Platform::Ios,
            "android" => Platform::Android,
            _ => Platform::Other,
        }
    }

    /// Platform of the running process.
    pub fn current() -> Self {
        Self::from_os_identifier(std::env::consts::OS)
    }

    /// Platforms that need serialized, spaced-out requests.
    pub fn is_strict(&self) -> bool {
        matches!(self, Platform::Ios)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Other => "other",
        }
    }

    /// Fixed user-facing message for an abandoned connection (HTTP 499).
    pub fn interrupted_message(&self) -> &'static str {
        match self {
            Platform::Ios => {
                "Connection interrupted. iOS paused the request while the network changed; please try again."
            }
            Platform::Android | Platform::Other => {
                "Connection interrupted. Please check your connection and try again."
            }
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable tuning constants selected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlatformProfile {
    /// Maximum tasks executing at the same time.
    pub max_concurrent: usize,
    /// Minimum gap between two dispatch start times.
    pub min_interval: Duration,
    /// Budget for one queued task, retries included.
    pub request_timeout: Duration,
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Cooldown before a half-open probe is allowed.
    pub reset_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl PlatformProfile {
    /// Serialized profile for platforms that drop parallel connections.
    pub fn strict() -> Self {
        Self {
            max_concurrent: 1,
            min_interval: Duration::from_millis(2000),
            request_timeout: Duration::from_millis(45_000),
            failure_threshold: 3,
            reset_timeout: Duration::from_millis(60_000),
            max_retries: 1,
            retry_base_delay: Duration::from_millis(1000),
            retry_max_delay: Duration::from_millis(5000),
        }
    }

    pub fn standard() -> Self {
        Self {
            max_concurrent: 3,
            min_interval: Duration::from_millis(100),
            request_timeout: Duration::from_millis(15_000),
            failure_threshold: 5,
            reset_timeout: Duration::from_millis(30_000),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            retry_max_delay: Duration::from_millis(5000),
        }
    }

    pub fn for_platform(platform: Platform) -> Self {
        if platform.is_strict() {
            Self::strict()
        } else {
            Self::standard()
        }
    }
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self::for_platform(Platform::current())
    }
}
