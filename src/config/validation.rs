//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate the base URL and the resolved profile's value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;
use url::Url;

use crate::config::schema::ClientConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("base_url '{url}' is invalid: {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("{field} must be at least {min}")]
    TooSmall { field: &'static str, min: u64 },

    #[error("retry_max_delay must not be smaller than retry_base_delay")]
    RetryDelayOrder,
}

pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::BaseUrl {
            url: config.base_url.clone(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Err(e) => errors.push(ValidationError::BaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        }),
    }

    let profile = config.resolve_profile();
    if profile.max_concurrent < 1 {
        errors.push(ValidationError::TooSmall { field: "max_concurrent", min: 1 });
    }
    if profile.failure_threshold < 1 {
        errors.push(ValidationError::TooSmall { field: "failure_threshold", min: 1 });
    }
    if profile.request_timeout.is_zero() {
        errors.push(ValidationError::TooSmall { field: "request_timeout_ms", min: 1 });
    }
    if profile.reset_timeout.is_zero() {
        errors.push(ValidationError::TooSmall { field: "reset_timeout_ms", min: 1 });
    }
    if profile.retry_max_delay < profile.retry_base_delay {
        errors.push(ValidationError::RetryDelayOrder);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
