//! Request and error types shared by every subsystem.

use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// HTTP verbs supported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Reads are the only requests that may be coalesced.
    pub fn is_read(&self) -> bool {
        matches!(self, Method::Get)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A single outbound call as seen by the transport.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL (e.g. `/meals/today`).
    pub path: String,
    pub body: Option<Value>,
    /// Correlation id sent as `X-Request-ID`; stable across retries.
    pub request_id: Uuid,
    /// Zero for the first attempt.
    pub attempt: u32,
    /// Sent as `Idempotency-Key` when set.
    pub idempotency_key: Option<Uuid>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            body,
            request_id: Uuid::new_v4(),
            attempt: 0,
            idempotency_key: None,
        }
    }

    /// Key used to coalesce identical reads: verb + path.
    pub fn dedup_key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Connection-level failure categories (no HTTP response received).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Refused,
    Dns,
    Aborted,
    TimedOut,
    Other,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkErrorKind::Refused => "connection refused",
            NetworkErrorKind::Dns => "dns failure",
            NetworkErrorKind::Aborted => "connection aborted",
            NetworkErrorKind::TimedOut => "timed out",
            NetworkErrorKind::Other => "network failure",
        };
        f.write_str(s)
    }
}

/// Status code some gateways use when the client abandoned the connection.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Status code the backend uses to signal saturation.
pub const SERVICE_UNAVAILABLE: u16 = 503;

/// Errors surfaced to callers of the client.
///
/// `Clone` so that one outcome can be handed to every caller sharing a
/// deduplicated read.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No response was received.
    #[error("{kind}: {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    /// The connection was abandoned mid-request (HTTP 499).
    #[error("{message}")]
    ConnectionInterrupted { message: String },

    /// Backend explicitly signalled overload (HTTP 503).
    #[error("service unavailable (HTTP 503)")]
    ServiceUnavailable { body: Option<Value> },

    /// Any other non-2xx response.
    #[error("request failed with HTTP {status}")]
    Status { status: u16, body: Option<Value> },

    /// Rejected by the circuit breaker without attempting the call.
    #[error("service temporarily unavailable, retry in {}ms", retry_in.as_millis())]
    CircuitOpen { retry_in: Duration },

    /// The request queue gave up waiting on the task.
    #[error("request timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// HTTP status carried by the error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::ConnectionInterrupted { .. } => Some(CLIENT_CLOSED_REQUEST),
            ApiError::ServiceUnavailable { .. } => Some(SERVICE_UNAVAILABLE),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this outcome says something about backend health.
    ///
    /// Client errors mean the backend answered, so they do not count against
    /// the circuit breaker.
    pub fn trips_breaker(&self) -> bool {
        match self {
            ApiError::Network { .. }
            | ApiError::Timeout { .. }
            | ApiError::ServiceUnavailable { .. } => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::ConnectionInterrupted { .. }
            | ApiError::CircuitOpen { .. }
            | ApiError::Decode(_)
            | ApiError::InvalidRequest(_) => false,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Network { .. } => "network",
            ApiError::ConnectionInterrupted { .. } => "interrupted",
            ApiError::ServiceUnavailable { .. } => "unavailable",
            ApiError::Status { status, .. } if *status >= 500 => "server_error",
            ApiError::Status { .. } => "client_error",
            ApiError::CircuitOpen { .. } => "circuit_open",
            ApiError::Timeout { .. } => "timeout",
            ApiError::Decode(_) => "decode",
            ApiError::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Result type for client operations.
pub type ApiResult<T> = Result<T, ApiError>;
