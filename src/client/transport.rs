//! Transport seam and the reqwest implementation.
//!
//! # Responsibilities
//! - Join request paths onto the base URL
//! - Attach correlation headers (request id, platform, attempt)
//! - Map HTTP statuses and connection failures into `ApiError`

use reqwest::header::ACCEPT;
use serde_json::Value;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::client::types::{
    ApiError, ApiRequest, ApiResult, NetworkErrorKind, CLIENT_CLOSED_REQUEST, SERVICE_UNAVAILABLE,
};
use crate::platform::Platform;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const PLATFORM_HEADER: &str = "x-platform";
pub const ATTEMPT_HEADER: &str = "x-retry-attempt";
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Executes a single request against the backend. No retries, no queueing.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: ApiRequest) -> impl Future<Output = ApiResult<Value>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn send(&self, request: ApiRequest) -> impl Future<Output = ApiResult<Value>> + Send {
        (**self).send(request)
    }
}

/// JSON-over-HTTP transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    platform: Platform,
}

impl HttpTransport {
    /// `request_timeout` is also set on the reqwest client so the socket is
    /// torn down even if the caller keeps polling.
    pub fn new(base_url: &str, platform: Platform, request_timeout: Duration) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;

        Self::with_client(client, base_url, platform)
    }

    /// Use a preconfigured reqwest client (proxy, TLS roots, pool settings).
    pub fn with_client(client: reqwest::Client, base_url: &str, platform: Platform) -> ApiResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid base URL '{base_url}': {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            platform,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn url_for(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidRequest(format!("invalid path '{path}': {e}")))
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> ApiResult<Value> {
        let url = self.url_for(&request.path)?;

        let mut builder = self
            .client
            .request(request.method.into(), url)
            .header(ACCEPT, "application/json")
            .header(REQUEST_ID_HEADER, request.request_id.to_string())
            .header(PLATFORM_HEADER, self.platform.as_str())
            .header(ATTEMPT_HEADER, request.attempt.to_string());
        if let Some(key) = request.idempotency_key {
            builder = builder.header(IDEMPOTENCY_HEADER, key.to_string());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;

        if status.is_success() {
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()));
        }

        let body = error_body(&bytes);
        tracing::debug!(
            request_id = %request.request_id,
            status = status.as_u16(),
            "Backend returned error status"
        );

        Err(match status.as_u16() {
            CLIENT_CLOSED_REQUEST => ApiError::ConnectionInterrupted {
                message: self.platform.interrupted_message().to_string(),
            },
            SERVICE_UNAVAILABLE => ApiError::ServiceUnavailable { body },
            code => ApiError::Status { status: code, body },
        })
    }
}

/// Error bodies are kept for callers; non-JSON text is wrapped as a string.
fn error_body(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice(bytes)
        .ok()
        .or_else(|| Some(Value::String(String::from_utf8_lossy(bytes).into_owned())))
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    let message = error_chain(&err);

    if err.is_builder() {
        return ApiError::InvalidRequest(message);
    }
    if err.is_decode() {
        return ApiError::Decode(message);
    }

    let kind = if err.is_timeout() {
        NetworkErrorKind::TimedOut
    } else if err.is_connect() {
        let lower = message.to_ascii_lowercase();
        if lower.contains("dns error") || lower.contains("failed to lookup address") {
            NetworkErrorKind::Dns
        } else {
            NetworkErrorKind::Refused
        }
    } else if err.is_request() || err.is_body() {
        NetworkErrorKind::Aborted
    } else {
        NetworkErrorKind::Other
    };

    ApiError::Network { kind, message }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
