//! Orchestrated client facade.
//!
//! # Responsibilities
//! - Expose get/post/put/patch/delete over JSON
//! - Coalesce identical concurrent reads
//! - Route every call through queue → breaker → retry → transport
//! - Log admission, dispatch and completion with the request id

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::client::transport::{HttpTransport, Transport};
use crate::client::types::{ApiError, ApiRequest, ApiResult, Method};
use crate::config::schema::ClientConfig;
use crate::dedup::InFlightCache;
use crate::observability::metrics;
use crate::platform::{Platform, PlatformProfile};
use crate::queue::{QueueStats, RequestQueue};
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreaker};
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::DeadlineExceeded;

/// Building blocks for an [`ApiClient`].
///
/// The breaker and queue are explicit objects so several clients (or tests)
/// can share, or deliberately not share, the same fuse and concurrency budget.
pub struct ClientParts<T> {
    pub transport: T,
    pub platform: Platform,
    pub profile: PlatformProfile,
    pub breaker: Arc<CircuitBreaker>,
    pub queue: RequestQueue,
    pub retry: RetryPolicy,
}

impl<T: Transport> ClientParts<T> {
    /// Components derived from `profile`.
    pub fn new(transport: T, platform: Platform, profile: PlatformProfile) -> Self {
        Self {
            transport,
            platform,
            profile,
            breaker: Arc::new(CircuitBreaker::from_profile(&profile)),
            queue: RequestQueue::from_profile(&profile),
            retry: RetryPolicy::from_profile(&profile),
        }
    }
}

pub(crate) struct ClientInner<T> {
    transport: T,
    platform: Platform,
    profile: PlatformProfile,
    breaker: Arc<CircuitBreaker>,
    queue: RequestQueue,
    retry: RetryPolicy,
    reads: InFlightCache<ApiResult<Value>>,
}

/// Resilient JSON API client.
pub struct ApiClient<T = HttpTransport> {
    inner: Arc<ClientInner<T>>,
}

impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ApiClient<HttpTransport> {
    /// Build a reqwest-backed client from validated configuration.
    pub fn from_config(config: &ClientConfig) -> ApiResult<Self> {
        let platform = config.platform();
        let profile = config.resolve_profile();
        let transport = HttpTransport::new(&config.base_url, platform, profile.request_timeout)?;

        tracing::info!(
            base_url = %config.base_url,
            platform = %platform,
            max_concurrent = profile.max_concurrent,
            min_interval_ms = profile.min_interval.as_millis() as u64,
            request_timeout_ms = profile.request_timeout.as_millis() as u64,
            failure_threshold = profile.failure_threshold,
            "API client initialized"
        );

        Ok(Self::new(transport, platform, profile))
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, platform: Platform, profile: PlatformProfile) -> Self {
        Self::from_parts(ClientParts::new(transport, platform, profile))
    }

    pub fn from_parts(parts: ClientParts<T>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport: parts.transport,
                platform: parts.platform,
                profile: parts.profile,
                breaker: parts.breaker,
                queue: parts.queue,
                retry: parts.retry,
                reads: InFlightCache::new(),
            }),
        }
    }

    /// Read; concurrent identical reads share one network call.
    pub async fn get(&self, path: &str) -> ApiResult<Value> {
        self.send(ApiRequest::new(Method::Get, path, None)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<Value> {
        self.send(ApiRequest::new(Method::Post, path, Some(to_json(body)?)))
            .await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<Value> {
        self.send(ApiRequest::new(Method::Put, path, Some(to_json(body)?)))
            .await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<Value> {
        self.send(ApiRequest::new(Method::Patch, path, Some(to_json(body)?)))
            .await
    }

    pub async fn delete(&self, path: &str) -> ApiResult<Value> {
        self.send(ApiRequest::new(Method::Delete, path, None)).await
    }

    pub async fn get_as<R: DeserializeOwned>(&self, path: &str) -> ApiResult<R> {
        from_json(self.get(path).await?)
    }

    pub async fn post_as<B, R>(&self, path: &str, body: &B) -> ApiResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        from_json(self.post(path, body).await?)
    }

    /// Send a prepared request. Reads are deduplicated, writes never are.
    pub async fn send(&self, request: ApiRequest) -> ApiResult<Value> {
        if request.method.is_read() {
            let inner = Arc::clone(&self.inner);
            let key = request.dedup_key();
            self.inner
                .reads
                .deduped(key, move || async move { inner.dispatch(request).await })
                .await
        } else {
            self.inner.dispatch(request).await
        }
    }

    pub(crate) fn inner(&self) -> &ClientInner<T> {
        &self.inner
    }

    pub fn platform(&self) -> Platform {
        self.inner.platform
    }

    pub fn profile(&self) -> &PlatformProfile {
        &self.inner.profile
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.inner.breaker
    }

    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.inner.breaker.snapshot()
    }

    pub fn active_requests(&self) -> usize {
        self.inner.queue.active_requests()
    }

    pub fn waiting_requests(&self) -> usize {
        self.inner.queue.waiting()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.inner.queue.stats()
    }

    /// Reads currently shared by the dedup cache.
    pub fn in_flight_reads(&self) -> usize {
        self.inner.reads.len()
    }
}

impl<T: Transport> ClientInner<T> {
    /// Queue admission → breaker gate → retry loop → transport.
    pub(crate) async fn dispatch(&self, request: ApiRequest) -> ApiResult<Value> {
        let started = Instant::now();
        let request_id = request.request_id;
        let method = request.method;
        let path = request.path.clone();

        tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            platform = %self.platform,
            active = self.queue.active_requests(),
            waiting = self.queue.waiting(),
            "Request submitted"
        );

        let result = self.gated(request).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                tracing::info!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    elapsed_ms,
                    "Request completed"
                );
                metrics::record_request(method.as_str(), "success", started);
            }
            Err(err) => {
                tracing::warn!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    elapsed_ms,
                    status = err.status(),
                    kind = err.kind(),
                    error = %err,
                    "Request failed"
                );
                metrics::record_request(method.as_str(), err.kind(), started);
            }
        }

        result
    }

    /// Fail fast if the circuit is open, then gate again once a slot is
    /// held so callers queued before the circuit opened never reach the
    /// backend.
    async fn gated(&self, request: ApiRequest) -> ApiResult<Value> {
        self.breaker.check()?;

        let outcome = self
            .queue
            .enqueue(move || async move {
                let result = self
                    .breaker
                    .execute_with(move || self.send_with_retry(request), ApiError::trips_breaker)
                    .await;
                Ok::<_, DeadlineExceeded>(result)
            })
            .await;

        match outcome {
            Ok(result) => result,
            Err(deadline) => {
                // The permit was dropped with the task, so count it here
                self.breaker.record_failure();
                Err(deadline.into())
            }
        }
    }

    async fn send_with_retry(&self, request: ApiRequest) -> ApiResult<Value> {
        let label = request.dedup_key();
        self.retry
            .run(&label, |attempt| {
                let mut attempt_request = request.clone();
                attempt_request.attempt = attempt;
                tracing::debug!(
                    request_id = %attempt_request.request_id,
                    attempt,
                    "Dispatching to transport"
                );
                self.transport.send(attempt_request)
            })
            .await
    }
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> ApiResult<Value> {
    serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(format!("unserializable body: {e}")))
}

fn from_json<R: DeserializeOwned>(value: Value) -> ApiResult<R> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}
