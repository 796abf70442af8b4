//! FIFO request queue with a concurrency cap and dispatch spacing.
//!
//! # Responsibilities
//! - Keep at most `max_concurrent` tasks executing
//! - Space dispatch start times by at least `min_interval`
//! - Bound each task by `request_timeout`
//! - Re-scan the wait list once per completion

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::platform::PlatformProfile;
use crate::resilience::timeouts::{with_deadline, DeadlineExceeded};

/// A caller waiting for a slot.
#[derive(Debug)]
struct QueueEntry {
    id: u64,
    enqueued_at: Instant,
    admit: oneshot::Sender<Admission>,
}

/// Handed to a waiter when it leaves the wait list.
#[derive(Debug)]
struct Admission {
    slot: Slot,
    start_at: Instant,
}

/// One unit of concurrency. Dropping it frees the slot and re-scans the queue.
#[derive(Debug)]
struct Slot {
    shared: Arc<Shared>,
    id: u64,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.shared.release(self.id);
    }
}

#[derive(Debug, Default)]
struct QueueState {
    active: usize,
    waiting: VecDeque<QueueEntry>,
    /// Start instant handed to the most recently admitted waiter.
    last_reserved: Option<Instant>,
    /// When the most recent task actually started.
    last_started: Option<Instant>,
}

#[derive(Debug)]
struct Shared {
    max_concurrent: usize,
    min_interval: Duration,
    request_timeout: Duration,
    next_id: AtomicU64,
    state: Mutex<QueueState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().expect("request queue mutex poisoned")
    }

    /// Start as many head-of-line waiters as capacity allows.
    fn admit(self: &Arc<Self>) {
        let mut undelivered = Vec::new();
        {
            let mut state = self.lock();
            while state.active < self.max_concurrent {
                let Some(entry) = state.waiting.pop_front() else {
                    break;
                };
                if entry.admit.is_closed() {
                    tracing::debug!(id = entry.id, "Skipping abandoned queue entry");
                    continue;
                }

                let now = Instant::now();
                let start_at = match state.last_reserved {
                    Some(prev) => (prev + self.min_interval).max(now),
                    None => now,
                };
                state.last_reserved = Some(start_at);
                state.active += 1;

                tracing::debug!(
                    id = entry.id,
                    active = state.active,
                    waiting = state.waiting.len(),
                    queued_ms = entry.enqueued_at.elapsed().as_millis() as u64,
                    delay_ms = start_at.saturating_duration_since(now).as_millis() as u64,
                    "Request admitted"
                );

                let admission = Admission {
                    slot: Slot {
                        shared: Arc::clone(self),
                        id: entry.id,
                    },
                    start_at,
                };
                if let Err(admission) = entry.admit.send(admission) {
                    undelivered.push(admission);
                }
            }
            metrics::record_queue_depth(state.active, state.waiting.len());
        }
        // Released outside the lock; each drop re-runs admission.
        drop(undelivered);
    }

    fn release(self: &Arc<Self>, id: u64) {
        {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
            tracing::debug!(
                id,
                active = state.active,
                waiting = state.waiting.len(),
                "Slot released"
            );
        }
        self.admit();
    }

    /// Sleep until `start_at`, then until `min_interval` has passed since
    /// the previous task actually started.
    async fn wait_for_dispatch(&self, mut start_at: Instant) {
        loop {
            tokio::time::sleep_until(start_at).await;

            let earliest = {
                let mut state = self.lock();
                let now = Instant::now();
                match state.last_started.map(|prev| prev + self.min_interval) {
                    Some(earliest) if now < earliest => earliest,
                    _ => {
                        state.last_started = Some(now);
                        return;
                    }
                }
            };
            start_at = earliest;
        }
    }
}

/// Snapshot of queue occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub active: usize,
    pub waiting: usize,
    pub max_concurrent: usize,
}

/// Admission-controlled executor for outbound requests.
///
/// Cloning is cheap and every clone shares the same slots.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    shared: Arc<Shared>,
}

impl RequestQueue {
    pub fn new(max_concurrent: usize, min_interval: Duration, request_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                max_concurrent: max_concurrent.max(1),
                min_interval,
                request_timeout,
                next_id: AtomicU64::new(1),
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    pub fn from_profile(profile: &PlatformProfile) -> Self {
        Self::new(
            profile.max_concurrent,
            profile.min_interval,
            profile.request_timeout,
        )
    }

    pub fn max_concurrent(&self) -> usize {
        self.shared.max_concurrent
    }

    pub fn active_requests(&self) -> usize {
        self.shared.lock().active
    }

    /// Callers still waiting for a slot.
    pub fn waiting(&self) -> usize {
        self.shared
            .lock()
            .waiting
            .iter()
            .filter(|e| !e.admit.is_closed())
            .count()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.shared.lock();
        QueueStats {
            active: state.active,
            waiting: state.waiting.iter().filter(|e| !e.admit.is_closed()).count(),
            max_concurrent: self.shared.max_concurrent,
        }
    }

    /// Run `task` once a slot is free, bounded by the request timeout.
    ///
    /// The timeout covers the task only, not the time spent waiting for a
    /// slot. On expiry the task future is dropped and the caller receives
    /// the error produced from [`DeadlineExceeded`].
    pub async fn enqueue<T, E, F, Fut>(&self, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DeadlineExceeded>,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let enqueued_at = Instant::now();

        {
            let mut state = self.shared.lock();
            state.waiting.push_back(QueueEntry {
                id,
                enqueued_at,
                admit: tx,
            });
            tracing::debug!(
                id,
                active = state.active,
                waiting = state.waiting.len(),
                max_concurrent = self.shared.max_concurrent,
                "Request enqueued"
            );
        }
        self.shared.admit();

        // The entry only leaves the wait list through admit(), which either
        // delivers a slot or finds this receiver already dropped.
        let Admission { slot, start_at } = rx
            .await
            .expect("request queue dropped a waiter without admitting it");
        self.shared.wait_for_dispatch(start_at).await;

        tracing::debug!(
            id,
            waited_ms = enqueued_at.elapsed().as_millis() as u64,
            "Dispatching request"
        );

        let started = Instant::now();
        let outcome = with_deadline(self.shared.request_timeout, task()).await;
        drop(slot);

        match outcome {
            Ok(result) => {
                tracing::debug!(
                    id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    success = result.is_ok(),
                    "Request settled"
                );
                result
            }
            Err(deadline) => {
                tracing::warn!(
                    id,
                    timeout_ms = deadline.after.as_millis() as u64,
                    "Request timed out, slot released"
                );
                Err(deadline.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::types::ApiError;
    use futures_util::future::join_all;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_max_concurrent_never_exceeded() {
        let queue = RequestQueue::new(3, Duration::ZERO, Duration::from_secs(5));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..12).map(|i| {
            let queue = queue.clone();
            let current = current.clone();
            let peak = peak.clone();
            async move {
                queue
                    .enqueue(|| async {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10 + (i % 4) * 5)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, ApiError>(i)
                    })
                    .await
            }
        });

        let results = join_all(tasks).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(queue.active_requests(), 0);
        assert_eq!(queue.waiting(), 0);
    }

    #[tokio::test]
    async fn test_serial_queue_is_fifo() {
        let queue = RequestQueue::new(1, Duration::ZERO, Duration::from_secs(5));
        let order = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let tasks = (0..5).map(|i| {
            let queue = queue.clone();
            let order = order.clone();
            async move {
                queue
                    .enqueue(|| async {
                        order.lock().unwrap().push(i);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, ApiError>(i)
                    })
                    .await
            }
        });

        let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

        assert!(start.elapsed() >= Duration::from_millis(250));
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_dispatch_spacing_with_free_slots() {
        let interval = Duration::from_millis(40);
        let queue = RequestQueue::new(4, interval, Duration::from_secs(5));
        let starts = Arc::new(Mutex::new(Vec::new()));

        let tasks = (0..4).map(|_| {
            let queue = queue.clone();
            let starts = starts.clone();
            async move {
                queue
                    .enqueue(|| async {
                        starts.lock().unwrap().push(Instant::now());
                        Ok::<_, ApiError>(())
                    })
                    .await
            }
        });
        join_all(tasks).await;

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 4);
        for pair in starts.windows(2) {
            // clock read inside the task trails the dispatch instant slightly
            assert!(pair[1] - pair[0] + Duration::from_millis(1) >= interval);
        }
    }

    #[tokio::test]
    async fn test_timeout_frees_slot() {
        let queue = RequestQueue::new(1, Duration::ZERO, Duration::from_millis(30));

        let slow = queue.enqueue(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ApiError>("slow")
        });
        let fast = queue.enqueue(|| async { Ok::<_, ApiError>("fast") });

        let (slow, fast) = tokio::join!(slow, fast);
        assert!(matches!(slow, Err(ApiError::Timeout { .. })));
        assert_eq!(fast.unwrap(), "fast");
        assert_eq!(queue.active_requests(), 0);
    }

    #[tokio::test]
    async fn test_task_error_propagates() {
        let queue = RequestQueue::new(2, Duration::ZERO, Duration::from_secs(1));
        let result: Result<(), ApiError> = queue
            .enqueue(|| async { Err(ApiError::Status { status: 400, body: None }) })
            .await;
        assert!(matches!(result, Err(ApiError::Status { status: 400, .. })));
        assert_eq!(queue.active_requests(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_leak_slot() {
        let queue = RequestQueue::new(1, Duration::ZERO, Duration::from_secs(5));

        let holder = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .enqueue(|| async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, ApiError>(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        let abandoned = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .enqueue(|| async { Ok::<_, ApiError>(()) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(queue.waiting(), 1);
        abandoned.abort();
        let _ = abandoned.await;
        assert_eq!(queue.waiting(), 0);

        holder.await.unwrap().unwrap();

        let result = queue.enqueue(|| async { Ok::<_, ApiError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(queue.active_requests(), 0);
    }
}
