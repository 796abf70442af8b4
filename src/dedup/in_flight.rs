//! In-flight request map keyed by verb + path.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

type SharedFuture<V> = Shared<BoxFuture<'static, V>>;

struct Pending<V> {
    generation: u64,
    future: WeakShared<BoxFuture<'static, V>>,
}

/// Coalesces concurrent identical requests into one execution.
pub struct InFlightCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pending: Arc<DashMap<String, Pending<V>>>,
    next_generation: AtomicU64,
}

impl<V> InFlightCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Await the pending result for `key`, or start one with `make`.
    ///
    /// Every caller that joins an in-flight request observes the same
    /// outcome, success or failure.
    pub async fn deduped<F, Fut>(&self, key: impl Into<String>, make: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let key = key.into();
        let mut started = false;
        let shared = match self.pending.entry(key.clone()) {
            Entry::Occupied(mut occupied) => match occupied.get().future.upgrade() {
                Some(existing) => {
                    tracing::debug!(key = %key, "Joining in-flight request");
                    metrics::record_dedup_hit();
                    existing
                }
                None => {
                    started = true;
                    let (pending, shared) = self.start(&key, make);
                    match pending {
                        Some(p) => {
                            occupied.insert(p);
                        }
                        None => {
                            occupied.remove();
                        }
                    }
                    shared
                }
            },
            Entry::Vacant(vacant) => {
                started = true;
                let (pending, shared) = self.start(&key, make);
                if let Some(p) = pending {
                    vacant.insert(p);
                }
                shared
            }
        };
        if started {
            self.prune();
        }

        shared.await
    }

    /// Drop entries whose every caller went away before they settled.
    fn prune(&self) {
        self.pending.retain(|_, p| p.future.upgrade().is_some());
    }

    fn start<F, Fut>(&self, key: &str, make: F) -> (Option<Pending<V>>, SharedFuture<V>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let owned_key = key.to_string();
        let fut = make();

        let shared = async move {
            let output = fut.await;
            pending.remove_if(&owned_key, |_, p| p.generation == generation);
            output
        }
        .boxed()
        .shared();

        tracing::debug!(key = %key, generation, "Starting new request");
        let entry = shared.downgrade().map(|future| Pending { generation, future });
        (entry, shared)
    }

    /// Number of keys with a live request.
    pub fn len(&self) -> usize {
        self.pending
            .iter()
            .filter(|e| e.value().future.upgrade().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pending
            .get(key)
            .map(|e| e.value().future.upgrade().is_some())
            .unwrap_or(false)
    }
}

impl<V> Default for InFlightCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
