//! In-memory query cache with request deduplication.
//!
//! Each [`QueryKey`] owns a slot holding the last value, when it was
//! fetched, and at most one in-flight fetch. Fetches run as spawned Tokio
//! tasks behind a [`Shared`] future, so every concurrent caller awaits the
//! same call, and a caller that stops waiting does not cancel it: retries
//! run to completion and the result is still cached.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};

use super::key::QueryKey;
use super::retry::RetryPolicy;
use crate::Error;
use crate::clock::Clock;
use crate::store::EntityClass;

type Erased = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<Erased, Error>>>;
type Refetch = Arc<dyn Fn() -> BoxFuture<'static, Result<Erased, Error>> + Send + Sync>;

/// Fixed lifecycle policy of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// How long a fetched value is served without calling the fetcher again.
    pub stale_time: Duration,
    /// How long a value with no observers is retained before eviction.
    pub gc_time: Duration,
    pub retry: RetryPolicy,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            gc_time: Duration::from_secs(10 * 60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Why a revalidation pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevalidateTrigger {
    WindowFocus,
    Remount,
    Reconnect,
}

struct Slot {
    data: Option<Erased>,
    updated_at: Option<DateTime<Utc>>,
    invalidated: bool,
    /// Bumped on every invalidation so a fetch that started earlier does not
    /// mark its result fresh.
    invalidations: u64,
    in_flight: Option<(u64, SharedFetch)>,
    refetch: Option<Refetch>,
    observers: usize,
    inactive_since: Option<DateTime<Utc>>,
}

impl Slot {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            data: None,
            updated_at: None,
            invalidated: false,
            invalidations: 0,
            in_flight: None,
            refetch: None,
            observers: 0,
            inactive_since: Some(now),
        }
    }

    /// Restart the retention window when nobody observes the slot.
    fn touch(&mut self, now: DateTime<Utc>) {
        if self.observers == 0 {
            self.inactive_since = Some(now);
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>, stale_time: Duration) -> bool {
        match self.updated_at {
            Some(at) if self.data.is_some() && !self.invalidated => {
                (now - at).to_std().map(|age| age < stale_time).unwrap_or(true)
            }
            _ => false,
        }
    }
}

struct Inner {
    slots: Mutex<HashMap<QueryKey, Slot>>,
    config: QueryConfig,
    clock: Arc<dyn Clock>,
    next_fetch_id: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the outcome of fetch `fetch_id`, unless the slot was cleared
    /// or a newer fetch replaced it.
    fn settle(&self, key: &QueryKey, fetch_id: u64, generation: u64, result: &Result<Erased, Error>) {
        let now = self.clock.now();
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(key) else {
            tracing::debug!(%key, "query settled after its slot was removed");
            return;
        };
        if !matches!(slot.in_flight, Some((id, _)) if id == fetch_id) {
            return;
        }
        slot.in_flight = None;
        match result {
            Ok(value) => {
                slot.data = Some(Arc::clone(value));
                slot.updated_at = Some(now);
                slot.invalidated = slot.invalidations != generation;
                slot.touch(now);
            }
            Err(e) => tracing::warn!(%key, error = %e, "query fetch failed"),
        }
    }
}

async fn run_with_retry(policy: &RetryPolicy, key: &QueryKey, refetch: &Refetch) -> Result<Erased, Error> {
    let mut attempt = 0;
    loop {
        match refetch().await {
            Ok(value) => return Ok(value),
            Err(err) if policy.should_retry(attempt, &err) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    %key, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err,
                    "query fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Spawn the fetch for `slot` and park its shared handle there.
fn start_fetch(inner: &Arc<Inner>, key: &QueryKey, slot: &mut Slot, refetch: Refetch) -> SharedFetch {
    let fetch_id = inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
    let generation = slot.invalidations;

    let task_inner = Arc::clone(inner);
    let task_key = key.clone();
    let handle = tokio::spawn(async move {
        let result = run_with_retry(&task_inner.config.retry, &task_key, &refetch).await;
        task_inner.settle(&task_key, fetch_id, generation, &result);
        result
    });

    let weak: Weak<Inner> = Arc::downgrade(inner);
    let join_key = key.clone();
    let shared = async move {
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                let err = Error::QueryAborted(e.to_string());
                if let Some(inner) = weak.upgrade() {
                    inner.settle(&join_key, fetch_id, generation, &Err(err.clone()));
                }
                Err(err)
            }
        }
    }
    .boxed()
    .shared();

    slot.in_flight = Some((fetch_id, shared.clone()));
    shared
}

/// In-memory request cache in front of the orchestrator.
#[derive(Clone)]
pub struct QueryCoordinator {
    inner: Arc<Inner>,
}

impl fmt::Debug for QueryCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCoordinator")
            .field("config", &self.inner.config)
            .field("queries", &self.len())
            .finish()
    }
}

impl QueryCoordinator {
    pub fn new(config: QueryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                config,
                clock,
                next_fetch_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    /// Return the cached value for `key` if fresh, otherwise fetch it.
    ///
    /// Callers that arrive while a fetch for `key` is in flight await that
    /// same fetch. Transient failures are retried per the [`RetryPolicy`].
    /// Must be called within a Tokio runtime.
    pub async fn query<T, F, Fut>(&self, key: QueryKey, fetch: F) -> Result<T, Error>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let refetch: Refetch = Arc::new(move || {
            let fut = fetch();
            async move { fut.await.map(|value| Arc::new(value) as Erased) }.boxed()
        });

        let pending = {
            let now = self.inner.clock.now();
            let mut slots = self.inner.lock();
            let slot = slots.entry(key.clone()).or_insert_with(|| Slot::new(now));
            slot.refetch = Some(Arc::clone(&refetch));

            if slot.is_fresh(now, self.inner.config.stale_time)
                && let Some(value) = slot.data.as_ref().and_then(|data| data.downcast_ref::<T>()).cloned()
            {
                slot.touch(now);
                tracing::debug!(%key, "query cache hit");
                return Ok(value);
            }

            match &slot.in_flight {
                Some((_, shared)) => {
                    tracing::debug!(%key, "joining in-flight query");
                    shared.clone()
                }
                None => {
                    tracing::debug!(%key, "query cache miss, fetching");
                    start_fetch(&self.inner, &key, slot, refetch)
                }
            }
        };

        let value = pending.await?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| Error::TypeMismatch(key.to_string()))
    }

    /// Run a command against the backend.
    ///
    /// Nothing is cached and no reads are invalidated; callers follow up with
    /// the matching invalidation.
    pub async fn mutate<T, F, Fut>(&self, command: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let result = command().await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "mutation failed");
        }
        result
    }

    /// Register interest in `key` until the returned observer is dropped.
    ///
    /// A stale cached value is refetched in the background, as on a
    /// component remount. Must be called within a Tokio runtime.
    pub fn observe(&self, key: QueryKey) -> QueryObserver {
        let now = self.inner.clock.now();
        let mut slots = self.inner.lock();
        let slot = slots.entry(key.clone()).or_insert_with(|| Slot::new(now));
        slot.observers += 1;
        slot.inactive_since = None;

        if slot.in_flight.is_none()
            && slot.data.is_some()
            && !slot.is_fresh(now, self.inner.config.stale_time)
            && let Some(refetch) = slot.refetch.clone()
        {
            tracing::debug!(%key, trigger = ?RevalidateTrigger::Remount, "revalidating stale query");
            start_fetch(&self.inner, &key, slot, refetch);
        }
        drop(slots);

        QueryObserver { inner: Arc::downgrade(&self.inner), key }
    }

    /// Refetch every observed query whose value is stale.
    ///
    /// Fresh queries are left alone. Returns the number of fetches started.
    pub fn revalidate(&self, trigger: RevalidateTrigger) -> usize {
        let now = self.inner.clock.now();
        let stale_time = self.inner.config.stale_time;
        let mut slots = self.inner.lock();
        let mut started = 0;
        for (key, slot) in slots.iter_mut() {
            if slot.observers == 0 || slot.in_flight.is_some() || slot.is_fresh(now, stale_time) {
                continue;
            }
            let Some(refetch) = slot.refetch.clone() else {
                continue;
            };
            start_fetch(&self.inner, key, slot, refetch);
            started += 1;
        }
        tracing::debug!(?trigger, started, "revalidated stale queries");
        started
    }

    /// Force every query under `prefix` stale. Nothing is refetched until
    /// the next read. Returns the number of queries marked.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut slots = self.inner.lock();
        let mut marked = 0;
        for (key, slot) in slots.iter_mut() {
            if key.starts_with(prefix) {
                slot.invalidated = true;
                slot.invalidations += 1;
                marked += 1;
            }
        }
        marked
    }

    pub fn invalidate_class(&self, class: EntityClass) -> usize {
        self.invalidate(&QueryKey::for_class(class))
    }

    /// Drop all in-memory state. In-flight fetches finish but are not stored.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Evict unobserved queries whose retention window has elapsed.
    pub fn collect_garbage(&self) -> usize {
        let now = self.inner.clock.now();
        let gc_time = self.inner.config.gc_time;
        let mut slots = self.inner.lock();
        let before = slots.len();
        slots.retain(|_, slot| {
            let expired = slot.observers == 0
                && slot.in_flight.is_none()
                && slot
                    .inactive_since
                    .is_some_and(|since| (now - since).to_std().is_ok_and(|idle| idle >= gc_time));
            !expired
        });
        before - slots.len()
    }

    /// The cached value for `key`, fresh or not.
    pub fn cached<T: Clone + 'static>(&self, key: &QueryKey) -> Option<T> {
        let slots = self.inner.lock();
        slots.get(key)?.data.as_ref()?.downcast_ref::<T>().cloned()
    }

    /// Whether `key` holds a value that would be refetched on the next read.
    ///
    /// `None` when nothing is cached for `key`.
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        let now = self.inner.clock.now();
        let slots = self.inner.lock();
        let slot = slots.get(key)?;
        slot.data.as_ref()?;
        Some(!slot.is_fresh(now, self.inner.config.stale_time))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interest in a query, released on drop.
#[derive(Debug)]
pub struct QueryObserver {
    inner: Weak<Inner>,
    key: QueryKey,
}

impl QueryObserver {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let now = inner.clock.now();
        let mut slots = inner.lock();
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.observers = slot.observers.saturating_sub(1);
            if slot.observers == 0 {
                slot.inactive_since = Some(now);
            }
        }
    }
}
