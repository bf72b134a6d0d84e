//! Application-level cache context.
//!
//! [`CacheService`] owns the persistent store, orchestrator and query
//! coordinator, and is handed to view-layer callers instead of any global
//! state. [`CacheService::initialize_caching`] starts the background work and
//! returns the handle that stops it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::Error;
use crate::clock::{Clock, SystemClock, today_ist};
use crate::config::CacheConfig;
use crate::connectivity::Connectivity;
use crate::invalidation::{Invalidation, InvalidationEvent, RefreshScope};
use crate::orchestrator::{Fetched, Orchestrator};
use crate::query::{QueryCoordinator, QueryKey, QueryObserver, RevalidateTrigger};
use crate::remote::RemoteError;
use crate::store::{CacheDb, PersistentStore, StoreKey};

/// Cache layer for one application instance.
#[derive(Debug, Clone)]
pub struct CacheService {
    store: PersistentStore,
    orchestrator: Orchestrator,
    queries: QueryCoordinator,
    connectivity: Connectivity,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    maintenance_running: Arc<AtomicBool>,
}

impl CacheService {
    /// Build a service over an open database.
    pub fn new(db: CacheDb, clock: Arc<dyn Clock>, connectivity: Connectivity, config: CacheConfig) -> Self {
        let store = PersistentStore::new(db, Arc::clone(&clock));
        let orchestrator = Orchestrator::new(store.clone(), connectivity.clone());
        let queries = QueryCoordinator::new(config.query_config(), Arc::clone(&clock));
        Self {
            store,
            orchestrator,
            queries,
            connectivity,
            clock,
            config,
            maintenance_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the configured database with the system clock.
    pub async fn open(config: CacheConfig, connectivity: Connectivity) -> Result<Self, Error> {
        let db = CacheDb::open(&config.db_path).await?;
        Ok(Self::new(db, Arc::new(SystemClock), connectivity, config))
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn queries(&self) -> &QueryCoordinator {
        &self.queries
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Start the sweep/GC loop and the reconnect watcher.
    ///
    /// The first sweep runs immediately. Only one handle may exist per
    /// service; it can be started again after the handle is disposed. Must be
    /// called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MaintenanceRunning`] while an earlier handle is alive.
    pub fn initialize_caching(&self) -> Result<MaintenanceHandle, Error> {
        if self.maintenance_running.swap(true, Ordering::SeqCst) {
            return Err(Error::MaintenanceRunning);
        }

        let interval = self.config.sweep_interval();
        let store = self.store.clone();
        let queries = self.queries.clone();
        let maintenance = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.sweep().await;
                let evicted = queries.collect_garbage();
                if evicted > 0 {
                    tracing::debug!(evicted, "evicted idle queries");
                }
            }
        });

        let mut online = self.connectivity.subscribe();
        let queries = self.queries.clone();
        let reconnect = tokio::spawn(async move {
            while online.changed().await.is_ok() {
                if *online.borrow_and_update() {
                    queries.revalidate(RevalidateTrigger::Reconnect);
                }
            }
        });

        tracing::info!(sweep_interval_secs = interval.as_secs(), "cache maintenance started");
        Ok(MaintenanceHandle { tasks: vec![maintenance, reconnect], running: Arc::clone(&self.maintenance_running) })
    }

    /// Refetch stale observed queries after the window regains focus.
    pub fn on_window_focus(&self) -> usize {
        self.queries.revalidate(RevalidateTrigger::WindowFocus)
    }

    /// Register a consumer of `key`; see [`QueryCoordinator::observe`].
    pub fn observe(&self, key: QueryKey) -> QueryObserver {
        self.queries.observe(key)
    }

    async fn cached<T, F, Fut>(&self, store_key: StoreKey, query_key: QueryKey, remote: F) -> Result<Fetched<T>, Error>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        let orchestrator = self.orchestrator.clone();
        let remote = Arc::new(remote);
        let fetched = self
            .queries
            .query(query_key.clone(), move || {
                let orchestrator = orchestrator.clone();
                let store_key = store_key.clone();
                let remote = Arc::clone(&remote);
                async move { orchestrator.fetch_with_fallback(&store_key, || remote()).await }
            })
            .await?;

        // Offline copies must not count as fresh, so reconnect and focus
        // revalidation pick them up.
        if fetched.is_offline() {
            self.queries.invalidate(&query_key);
        }
        Ok(fetched)
    }

    pub async fn get_portfolio_with_cache<T, F, Fut>(&self, user_id: &str, remote: F) -> Result<Fetched<T>, Error>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        require_non_empty("user_id", user_id)?;
        let key = StoreKey::portfolio(user_id);
        self.cached(key.clone(), QueryKey::from(&key), remote).await
    }

    /// Analysis is partitioned by the current IST trading day.
    pub async fn get_analysis_with_cache<T, F, Fut>(
        &self, ticker: &str, user_id: &str, remote: F,
    ) -> Result<Fetched<T>, Error>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        require_non_empty("ticker", ticker)?;
        require_non_empty("user_id", user_id)?;
        let key = StoreKey::analysis(ticker, today_ist(self.clock.as_ref()), user_id);
        self.cached(key.clone(), QueryKey::from(&key), remote).await
    }

    pub async fn get_open_trades_with_cache<T, F, Fut>(&self, user_id: &str, remote: F) -> Result<Fetched<T>, Error>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        require_non_empty("user_id", user_id)?;
        let key = StoreKey::open_trades(user_id);
        self.cached(key.clone(), QueryKey::from(&key), remote).await
    }

    pub async fn get_market_status_with_cache<T, F, Fut>(&self, remote: F) -> Result<Fetched<T>, Error>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        let key = StoreKey::market_status(today_ist(self.clock.as_ref()));
        self.cached(key.clone(), QueryKey::from(&key), remote).await
    }

    /// Index analysis is stored per index and trading day; the in-memory
    /// query is additionally scoped to the user.
    pub async fn get_index_analysis_with_cache<T, F, Fut>(
        &self, index_ticker: &str, user_id: &str, remote: F,
    ) -> Result<Fetched<T>, Error>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        require_non_empty("index_ticker", index_ticker)?;
        let key = StoreKey::index_analysis(index_ticker, today_ist(self.clock.as_ref()));
        self.cached(key.clone(), QueryKey::from(&key).with(user_id), remote).await
    }

    /// Apply the cache effect of `event`. Never fails.
    pub async fn apply(&self, event: InvalidationEvent) {
        match event.invalidation() {
            Invalidation::Nothing => tracing::debug!(?event, "no cache invalidation needed"),
            Invalidation::ClearAll => {
                self.queries.clear();
                self.store.clear(None).await;
                tracing::info!(?event, "cleared all cached data");
            }
            Invalidation::MarkStale(classes) => {
                let marked: usize = classes.iter().map(|class| self.queries.invalidate_class(*class)).sum();
                tracing::info!(?event, ?classes, marked, "invalidated cached queries");
            }
        }
    }

    pub async fn on_login(&self) {
        self.apply(InvalidationEvent::Login).await;
    }

    pub async fn on_logout(&self) {
        self.apply(InvalidationEvent::Logout).await;
    }

    pub async fn on_trade_executed(&self) {
        self.apply(InvalidationEvent::TradeExecuted).await;
    }

    pub async fn on_portfolio_updated(&self) {
        self.apply(InvalidationEvent::PortfolioUpdated).await;
    }

    pub async fn on_settings_updated(&self) {
        self.apply(InvalidationEvent::SettingsUpdated).await;
    }

    pub async fn on_manual_refresh(&self, scope: RefreshScope) {
        self.apply(InvalidationEvent::ManualRefresh(scope)).await;
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Background tasks started by [`CacheService::initialize_caching`].
///
/// Dropping the handle stops them as well.
#[must_use = "dropping the handle stops cache maintenance"]
#[derive(Debug)]
pub struct MaintenanceHandle {
    tasks: Vec<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl MaintenanceHandle {
    /// Stop the sweep loop and the reconnect watcher.
    pub fn dispose(self) {
        drop(self);
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::AtomicUsize;

    async fn service() -> (CacheService, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 2, 4, 0, 0).unwrap());
        let db = CacheDb::open_in_memory().await.unwrap();
        let svc = CacheService::new(db, Arc::new(clock.clone()), Connectivity::new(true), CacheConfig::default());
        (svc, clock)
    }

    #[tokio::test]
    async fn test_empty_user_id_is_rejected() {
        let (svc, _clock) = service().await;
        let err = svc
            .get_portfolio_with_cache("  ", || async { Ok::<_, RemoteError>(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_market_status_keyed_by_ist_date() {
        let (svc, clock) = service().await;
        svc.get_market_status_with_cache(|| async { Ok::<_, RemoteError>(serde_json::json!({"isHoliday": false})) })
            .await
            .unwrap();

        let key = StoreKey::market_status(today_ist(&clock));
        assert!(svc.store().get::<serde_json::Value>(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_manual_refresh_marks_requested_classes() {
        let (svc, _clock) = service().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let remote = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, RemoteError>(5) }
        };

        svc.get_open_trades_with_cache("u1", remote.clone()).await.unwrap();
        svc.on_manual_refresh(RefreshScope::from_names(["openTrades"])).await;
        svc.get_open_trades_with_cache("u1", remote).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_sweeps_and_stops_on_dispose() {
        let (svc, clock) = service().await;
        let key = StoreKey::portfolio("u1");
        svc.store().put(&key, &1).await;
        clock.advance(Duration::minutes(6));

        let handle = svc.initialize_caching().unwrap();
        assert!(handle.is_running());
        for _ in 0..20 {
            if svc.store().get::<i32>(&key).await.is_none() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
        assert!(svc.store().get::<i32>(&key).await.is_none());

        handle.dispose();
        svc.store().put(&key, &2).await;
        clock.advance(Duration::minutes(6));
        tokio::time::sleep(std::time::Duration::from_secs(600)).await;
        assert!(svc.store().get::<i32>(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_maintenance_starts_once_per_service() {
        let (svc, _clock) = service().await;

        let handle = svc.initialize_caching().unwrap();
        assert!(matches!(svc.clone().initialize_caching(), Err(Error::MaintenanceRunning)));

        handle.dispose();
        let restarted = svc.initialize_caching().unwrap();
        assert!(restarted.is_running());
    }

    #[tokio::test]
    async fn test_offline_result_stays_stale_in_memory() {
        let (svc, _clock) = service().await;
        let key = StoreKey::portfolio("u1");
        svc.store().put(&key, &serde_json::json!({"cash": 1})).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let remote = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<serde_json::Value, _>(RemoteError::network("offline")) }
        };

        let _observer = svc.observe(QueryKey::from(&key));
        let fetched = svc.get_portfolio_with_cache("u1", remote).await.unwrap();
        assert!(fetched.is_offline());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(svc.queries().is_stale(&QueryKey::from(&key)), Some(true));

        assert_eq!(svc.queries().revalidate(RevalidateTrigger::Reconnect), 1);
    }

    #[tokio::test]
    async fn test_logout_during_fetch_leaves_store_empty() {
        let (svc, _clock) = service().await;
        let slow = || async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok::<_, RemoteError>(serde_json::json!({"cash": 100}))
        };

        let (fetched, ()) = tokio::join!(svc.get_portfolio_with_cache("u1", slow), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            svc.on_logout().await;
        });

        assert!(!fetched.unwrap().is_offline());
        assert!(svc.store().get::<serde_json::Value>(&StoreKey::portfolio("u1")).await.is_none());
    }
}
