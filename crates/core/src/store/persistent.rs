//! Never-fail store contract over [`CacheDb`].
//!
//! Storage problems are reported as `tracing` events and degrade to "no
//! entry" / "not written". A degraded cache must never block the caller
//! from the data it just fetched.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::connection::CacheDb;
use super::entity::{EntityClass, StoreKey};
use crate::clock::Clock;

/// A typed record read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: StoreKey,
    pub payload: T,
    pub written_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// `expires_at < now` at the time of the read.
    pub stale: bool,
}

/// Keyed, typed record store with per-class TTLs.
#[derive(Debug, Clone)]
pub struct PersistentStore {
    db: CacheDb,
    clock: Arc<dyn Clock>,
    /// Bumped by every `clear`; shared by clones.
    generation: Arc<AtomicU64>,
}

impl PersistentStore {
    pub fn new(db: CacheDb, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock, generation: Arc::new(AtomicU64::new(0)) }
    }

    /// Current clear generation, to be passed to [`put_since`](Self::put_since).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    /// Write `value` under `key`, stamping `written_at = now`.
    ///
    /// Failures are logged and swallowed.
    pub async fn put<T: Serialize>(&self, key: &StoreKey, value: &T) {
        self.put_since(self.generation(), key, value).await;
    }

    /// Write `value` unless the store was cleared after `generation` was read.
    ///
    /// A fetch that started before a logout must not repopulate the store.
    pub async fn put_since<T: Serialize>(&self, generation: u64, key: &StoreKey, value: &T) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(class = %key.class(), key = %key.encode(), error = %e, "failed to encode cache payload");
                return;
            }
        };

        let current = Arc::clone(&self.generation);
        let keep = move || current.load(Ordering::SeqCst) == generation;
        match self.db.put_entry_if(key, payload, self.clock.now(), keep).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(class = %key.class(), key = %key.encode(), "store cleared during fetch, dropping write");
            }
            Err(e) => {
                tracing::warn!(class = %key.class(), key = %key.encode(), error = %e, "failed to persist cache entry");
            }
        }
    }

    /// Read the entry under `key` with its staleness computed against now.
    ///
    /// Absent, unreadable and undecodable entries all come back as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &StoreKey) -> Option<CacheEntry<T>> {
        let row = match self.db.get_entry(key).await {
            Ok(row) => row?,
            Err(e) => {
                tracing::warn!(class = %key.class(), key = %key.encode(), error = %e, "failed to read cache entry");
                return None;
            }
        };

        let payload = match serde_json::from_str(&row.payload_json) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(class = %key.class(), key = %key.encode(), error = %e, "failed to decode cache payload");
                return None;
            }
        };

        let stale = row.is_stale_at(self.clock.now());
        Some(CacheEntry { key: key.clone(), payload, written_at: row.written_at, expires_at: row.expires_at, stale })
    }

    /// Delete expired entries in every class.
    ///
    /// Each class is purged independently; a failure is logged and the
    /// remaining classes are still swept. Returns the number removed.
    pub async fn sweep(&self) -> u64 {
        let now = self.clock.now();
        let mut removed = 0;
        for class in EntityClass::ALL {
            match self.db.purge_expired(class, now).await {
                Ok(count) => {
                    if count > 0 {
                        tracing::debug!(%class, count, "swept expired cache entries");
                    }
                    removed += count;
                }
                Err(e) => tracing::warn!(%class, error = %e, "cache sweep failed"),
            }
        }
        tracing::info!(removed, "cache sweep finished");
        removed
    }

    /// Delete every entry of `class`, or everything when `None`.
    ///
    /// Writes started before the clear are dropped.
    pub async fn clear(&self, class: Option<EntityClass>) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        match self.db.clear_class(class).await {
            Ok(count) => tracing::info!(class = ?class, count, "cleared persistent cache"),
            Err(e) => tracing::warn!(class = ?class, error = %e, "failed to clear persistent cache"),
        }
    }
}
