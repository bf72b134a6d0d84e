//! Remote-first fetch with persistent-store fallback.
//!
//! The caller always gets fresh remote data when the backend answers. Only
//! when the remote call fails is the last stored value returned, tagged as
//! coming from the offline cache. When neither exists the original remote
//! error is surfaced.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Error;
use crate::connectivity::Connectivity;
use crate::remote::RemoteError;
use crate::store::{PersistentStore, StoreKey};

/// Where a returned payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Remote,
    OfflineCache { is_stale: bool, written_at: DateTime<Utc> },
}

/// A payload plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub source: Source,
}

impl<T> Fetched<T> {
    pub fn remote(data: T) -> Self {
        Self { data, source: Source::Remote }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.source, Source::OfflineCache { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self.source, Source::OfflineCache { is_stale: true, .. })
    }

    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T: Serialize> Fetched<T> {
    /// JSON form handed to the view layer.
    ///
    /// Offline payloads that serialize to an object get `_source:
    /// "offline_cache"` and `_isStale` attached; anything else is returned
    /// as-is.
    pub fn annotated_json(&self) -> Result<serde_json::Value, Error> {
        let mut value = serde_json::to_value(&self.data)?;
        if let Source::OfflineCache { is_stale, .. } = self.source
            && let Some(object) = value.as_object_mut()
        {
            object.insert("_source".into(), serde_json::Value::from("offline_cache"));
            object.insert("_isStale".into(), serde_json::Value::from(is_stale));
        }
        Ok(value)
    }
}

/// Wraps remote calls with write-through and read-on-failure.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    store: PersistentStore,
    connectivity: Connectivity,
}

impl Orchestrator {
    pub fn new(store: PersistentStore, connectivity: Connectivity) -> Self {
        Self { store, connectivity }
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    /// Call `remote`, persisting on success and falling back to the store on
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] carrying the original remote error when
    /// the call fails and nothing is stored under `key`.
    pub async fn fetch_with_fallback<T, F, Fut>(&self, key: &StoreKey, remote: F) -> Result<Fetched<T>, Error>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let class = key.class();
        let generation = self.store.generation();
        match remote().await {
            Ok(data) => {
                self.store.put_since(generation, key, &data).await;
                Ok(Fetched::remote(data))
            }
            Err(err) => {
                let online = self.connectivity.is_online();
                match self.store.get::<T>(key).await {
                    Some(entry) => {
                        tracing::warn!(
                            %class, key = %key.encode(), online, stale = entry.stale, error = %err,
                            "remote fetch failed, serving offline cache"
                        );
                        Ok(Fetched {
                            data: entry.payload,
                            source: Source::OfflineCache { is_stale: entry.stale, written_at: entry.written_at },
                        })
                    }
                    None => {
                        tracing::warn!(
                            %class, key = %key.encode(), online, error = %err,
                            "remote fetch failed with no cached fallback"
                        );
                        Err(Error::Unavailable { class, hint: err.hint(online), source: err })
                    }
                }
            }
        }
    }
}
