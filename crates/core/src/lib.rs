//! Offline-first caching layer for stock-trading data.
//!
//! This crate provides:
//! - A persistent SQLite store with per-class expiry and sweeping
//! - Remote-first fetching with offline fallback
//! - An in-memory query coordinator with deduplication and retries
//! - Event-driven invalidation and the [`CacheService`] that ties it together

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod invalidation;
pub mod orchestrator;
pub mod query;
pub mod remote;
pub mod service;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, ConfigError};
pub use connectivity::Connectivity;
pub use error::Error;
pub use invalidation::{InvalidationEvent, RefreshScope};
pub use orchestrator::{Fetched, Orchestrator, Source};
pub use query::{QueryCoordinator, QueryKey, RevalidateTrigger};
pub use remote::{FailureHint, RemoteError, RemoteErrorKind};
pub use service::{CacheService, MaintenanceHandle};
pub use store::{CacheDb, CacheEntry, EntityClass, PersistentStore, StoreKey};
