//! SQLite-backed persistent store for fetched entities.
//!
//! Durable, per-entity-class key-value storage that survives restarts and
//! offline periods. It supports:
//!
//! - Typed composite keys per entity class
//! - Per-class TTL bookkeeping with stale-but-retained entries
//! - Periodic sweeping of expired entries
//! - Automatic schema migrations and WAL mode

pub mod connection;
pub mod entity;
pub mod entries;
pub mod migrations;
pub mod persistent;

pub use connection::CacheDb;
pub use entity::{EntityClass, StoreKey};
pub use entries::StoredRow;
pub use persistent::{CacheEntry, PersistentStore};
