//! HTTP remote for stockcache.
//!
//! This crate provides the backend API client whose failures are reported as
//! [`stockcache_core::RemoteError`], so its calls plug directly into the
//! cache's fallback and retry logic.

pub mod api;

pub use api::{ApiClient, ApiConfig, ClientError};
