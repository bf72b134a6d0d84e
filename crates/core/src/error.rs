//! Unified error types for stockcache.
//!
//! The error is `Clone` so that every caller sharing a deduplicated query
//! receives the same outcome.

use std::sync::Arc;

use tokio_rusqlite::rusqlite;

use crate::remote::{FailureHint, RemoteError};
use crate::store::EntityClass;

/// Unified error types for the caching layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., an empty user id).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(Arc<tokio_rusqlite::Error>),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A payload could not be encoded or decoded.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),

    /// The backend call failed and no fallback was attempted.
    #[error("REMOTE_ERROR: {0}")]
    Remote(RemoteError),

    /// The backend call failed and nothing was cached for the key.
    #[error("UNAVAILABLE ({hint}): {class} could not be fetched and no cached copy exists: {source}")]
    Unavailable {
        class: EntityClass,
        hint: FailureHint,
        #[source]
        source: RemoteError,
    },

    /// The spawned fetch task was cancelled or panicked.
    #[error("QUERY_ABORTED: {0}")]
    QueryAborted(String),

    /// Cache maintenance was started while an earlier handle is still alive.
    #[error("MAINTENANCE_RUNNING: cache maintenance is already running")]
    MaintenanceRunning,

    /// A query key was read back with a different type than it was cached with.
    #[error("TYPE_MISMATCH: cached value for {0} has a different type")]
    TypeMismatch(String),
}

impl Error {
    /// Whether the coordinator may retry the call that produced this error.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Remote(e) => e.is_transient(),
            Error::Unavailable { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Display classification for the view layer.
    pub fn hint(&self) -> FailureHint {
        match self {
            Error::Unavailable { hint, .. } => *hint,
            Error::Remote(e) => e.hint(true),
            _ => FailureHint::Unknown,
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(Arc::new(tokio_rusqlite::Error::ConnectionClosed)),
            tokio_rusqlite::Error::Close(c) => Error::Database(Arc::new(tokio_rusqlite::Error::Close(c))),
            _ => Error::Database(Arc::new(tokio_rusqlite::Error::ConnectionClosed)),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(Arc::new(err))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(Arc::new(tokio_rusqlite::Error::Error(err)))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        Error::Remote(err)
    }
}
