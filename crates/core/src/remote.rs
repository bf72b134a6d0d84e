//! Errors reported by the backend API collaborator.
//!
//! Remote functions handed to the cache return `Result<T, RemoteError>`.
//! The kind decides whether a failure is retried, and together with the
//! connectivity signal it yields the [`FailureHint`] shown to users.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What went wrong when calling the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteErrorKind {
    /// Connection could not be established or was dropped.
    Network,
    /// The request did not complete in time.
    Timeout,
    /// The backend answered with a non-2xx status.
    Status(u16),
    /// The body could not be decoded.
    Malformed,
}

/// Structured failure of a remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Timeout, message)
    }

    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Status(code), message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Malformed, message)
    }

    /// HTTP status code, if the backend answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self.kind {
            RemoteErrorKind::Status(code) => Some(code),
            _ => None,
        }
    }

    /// Network errors, timeouts and 5xx responses are worth retrying.
    /// 4xx and undecodable bodies are not.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            RemoteErrorKind::Network | RemoteErrorKind::Timeout => true,
            RemoteErrorKind::Status(code) => code >= 500,
            RemoteErrorKind::Malformed => false,
        }
    }

    /// Classify this failure for display.
    ///
    /// `online` is the host's connectivity signal at the time of failure.
    pub fn hint(&self, online: bool) -> FailureHint {
        if !online {
            return FailureHint::Offline;
        }
        match self.kind {
            RemoteErrorKind::Network | RemoteErrorKind::Timeout => FailureHint::Offline,
            RemoteErrorKind::Status(404) => FailureHint::NotFound,
            RemoteErrorKind::Status(401 | 403) => FailureHint::Unauthorized,
            RemoteErrorKind::Status(code) if code >= 500 => FailureHint::ServerError,
            _ => FailureHint::Unknown,
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteErrorKind::Network => f.write_str("network error"),
            RemoteErrorKind::Timeout => f.write_str("timeout"),
            RemoteErrorKind::Status(code) => write!(f, "status {code}"),
            RemoteErrorKind::Malformed => f.write_str("malformed response"),
        }
    }
}

/// User-facing classification of a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureHint {
    Offline,
    NotFound,
    Unauthorized,
    ServerError,
    Unknown,
}

impl FailureHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureHint::Offline => "offline",
            FailureHint::NotFound => "not_found",
            FailureHint::Unauthorized => "unauthorized",
            FailureHint::ServerError => "server_error",
            FailureHint::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(RemoteError::network("reset").is_transient());
        assert!(RemoteError::timeout("slow").is_transient());
        assert!(RemoteError::status(500, "").is_transient());
        assert!(RemoteError::status(503, "").is_transient());
        assert!(!RemoteError::status(400, "").is_transient());
        assert!(!RemoteError::status(404, "").is_transient());
        assert!(!RemoteError::malformed("eof").is_transient());
    }

    #[test]
    fn test_hint_when_offline_overrides_status() {
        assert_eq!(RemoteError::status(500, "").hint(false), FailureHint::Offline);
    }

    #[test]
    fn test_hint_when_online() {
        assert_eq!(RemoteError::network("dns").hint(true), FailureHint::Offline);
        assert_eq!(RemoteError::status(404, "").hint(true), FailureHint::NotFound);
        assert_eq!(RemoteError::status(401, "").hint(true), FailureHint::Unauthorized);
        assert_eq!(RemoteError::status(403, "").hint(true), FailureHint::Unauthorized);
        assert_eq!(RemoteError::status(502, "").hint(true), FailureHint::ServerError);
        assert_eq!(RemoteError::status(418, "").hint(true), FailureHint::Unknown);
        assert_eq!(RemoteError::malformed("x").hint(true), FailureHint::Unknown);
    }

    #[test]
    fn test_display() {
        let err = RemoteError::status(503, "maintenance");
        assert_eq!(err.to_string(), "status 503: maintenance");
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(RemoteError::network("x").status_code(), None);
    }
}
