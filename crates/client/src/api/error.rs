//! API client error types.

use std::sync::Arc;

use stockcache_core::RemoteError;

/// Errors raised while building an [`ApiClient`](super::ApiClient).
///
/// Request failures are reported as [`RemoteError`] instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Base URL is empty.
    #[error("empty base URL")]
    EmptyBaseUrl,

    /// Base URL scheme is not http or https.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Base URL or request path could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Build(Arc<reqwest::Error>),
}

/// Classify a transport failure.
pub(crate) fn transport_error(err: &reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::timeout(err.to_string())
    } else if err.is_decode() {
        RemoteError::malformed(err.to_string())
    } else {
        RemoteError::network(err.to_string())
    }
}

impl From<ClientError> for RemoteError {
    fn from(err: ClientError) -> Self {
        RemoteError::network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::UnsupportedScheme("ftp".into());
        assert!(err.to_string().contains("ftp"));

        let err = ClientError::InvalidUrl("nope".into());
        assert!(err.to_string().contains("invalid URL"));
    }
}
