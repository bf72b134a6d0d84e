//! Backend API client.
//!
//! Every request failure is mapped onto [`RemoteError`] so that callers can
//! hand these calls straight to the cache:
//!
//! - Transport failures become `Network`, timeouts become `Timeout`
//! - Non-2xx responses become `Status(code)`
//! - Bodies that are not the expected JSON become `Malformed`

pub mod error;
pub mod url;

pub use error::ClientError;

use std::time::{Duration, Instant};

use reqwest::header;
use serde::Serialize;
use serde::de::DeserializeOwned;
use stockcache_core::{CacheConfig, RemoteError};

use error::transport_error;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "stockcache/0.1";

/// Longest error body excerpt kept in a status error message.
const MAX_ERROR_BODY: usize = 200;

/// API client configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    /// Request timeout (default: 20s).
    pub timeout: Duration,
    pub user_agent: String,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), timeout: DEFAULT_TIMEOUT, user_agent: DEFAULT_USER_AGENT.to_string() }
    }

    /// Take the backend settings from the cache configuration.
    pub fn from_cache_config(config: &CacheConfig) -> Result<Self, ClientError> {
        let base_url = config.api_base_url.clone().ok_or(ClientError::EmptyBaseUrl)?;
        Ok(Self { base_url, timeout: config.timeout(), user_agent: config.user_agent.clone() })
    }
}

/// JSON client for the trading backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: ::url::Url,
    user_agent: String,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ClientError> {
        let base = url::parse_base(&config.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Build(std::sync::Arc::new(e)))?;

        Ok(Self { http, base, user_agent: config.user_agent })
    }

    pub fn base_url(&self) -> &::url::Url {
        &self.base
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        let url = url::endpoint(&self.base, path)?;
        let request = self.http.get(url.clone());
        self.send(request, &url).await
    }

    /// POST `body` as JSON to `path` and decode the JSON reply.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self, path: &str, body: &B,
    ) -> Result<T, RemoteError> {
        let url = url::endpoint(&self.base, path)?;
        let request = self.http.post(url.clone()).json(body);
        self.send(request, &url).await
    }

    async fn send<T: DeserializeOwned>(
        &self, request: reqwest::RequestBuilder, url: &::url::Url,
    ) -> Result<T, RemoteError> {
        let start = Instant::now();
        tracing::debug!(%url, "calling backend");

        let response = request
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| transport_error(&e))?;
        tracing::debug!(%url, status = status.as_u16(), elapsed_ms = start.elapsed().as_millis() as u64, "backend responded");

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
            let message = if excerpt.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                excerpt
            };
            return Err(RemoteError::status(status.as_u16(), message));
        }

        serde_json::from_slice(&bytes).map_err(|e| RemoteError::malformed(e.to_string()))
    }
}
