//! Key-set document retrieval

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error};

use super::KeySetEndpoint;
use crate::error::{ConfigError, FetchError};

/// Default timeout for key-set requests
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Retrieves the raw key-set document for an endpoint.
///
/// The cache only depends on this trait, so tests and hosts with their own
/// transport can plug in another implementation.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Fetch and decode the JSON document at `endpoint`.
    async fn fetch(&self, endpoint: &KeySetEndpoint) -> Result<Value, FetchError>;
}

/// Fetches key-set documents over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    http_client: reqwest::Client,
}

impl HttpKeySetFetcher {
    /// Create a fetcher with the default 10 second timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a fetcher with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the TLS backend cannot be initialized.
    pub fn with_timeout(timeout: Duration) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client })
    }

    /// Wrap an existing client, sharing its connection pool.
    pub fn from_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self, endpoint: &KeySetEndpoint) -> Result<Value, FetchError> {
        debug!(jwks_uri = %endpoint, "Requesting key-set document");

        let response = self
            .http_client
            .get(endpoint.as_str())
            .send()
            .await
            .map_err(|e| {
                error!(jwks_uri = %endpoint, error = %e, "Failed to fetch JWKS");
                FetchError::Http(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(jwks_uri = %endpoint, status = %status, "JWKS endpoint returned error status");
            return Err(FetchError::Status(status.as_u16()));
        }

        response.json::<Value>().await.map_err(|e| {
            error!(jwks_uri = %endpoint, error = %e, "Failed to parse JWKS JSON");
            FetchError::InvalidResponse(e.to_string())
        })
    }
}
