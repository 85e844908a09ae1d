//! One key-set cache per endpoint
//!
//! The map lock is only held for map access, never across a fetch. Removing
//! an entry does not disturb resolutions already holding its `Arc`; they finish
//! against the discarded instance while the next `get` builds a fresh one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{HttpKeySetFetcher, KeySetCache, KeySetCacheOptions, KeySetEndpoint, KeySetFetcher};
use crate::error::ConfigError;

/// Memoizes [`KeySetCache`] instances by endpoint.
///
/// Owned and injected explicitly; share it between authenticators with `Arc`.
///
/// # Example
///
/// ```rust,no_run
/// use jwks_auth::{ClientCache, KeySetEndpoint};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let clients = ClientCache::new()?;
/// let endpoint = KeySetEndpoint::parse("https://issuer.example/.well-known/jwks.json")?;
///
/// let cache = clients.get(&endpoint);
/// let key = cache.resolve("key-id-123").await?;
///
/// // Force a fresh fetch on next use
/// clients.invalidate(&endpoint);
/// # Ok(())
/// # }
/// ```
pub struct ClientCache {
    caches: RwLock<HashMap<KeySetEndpoint, Arc<KeySetCache>>>,
    fetcher: Arc<dyn KeySetFetcher>,
    options: KeySetCacheOptions,
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("endpoints", &self.caches.read().keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ClientCache {
    /// Client cache backed by an HTTP fetcher with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self::with_fetcher(
            Arc::new(HttpKeySetFetcher::new()?),
            KeySetCacheOptions::default(),
        ))
    }

    /// Client cache with a custom fetcher and cache options.
    pub fn with_fetcher(fetcher: Arc<dyn KeySetFetcher>, options: KeySetCacheOptions) -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            fetcher,
            options,
        }
    }

    /// Return the cache for `endpoint`, creating it on first use.
    pub fn get(&self, endpoint: &KeySetEndpoint) -> Arc<KeySetCache> {
        if let Some(cache) = self.caches.read().get(endpoint) {
            return Arc::clone(cache);
        }

        let mut caches = self.caches.write();
        let cache = caches.entry(endpoint.clone()).or_insert_with(|| {
            debug!(jwks_uri = %endpoint, "Creating key-set cache");
            Arc::new(KeySetCache::new(
                endpoint.clone(),
                Arc::clone(&self.fetcher),
                self.options,
            ))
        });
        Arc::clone(cache)
    }

    /// Discard the cache for `endpoint`. Returns whether one existed.
    pub fn invalidate(&self, endpoint: &KeySetEndpoint) -> bool {
        let removed = self.caches.write().remove(endpoint).is_some();
        if removed {
            debug!(jwks_uri = %endpoint, "Key-set cache invalidated");
        }
        removed
    }

    /// Discard every cache.
    pub fn invalidate_all(&self) {
        let mut caches = self.caches.write();
        debug!(count = caches.len(), "Invalidating all key-set caches");
        caches.clear();
    }

    /// Whether a cache exists for `endpoint`
    pub fn contains(&self, endpoint: &KeySetEndpoint) -> bool {
        self.caches.read().contains_key(endpoint)
    }

    /// Number of endpoints with a live cache
    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    /// Whether no endpoint has a live cache
    pub fn is_empty(&self) -> bool {
        self.caches.read().is_empty()
    }

    /// Options applied to newly created caches
    pub fn options(&self) -> KeySetCacheOptions {
        self.options
    }
}
