//! Per-endpoint key-set snapshot with rotation handling
//!
//! Readers load the current `Arc<KeySet>` without locking. A fetch always
//! builds a complete new set and swaps it in, so nobody ever sees a partially
//! updated snapshot. Fetches for one cache are serialized by an async mutex;
//! a caller that waited on it reuses a snapshot another caller just stored
//! instead of fetching again.
//!
//! When a stale snapshot cannot be refreshed it keeps serving, and the next
//! attempt waits for `refetch_cooldown` (or `max_age` without one).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{KeySet, KeySetEndpoint, KeySetFetcher, SigningKey};
use crate::auth_metrics as metrics;
use crate::error::KeyResolutionError;

/// Tuning for [`KeySetCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeySetCacheOptions {
    /// Re-fetch a snapshot older than this before using it. `None` keeps a
    /// snapshot until it is replaced by a rotation re-fetch or invalidated.
    pub max_age: Option<Duration>,

    /// Minimum snapshot age before an unknown `kid` may trigger a re-fetch.
    /// `None` always allows the single rotation re-fetch.
    pub refetch_cooldown: Option<Duration>,
}

/// Cached key set for a single endpoint.
pub struct KeySetCache {
    endpoint: KeySetEndpoint,
    fetcher: Arc<dyn KeySetFetcher>,
    options: KeySetCacheOptions,
    snapshot: ArcSwapOption<KeySet>,
    refresh_lock: Mutex<()>,
    failed_refresh_at: parking_lot::Mutex<Option<Instant>>,
    fetch_count: AtomicU64,
}

impl std::fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetCache")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .field("cached_keys", &self.snapshot.load_full().map(|s| s.len()))
            .field("fetch_count", &self.fetch_count())
            .finish_non_exhaustive()
    }
}

impl KeySetCache {
    /// Create an empty cache. Nothing is fetched until the first [`resolve`](Self::resolve).
    pub fn new(
        endpoint: KeySetEndpoint,
        fetcher: Arc<dyn KeySetFetcher>,
        options: KeySetCacheOptions,
    ) -> Self {
        Self {
            endpoint,
            fetcher,
            options,
            snapshot: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            failed_refresh_at: parking_lot::Mutex::new(None),
            fetch_count: AtomicU64::new(0),
        }
    }

    /// Resolve a key identifier to a verification key.
    ///
    /// Fetches the key set on first use (or when the snapshot exceeded
    /// `max_age`). An unknown identifier triggers exactly one re-fetch to pick
    /// up rotated keys; a second miss is final.
    ///
    /// # Errors
    ///
    /// - [`KeyResolutionError::MissingKey`] if `kid` is unknown after the re-fetch
    /// - [`KeyResolutionError::Fetch`] / [`KeyResolutionError::Parse`] if the key
    ///   set could not be retrieved; the previous snapshot stays in place
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, KeyResolutionError> {
        let current = self.current().await?;
        if let Some(key) = current.find(kid) {
            return Ok(Arc::clone(key));
        }

        if let Some(cooldown) = self.options.refetch_cooldown
            && age(&current) < cooldown
        {
            debug!(
                jwks_uri = %self.endpoint,
                kid,
                "Unknown kid within refetch cooldown, not re-fetching"
            );
            return Err(KeyResolutionError::MissingKey {
                kid: kid.to_string(),
            });
        }

        debug!(jwks_uri = %self.endpoint, kid, "Unknown kid, re-fetching key set");
        let refreshed = self.refresh(Some(&current)).await?;
        refreshed
            .find(kid)
            .cloned()
            .ok_or_else(|| KeyResolutionError::MissingKey {
                kid: kid.to_string(),
            })
    }

    /// Current usable snapshot, fetching first if there is none or it is stale.
    async fn current(&self) -> Result<Arc<KeySet>, KeyResolutionError> {
        match self.snapshot.load_full() {
            Some(set) if !self.is_stale(&set) => Ok(set),
            Some(stale) if self.retry_pending() => Ok(stale),
            Some(stale) => match self.refresh(Some(&stale)).await {
                Ok(set) => Ok(set),
                Err(e) => {
                    *self.failed_refresh_at.lock() = Some(Instant::now());
                    warn!(
                        jwks_uri = %self.endpoint,
                        error = %e,
                        "Key-set refresh failed, keeping previous snapshot"
                    );
                    Ok(stale)
                }
            },
            None => self.refresh(None).await,
        }
    }

    /// Fetch a new snapshot unless another caller already replaced `previous`.
    async fn refresh(
        &self,
        previous: Option<&Arc<KeySet>>,
    ) -> Result<Arc<KeySet>, KeyResolutionError> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.snapshot.load_full() {
            let replaced = previous.is_none_or(|prev| !Arc::ptr_eq(prev, &current));
            if replaced && !self.is_stale(&current) {
                debug!(jwks_uri = %self.endpoint, "Reusing key set fetched by a concurrent caller");
                return Ok(current);
            }
        }

        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        info!(jwks_uri = %self.endpoint, "Fetching JWKS from endpoint");

        let result = match self.fetcher.fetch(&self.endpoint).await {
            Ok(document) => KeySet::from_document(&document).map_err(KeyResolutionError::from),
            Err(e) => Err(e.into()),
        };
        metrics::record_key_set_fetch(result.is_ok());

        let set = Arc::new(result?);
        info!(
            jwks_uri = %self.endpoint,
            key_count = set.len(),
            "Successfully fetched JWKS"
        );
        self.snapshot.store(Some(Arc::clone(&set)));
        *self.failed_refresh_at.lock() = None;
        Ok(set)
    }

    /// A stale refresh failed recently enough that the stale snapshot is
    /// served without another attempt.
    fn retry_pending(&self) -> bool {
        let Some(retry_after) = self.options.refetch_cooldown.or(self.options.max_age) else {
            return false;
        };
        self.failed_refresh_at
            .lock()
            .is_some_and(|failed_at| failed_at.elapsed() < retry_after)
    }

    fn is_stale(&self, set: &KeySet) -> bool {
        self.options
            .max_age
            .is_some_and(|max_age| age(set) >= max_age)
    }

    /// The endpoint this cache fetches from
    pub fn endpoint(&self) -> &KeySetEndpoint {
        &self.endpoint
    }

    /// The current snapshot, if any, without fetching.
    pub fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.snapshot.load_full()
    }

    /// Number of fetch attempts made so far (successful or not).
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    /// Drop the snapshot. The next resolve fetches anew.
    pub fn clear(&self) {
        self.snapshot.store(None);
        debug!(jwks_uri = %self.endpoint, "Key-set snapshot cleared");
    }
}

fn age(set: &KeySet) -> Duration {
    // A clock that went backwards counts as fresh
    SystemTime::now()
        .duration_since(set.fetched_at())
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::atomic::AtomicUsize;

    const RSA_N: &str = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";

    fn document(kids: &[&str]) -> Value {
        let keys: Vec<Value> = kids
            .iter()
            .map(|kid| json!({"kty": "RSA", "kid": kid, "n": RSA_N, "e": "AQAB"}))
            .collect();
        json!({ "keys": keys })
    }

    /// Serves a scripted sequence of responses, repeating the last one.
    struct ScriptedFetcher {
        responses: Vec<Result<Value, u16>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<Result<Value, u16>>) -> Arc<Self> {
            Arc::new(Self {
                responses,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl KeySetFetcher for ScriptedFetcher {
        async fn fetch(&self, _endpoint: &KeySetEndpoint) -> Result<Value, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let index = call.min(self.responses.len() - 1);
            self.responses[index].clone().map_err(FetchError::Status)
        }
    }

    fn cache(fetcher: Arc<ScriptedFetcher>, options: KeySetCacheOptions) -> KeySetCache {
        let endpoint = KeySetEndpoint::parse("https://issuer.example/jwks.json").unwrap();
        KeySetCache::new(endpoint, fetcher, options)
    }

    #[tokio::test]
    async fn test_first_resolve_fetches_once() {
        let fetcher = ScriptedFetcher::new(vec![Ok(document(&["k1", "k2"]))]);
        let cache = cache(fetcher, KeySetCacheOptions::default());

        assert!(cache.snapshot().is_none());
        assert_eq!(cache.resolve("k1").await.unwrap().kid(), "k1");
        assert_eq!(cache.resolve("k2").await.unwrap().kid(), "k2");
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_rotation_refetch_finds_new_key() {
        let fetcher = ScriptedFetcher::new(vec![Ok(document(&["old"])), Ok(document(&["new"]))]);
        let cache = cache(fetcher, KeySetCacheOptions::default());

        cache.resolve("old").await.unwrap();
        assert_eq!(cache.resolve("new").await.unwrap().kid(), "new");
        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_second_miss_is_final() {
        let fetcher = ScriptedFetcher::new(vec![Ok(document(&["k1"]))]);
        let cache = cache(fetcher, KeySetCacheOptions::default());

        let err = cache.resolve("unknown").await.unwrap_err();
        assert!(matches!(err, KeyResolutionError::MissingKey { ref kid } if kid == "unknown"));
        // initial fetch plus exactly one rotation re-fetch
        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_snapshot() {
        let fetcher = ScriptedFetcher::new(vec![Ok(document(&["k1"])), Err(503)]);
        let cache = cache(fetcher, KeySetCacheOptions::default());

        cache.resolve("k1").await.unwrap();
        let before = cache.snapshot().unwrap();

        let err = cache.resolve("k2").await.unwrap_err();
        assert!(matches!(err, KeyResolutionError::Fetch(FetchError::Status(503))));
        assert!(Arc::ptr_eq(&before, &cache.snapshot().unwrap()));
        assert!(cache.resolve("k1").await.is_ok());
    }

    #[tokio::test]
    async fn test_initial_fetch_failure() {
        let fetcher = ScriptedFetcher::new(vec![Err(500)]);
        let cache = cache(fetcher, KeySetCacheOptions::default());

        let err = cache.resolve("k1").await.unwrap_err();
        assert_eq!(err.kind(), crate::FailureKind::FetchFailed);
        assert!(cache.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_document_without_usable_keys_is_fetch_failure() {
        let fetcher = ScriptedFetcher::new(vec![Ok(json!({"keys": []}))]);
        let cache = cache(fetcher, KeySetCacheOptions::default());

        let err = cache.resolve("k1").await.unwrap_err();
        assert!(matches!(err, KeyResolutionError::Parse(_)));
        assert!(cache.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_refetch_cooldown_suppresses_rotation() {
        let fetcher = ScriptedFetcher::new(vec![Ok(document(&["k1"])), Ok(document(&["k2"]))]);
        let options = KeySetCacheOptions {
            refetch_cooldown: Some(Duration::from_secs(300)),
            ..Default::default()
        };
        let cache = cache(fetcher, options);

        cache.resolve("k1").await.unwrap();
        assert!(matches!(
            cache.resolve("k2").await,
            Err(KeyResolutionError::MissingKey { .. })
        ));
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_max_age_expiry_refetches() {
        let fetcher = ScriptedFetcher::new(vec![Ok(document(&["k1"]))]);
        let options = KeySetCacheOptions {
            max_age: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let cache = cache(fetcher, options);

        cache.resolve("k1").await.unwrap();
        cache.resolve("k1").await.unwrap();
        assert_eq!(cache.fetch_count(), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.resolve("k1").await.unwrap();
        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_snapshot_served_when_refresh_fails() {
        let fetcher = ScriptedFetcher::new(vec![Ok(document(&["k1"])), Err(502)]);
        let options = KeySetCacheOptions {
            max_age: Some(Duration::from_millis(10)),
            ..Default::default()
        };
        let cache = cache(fetcher, options);

        cache.resolve("k1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(cache.resolve("k1").await.is_ok());
        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_is_not_retried_until_backoff_elapses() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(document(&["k1"])),
            Err(503),
            Ok(document(&["k1", "k2"])),
        ]);
        let options = KeySetCacheOptions {
            max_age: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let cache = cache(fetcher, options);

        cache.resolve("k1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        // refresh fails, stale snapshot served
        cache.resolve("k1").await.unwrap();
        assert_eq!(cache.fetch_count(), 2);
        for _ in 0..5 {
            cache.resolve("k1").await.unwrap();
        }
        assert_eq!(cache.fetch_count(), 2);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.resolve("k2").await.unwrap().kid(), "k2");
        assert_eq!(cache.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_clear_forces_fetch() {
        let fetcher = ScriptedFetcher::new(vec![Ok(document(&["k1"]))]);
        let cache = cache(fetcher, KeySetCacheOptions::default());

        cache.resolve("k1").await.unwrap();
        cache.clear();
        assert!(cache.snapshot().is_none());
        cache.resolve("k1").await.unwrap();
        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_resolves_share_one_fetch() {
        let fetcher = ScriptedFetcher::new(vec![Ok(document(&["k1"]))]);
        let cache = Arc::new(cache(fetcher, KeySetCacheOptions::default()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.resolve("k1").await.map(|k| k.kid().to_string()) })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "k1");
        }
        assert_eq!(cache.fetch_count(), 1);
    }
}
