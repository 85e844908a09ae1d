//! Key-set retrieval and caching
//!
//! A [`KeySetCache`] owns the most recent snapshot of one key-set document and
//! re-fetches it when an unknown key identifier shows up (key rotation). The
//! [`ClientCache`] hands out exactly one `KeySetCache` per [`KeySetEndpoint`].

mod cache;
mod client_cache;
mod fetcher;
mod key_set;

use std::fmt;

pub use cache::{KeySetCache, KeySetCacheOptions};
pub use client_cache::ClientCache;
pub use fetcher::{HttpKeySetFetcher, KeySetFetcher};
pub use key_set::{Jwk, KeyFamily, KeySet, SigningKey};

use crate::error::ConfigError;

/// Validated location of a key-set document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeySetEndpoint(String);

impl KeySetEndpoint {
    /// Validate and wrap a key-set URI.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingJwksUri`] for an empty string and
    /// [`ConfigError::InvalidJwksUri`] unless the URI is an absolute
    /// `http`/`https` URL with a host.
    pub fn parse(uri: &str) -> Result<Self, ConfigError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(ConfigError::MissingJwksUri);
        }

        let invalid = |reason: String| ConfigError::InvalidJwksUri {
            uri: uri.to_string(),
            reason,
        };

        let parsed = url::Url::parse(uri).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme `{}`", parsed.scheme())));
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }

        Ok(Self(uri.to_string()))
    }

    /// The URI as configured
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeySetEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for KeySetEndpoint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
