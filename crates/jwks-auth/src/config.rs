//! Authentication configuration
//!
//! [`AuthConfig`] is the serializable configuration surface. Load it from a
//! file (TOML, YAML or JSON), from environment variables, or build it in code,
//! then call [`AuthConfig::validate`] at startup. Every problem found there is
//! fatal; nothing in this module is evaluated per request.
//!
//! ```toml
//! jwks_uri = "https://issuer.example/.well-known/jwks.json"
//! algorithms = ["RS256"]
//! audience = "https://api.example"
//! issuer = "https://issuer.example/"
//! leeway_secs = 0
//!
//! [options]
//! verify_exp = true
//!
//! [cache]
//! refetch_cooldown_secs = 30
//! ```

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::jwks::{ClientCache, HttpKeySetFetcher, KeySetCacheOptions, KeySetEndpoint, KeyFamily};
use crate::verifier::{DEFAULT_MAX_TOKEN_BYTES, MAX_LEEWAY_SECS, VerificationPolicy};

/// Authentication configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Location of the key-set document (required)
    pub jwks_uri: String,

    /// Accepted signature algorithms (required, e.g. `["RS256"]`)
    pub algorithms: Vec<String>,

    /// Time-based claim checks
    pub options: VerifyOptions,

    /// Accepted audiences; a single string or a list
    #[serde(with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<String>>,

    /// Accepted issuers; a single string or a list
    #[serde(with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub issuer: Option<Vec<String>>,

    /// Required subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Claims every token must carry
    pub required_claims: Vec<String>,

    /// Clock skew tolerance in seconds, at most one day
    pub leeway_secs: u64,

    /// Maximum encoded token size in bytes
    pub max_token_bytes: usize,

    /// Key-set caching behaviour
    pub cache: CacheConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwks_uri: String::new(),
            algorithms: Vec::new(),
            options: VerifyOptions::default(),
            audience: None,
            issuer: None,
            subject: None,
            required_claims: Vec::new(),
            leeway_secs: 0,
            max_token_bytes: DEFAULT_MAX_TOKEN_BYTES,
            cache: CacheConfig::default(),
        }
    }
}

/// Toggles for the time-based claim checks. All on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyOptions {
    /// Check `exp`
    pub verify_exp: bool,
    /// Check `nbf`
    pub verify_nbf: bool,
    /// Check `iat`
    pub verify_iat: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            verify_exp: true,
            verify_nbf: true,
            verify_iat: true,
        }
    }
}

/// Key-set cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Re-fetch snapshots older than this many seconds (unset: never)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_secs: Option<u64>,

    /// Minimum snapshot age in seconds before an unknown `kid` triggers a re-fetch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refetch_cooldown_secs: Option<u64>,

    /// Key-set request timeout in seconds
    pub fetch_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_secs: None,
            refetch_cooldown_secs: None,
            fetch_timeout_secs: 10,
        }
    }
}

impl AuthConfig {
    /// Minimal configuration for an endpoint and algorithm list.
    pub fn new<I, S>(jwks_uri: impl Into<String>, algorithms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            jwks_uri: jwks_uri.into(),
            algorithms: algorithms.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The file format is auto-detected from the file extension:
    /// - `.toml` → TOML format
    /// - `.yaml` or `.yml` → YAML format
    /// - `.json` → JSON format
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist, its format is unsupported,
    /// or it cannot be deserialized. The result is not validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load(Some(path.as_ref()), None)
    }

    /// Load configuration from a file, with `PREFIX_`-prefixed environment
    /// variables overriding file settings.
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file).
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        Self::load(Some(path.as_ref()), Some(env_prefix))
    }

    /// Load configuration from environment variables only.
    ///
    /// Variables are named `<PREFIX>_<FIELD>`, nested fields use `__`
    /// (`MYAPP_CACHE__MAX_AGE_SECS=600`), and `algorithms` / `required_claims`
    /// accept comma-separated lists (`MYAPP_ALGORITHMS=RS256,ES256`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if a variable cannot be deserialized.
    pub fn from_env(env_prefix: &str) -> Result<Self, ConfigError> {
        Self::load(None, Some(env_prefix))
    }

    fn load(path: Option<&Path>, env_prefix: Option<&str>) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }

            let format = match path.extension().and_then(|s| s.to_str()) {
                Some("toml") => FileFormat::Toml,
                Some("yaml" | "yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => return Err(ConfigError::UnsupportedFormat),
            };

            builder = builder.add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ));
        }

        if let Some(prefix) = env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("algorithms")
                    .with_list_parse_key("required_claims")
                    .try_parsing(true),
            );
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Check everything that can be checked without network access.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingJwksUri`] / [`ConfigError::InvalidJwksUri`]
    /// - [`ConfigError::NoAlgorithms`] if `algorithms` is empty
    /// - [`ConfigError::UnknownAlgorithm`] for unrecognised names
    /// - [`ConfigError::UnsupportedAlgorithm`] for HMAC algorithms
    /// - [`ConfigError::LeewayTooLarge`] if `leeway_secs` exceeds [`MAX_LEEWAY_SECS`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint()?;
        self.algorithms()?;
        if self.leeway_secs > MAX_LEEWAY_SECS {
            return Err(ConfigError::LeewayTooLarge {
                secs: self.leeway_secs,
                max: MAX_LEEWAY_SECS,
            });
        }
        Ok(())
    }

    /// The validated key-set endpoint.
    ///
    /// # Errors
    ///
    /// See [`KeySetEndpoint::parse`].
    pub fn endpoint(&self) -> Result<KeySetEndpoint, ConfigError> {
        KeySetEndpoint::parse(&self.jwks_uri)
    }

    fn algorithms(&self) -> Result<Vec<Algorithm>, ConfigError> {
        if self.algorithms.is_empty() {
            return Err(ConfigError::NoAlgorithms);
        }

        self.algorithms
            .iter()
            .map(|name| {
                let alg = Algorithm::from_str(name.trim())
                    .map_err(|_| ConfigError::UnknownAlgorithm(name.clone()))?;
                if KeyFamily::of(alg).is_none() {
                    return Err(ConfigError::UnsupportedAlgorithm(name.clone()));
                }
                Ok(alg)
            })
            .collect()
    }

    /// Build the verification policy.
    ///
    /// # Errors
    ///
    /// Returns the algorithm errors of [`validate`](Self::validate).
    pub fn policy(&self) -> Result<VerificationPolicy, ConfigError> {
        let mut policy = VerificationPolicy::new(self.algorithms()?)?
            .with_time_checks(
                self.options.verify_exp,
                self.options.verify_nbf,
                self.options.verify_iat,
            )
            .with_required_claims(self.required_claims.iter().cloned())
            .with_leeway(Duration::from_secs(self.leeway_secs));

        policy.audience = self.audience.clone();
        policy.issuer = self.issuer.clone();
        policy.subject = self.subject.clone();
        policy.max_token_bytes = self.max_token_bytes;
        Ok(policy)
    }

    /// Cache options from the `cache` section.
    pub fn cache_options(&self) -> KeySetCacheOptions {
        KeySetCacheOptions {
            max_age: self.cache.max_age_secs.map(Duration::from_secs),
            refetch_cooldown: self.cache.refetch_cooldown_secs.map(Duration::from_secs),
        }
    }

    /// A client cache using an HTTP fetcher with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn client_cache(&self) -> Result<ClientCache, ConfigError> {
        let fetcher =
            HttpKeySetFetcher::with_timeout(Duration::from_secs(self.cache.fetch_timeout_secs))?;
        Ok(ClientCache::with_fetcher(
            Arc::new(fetcher),
            self.cache_options(),
        ))
    }
}

/// Accepts `"a"` or `["a", "b"]`.
mod one_or_many {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(
            Option::<OneOrMany>::deserialize(deserializer)?.map(|value| match value {
                OneOrMany::One(one) => vec![one],
                OneOrMany::Many(many) => many,
            }),
        )
    }

    pub(super) fn serialize<S>(value: &Option<Vec<String>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.serialize(serializer)
    }
}
