//! Common test utilities for integration tests
//!
//! A wiremock-backed key-set endpoint plus token minting with the PEM fixtures
//! under `tests/fixtures/`.

#![allow(dead_code)]

pub mod auth0;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use jwks_auth::{AuthConfig, Authenticator, ClientCache, KeySetCacheOptions};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

/// Path the mock server serves key sets under
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

const PUBLIC_COMPONENTS: &str = include_str!("../fixtures/public_components.json");

/// Key pairs available as fixtures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKey {
    /// The issuer's current RSA key
    RsaPrimary,
    /// The RSA key the issuer rotates to
    RsaRotated,
    /// An unrelated RSA key pair
    RsaImpostor,
    /// A P-256 key
    EcP256,
}

impl TestKey {
    fn name(self) -> &'static str {
        match self {
            Self::RsaPrimary => "rsa_primary",
            Self::RsaRotated => "rsa_rotated",
            Self::RsaImpostor => "rsa_impostor",
            Self::EcP256 => "ec_p256",
        }
    }

    fn private_pem(self) -> &'static str {
        match self {
            Self::RsaPrimary => include_str!("../fixtures/rsa_primary.pem"),
            Self::RsaRotated => include_str!("../fixtures/rsa_rotated.pem"),
            Self::RsaImpostor => include_str!("../fixtures/rsa_impostor.pem"),
            Self::EcP256 => include_str!("../fixtures/ec_p256.pem"),
        }
    }

    /// Default signing algorithm for the key
    pub fn algorithm(self) -> Algorithm {
        match self {
            Self::EcP256 => Algorithm::ES256,
            _ => Algorithm::RS256,
        }
    }

    /// Public JWK for the key under `kid`
    pub fn jwk(self, kid: &str) -> Value {
        let components: Value = serde_json::from_str(PUBLIC_COMPONENTS).unwrap();
        let mut jwk = components[self.name()].clone();
        jwk["kid"] = json!(kid);
        jwk["use"] = json!("sig");
        jwk["alg"] = json!(format!("{:?}", self.algorithm()));
        jwk
    }

    fn encoding_key(self) -> EncodingKey {
        let pem = self.private_pem().as_bytes();
        match self {
            Self::EcP256 => EncodingKey::from_ec_pem(pem).expect("Invalid EC key"),
            _ => EncodingKey::from_rsa_pem(pem).expect("Invalid RSA key"),
        }
    }
}

/// Key-set document with the given `(key, kid)` entries
pub fn key_set(keys: &[(TestKey, &str)]) -> Value {
    let keys: Vec<Value> = keys.iter().map(|(key, kid)| key.jwk(kid)).collect();
    json!({ "keys": keys })
}

/// Sign `claims` with `key`, putting `kid` in the header
pub fn sign(key: TestKey, kid: Option<&str>, claims: &Value) -> String {
    sign_with(key, key.algorithm(), kid, claims)
}

/// Sign `claims` with `key` using an explicit algorithm
pub fn sign_with(key: TestKey, algorithm: Algorithm, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(algorithm);
    header.typ = Some("JWT".to_string());
    header.kid = kid.map(str::to_string);

    encode(&header, claims, &key.encoding_key()).expect("Failed to encode test JWT")
}

/// Current Unix time in seconds
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Claims valid for the next hour
pub fn valid_claims() -> Value {
    let now = now();
    json!({
        "iss": "https://issuer.example/",
        "sub": "user-123",
        "aud": "https://expenses-api",
        "iat": now,
        "nbf": now,
        "exp": now + 3600,
        "scope": "read:expenses",
    })
}

/// Mock key-set endpoint
pub struct MockJwksServer {
    pub server: MockServer,
    pub jwks_uri: String,
}

impl MockJwksServer {
    /// Start a server with nothing mounted
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let jwks_uri = format!("{}{}", server.uri(), JWKS_PATH);
        Self { server, jwks_uri }
    }

    /// Serve `document`, expecting exactly `expected_fetches` requests
    pub async fn serve(&self, document: Value, expected_fetches: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .expect(expected_fetches)
            .mount(&self.server)
            .await;
    }

    /// Serve `document` for the next request only, then fall through to later mocks
    pub async fn serve_once(&self, document: Value) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .up_to_n_times(1)
            .expect(1)
            .mount(&self.server)
            .await;
    }

    /// Answer with an error status, expecting exactly `expected_fetches` requests
    pub async fn fail(&self, status: u16, expected_fetches: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .expect(expected_fetches)
            .mount(&self.server)
            .await;
    }

    /// Number of key-set requests received so far
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or_default()
    }
}

/// RS256 configuration for the expenses-api audience
pub fn config(jwks_uri: &str) -> AuthConfig {
    let mut config = AuthConfig::new(jwks_uri, ["RS256"]);
    config.audience = Some(vec!["https://expenses-api".to_string()]);
    config
}

/// Fresh client cache with default options
pub fn client_cache() -> Arc<ClientCache> {
    client_cache_with(KeySetCacheOptions::default())
}

/// Fresh client cache with custom options
pub fn client_cache_with(options: KeySetCacheOptions) -> Arc<ClientCache> {
    let fetcher = jwks_auth::HttpKeySetFetcher::new().expect("HTTP client");
    Arc::new(ClientCache::with_fetcher(Arc::new(fetcher), options))
}

/// Authenticator using the stub resolver
pub fn authenticator(config: &AuthConfig, clients: Arc<ClientCache>) -> Authenticator {
    Authenticator::new(config, clients).expect("valid configuration")
}
