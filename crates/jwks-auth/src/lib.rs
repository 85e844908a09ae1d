//! # jwks-auth - Bearer-Token Authentication against a Remote JWKS
//!
//! Authenticates signed bearer tokens (JWS compact serialization) issued by an
//! external identity provider. Verification keys come from the provider's
//! JSON Web Key Set and are cached per endpoint.
//!
//! ## Design Principles
//!
//! - **Explicit ownership**: the [`ClientCache`] is a value you create and share, not a global
//! - **One failure surface**: callers see [`RejectionKind::InvalidCredential`], logs see the cause
//! - **No implicit trust**: the algorithm allow-list is required and never defaults to "any"
//! - **Key rotation**: an unknown `kid` triggers exactly one key-set re-fetch
//!
//! ## Architecture
//!
//! - [`jwks`] - Key-set fetching, parsing and caching ([`KeySetCache`], [`ClientCache`])
//! - [`verifier`] - Header parsing, signature and claim verification
//! - [`identity`] - Mapping verified claims to a principal
//! - [`gate`] - The [`Authenticator`] tying it together
//! - [`bearer`] - `Authorization` header parsing
//! - [`config`] - Configuration surface and loading
//! - [`tower`] - Tower middleware (feature `middleware`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use jwks_auth::{AuthConfig, AuthResult, Authenticator, resolver_fn};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = AuthConfig::new("https://issuer.example/.well-known/jwks.json", ["RS256"]);
//! config.audience = Some(vec!["https://api.example".to_string()]);
//!
//! let clients = Arc::new(config.client_cache()?);
//! let auth = Authenticator::new(&config, clients)?
//!     .with_resolver(resolver_fn(|claims| claims.sub().map(str::to_owned)));
//!
//! if let AuthResult::Authenticated { principal, .. } =
//!     auth.authenticate_header(Some("Bearer eyJ...")).await
//! {
//!     println!("user: {principal:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `middleware` (alias `tower`) - Tower `Layer`/`Service` for `http` requests
//! - `metrics` - Counters via the `metrics` facade
//! - `full` - All features enabled
//!
//! ## Standards
//!
//! - **RFC 7515** - JSON Web Signature (JWS)
//! - **RFC 7517** - JSON Web Key (JWK)
//! - **RFC 7519** - JSON Web Token (JWT)
//! - **RFC 6750** - Bearer Token Usage

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bearer;
pub mod claims;
pub mod config;
pub mod error;
pub mod gate;
pub mod identity;
pub mod jwks;
mod auth_metrics;
pub mod verifier;

#[cfg(feature = "middleware")]
#[cfg_attr(docsrs, doc(cfg(feature = "middleware")))]
pub mod tower;

#[doc(inline)]
pub use claims::Claims;
#[doc(inline)]
pub use config::{AuthConfig, CacheConfig, VerifyOptions};
#[doc(inline)]
pub use error::{
    ConfigError, FailureKind, FetchError, KeyDecodeError, KeyResolutionError, KeySetError,
    RejectionKind, VerificationFailure,
};
#[doc(inline)]
pub use gate::{AuthResult, Authenticator};
#[doc(inline)]
pub use identity::{AuthenticatedStub, FnResolver, IdentityResolver, StubResolver, resolver_fn};
#[doc(inline)]
pub use jwks::{
    ClientCache, HttpKeySetFetcher, KeySet, KeySetCache, KeySetCacheOptions, KeySetEndpoint,
    KeySetFetcher, SigningKey,
};
#[doc(inline)]
pub use verifier::{ParsedHeader, VerificationPolicy};

pub use auth_metrics::init_auth_metrics;

/// Re-exported so callers can name algorithms without a direct dependency
pub use jsonwebtoken::Algorithm;
