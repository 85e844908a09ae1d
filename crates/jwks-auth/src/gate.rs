//! The authentication gate
//!
//! [`Authenticator::authenticate`] turns an optional credential into an
//! [`AuthResult`]:
//!
//! ```text
//! no credential ──────────────────────────────────────────▶ NoCredential
//! credential ─▶ parse header ─▶ resolve key ─▶ verify ─▶ resolve identity ─▶ Authenticated
//!                   │               │            │
//!                   └───────────────┴────────────┴──▶ Rejected(InvalidCredential)
//! ```
//!
//! The internal cause of a rejection is logged (never the token) and counted,
//! then collapsed into [`RejectionKind::InvalidCredential`].

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::auth_metrics as metrics;
use crate::bearer::{self, BEARER};
use crate::claims::Claims;
use crate::config::AuthConfig;
use crate::error::{ConfigError, FailureKind, RejectionKind};
use crate::identity::{IdentityResolver, StubResolver};
use crate::jwks::{ClientCache, KeySetEndpoint};
use crate::verifier::{self, VerificationPolicy};

/// Outcome of an authentication attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthResult<P> {
    /// No credential was presented; other mechanisms may still apply
    NoCredential,
    /// The credential verified
    Authenticated {
        /// Whatever the identity resolver produced
        principal: P,
        /// The verified claims, unchanged
        claims: Claims,
    },
    /// A credential was presented and refused
    Rejected(RejectionKind),
}

impl<P> AuthResult<P> {
    /// Whether the credential verified
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// Whether a credential was refused
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The principal, if authenticated
    pub fn principal(&self) -> Option<&P> {
        match self {
            Self::Authenticated { principal, .. } => Some(principal),
            _ => None,
        }
    }

    /// The verified claims, if authenticated
    pub fn claims(&self) -> Option<&Claims> {
        match self {
            Self::Authenticated { claims, .. } => Some(claims),
            _ => None,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            Self::NoCredential => "no_credential",
            Self::Authenticated { .. } => "authenticated",
            Self::Rejected(_) => "rejected",
        }
    }
}

/// Authenticates bearer tokens against one key-set endpoint.
///
/// Cheap to clone; clones share the client cache, policy and resolver.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use jwks_auth::{AuthConfig, AuthResult, Authenticator};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AuthConfig::new("https://issuer.example/.well-known/jwks.json", ["RS256"]);
/// let clients = Arc::new(config.client_cache()?);
/// let auth = Authenticator::new(&config, clients)?;
///
/// match auth.authenticate_header(Some("Bearer eyJ...")).await {
///     AuthResult::Authenticated { claims, .. } => println!("subject: {:?}", claims.sub()),
///     AuthResult::NoCredential => println!("anonymous"),
///     AuthResult::Rejected(kind) => println!("{kind}"),
/// }
/// # Ok(())
/// # }
/// ```
pub struct Authenticator<R = StubResolver> {
    clients: Arc<ClientCache>,
    endpoint: KeySetEndpoint,
    policy: Arc<VerificationPolicy>,
    resolver: Arc<R>,
    keyword: Arc<str>,
}

impl<R> Clone for Authenticator<R> {
    fn clone(&self) -> Self {
        Self {
            clients: Arc::clone(&self.clients),
            endpoint: self.endpoint.clone(),
            policy: Arc::clone(&self.policy),
            resolver: Arc::clone(&self.resolver),
            keyword: Arc::clone(&self.keyword),
        }
    }
}

impl<R> std::fmt::Debug for Authenticator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("endpoint", &self.endpoint)
            .field("algorithms", &self.policy.algorithms())
            .field("keyword", &self.keyword)
            .finish_non_exhaustive()
    }
}

impl Authenticator<StubResolver> {
    /// Validate `config` and build a gate using the stub identity resolver.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: &AuthConfig, clients: Arc<ClientCache>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(clients, config.endpoint()?, config.policy()?))
    }

    /// Build a gate from already-validated parts.
    pub fn from_parts(
        clients: Arc<ClientCache>,
        endpoint: KeySetEndpoint,
        policy: VerificationPolicy,
    ) -> Self {
        Self {
            clients,
            endpoint,
            policy: Arc::new(policy),
            resolver: Arc::new(StubResolver),
            keyword: Arc::from(BEARER),
        }
    }
}

impl<R> Authenticator<R> {
    /// Replace the identity resolver.
    pub fn with_resolver<R2>(self, resolver: R2) -> Authenticator<R2> {
        Authenticator {
            clients: self.clients,
            endpoint: self.endpoint,
            policy: self.policy,
            resolver: Arc::new(resolver),
            keyword: self.keyword,
        }
    }

    /// Use another `Authorization` scheme keyword than `Bearer`.
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Arc::from(keyword.into());
        self
    }

    /// The key-set endpoint
    pub fn endpoint(&self) -> &KeySetEndpoint {
        &self.endpoint
    }

    /// The verification policy
    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// The shared client cache
    pub fn clients(&self) -> &Arc<ClientCache> {
        &self.clients
    }
}

impl<R> Authenticator<R>
where
    R: IdentityResolver,
{
    /// Authenticate a raw token.
    ///
    /// `None` yields [`AuthResult::NoCredential`]; any presented credential,
    /// including an empty one, is either authenticated or rejected.
    pub async fn authenticate(&self, credential: Option<&str>) -> AuthResult<R::Principal> {
        let started = Instant::now();
        let result = match credential {
            None => AuthResult::NoCredential,
            Some(token) => match self.verify(token).await {
                Ok(claims) => {
                    let principal = self.resolver.resolve(&claims).await;
                    AuthResult::Authenticated { principal, claims }
                }
                Err(cause) => {
                    metrics::record_rejection(cause);
                    AuthResult::Rejected(RejectionKind::InvalidCredential)
                }
            },
        };

        metrics::record_auth_attempt(result.outcome());
        if credential.is_some() {
            metrics::record_verification_duration(started.elapsed().as_secs_f64());
        }
        result
    }

    /// Authenticate an `Authorization` header value.
    ///
    /// A missing header, or one using another scheme, is
    /// [`AuthResult::NoCredential`]; a malformed one is rejected.
    pub async fn authenticate_header(&self, header: Option<&str>) -> AuthResult<R::Principal> {
        match bearer::extract_bearer(header, &self.keyword) {
            Ok(token) => self.authenticate(token).await,
            Err(e) => {
                info!(cause = %FailureKind::Malformed, error = %e, "Rejected credential");
                metrics::record_rejection(FailureKind::Malformed);
                metrics::record_auth_attempt("rejected");
                AuthResult::Rejected(RejectionKind::InvalidCredential)
            }
        }
    }

    async fn verify(&self, token: &str) -> Result<Claims, FailureKind> {
        let header = verifier::parse_header(token, &self.policy).map_err(|e| {
            info!(cause = %e.kind(), error = %e, "Rejected credential");
            e.kind()
        })?;

        let cache = self.clients.get(&self.endpoint);
        let key = cache.resolve(&header.kid).await.map_err(|e| {
            info!(
                cause = %e.kind(),
                kid = %header.kid,
                jwks_uri = %self.endpoint,
                error = %e,
                "Rejected credential"
            );
            e.kind()
        })?;

        let claims = verifier::verify(token, &key, &self.policy).map_err(|e| {
            info!(cause = %e.kind(), kid = %header.kid, error = %e, "Rejected credential");
            e.kind()
        })?;

        debug!(kid = %header.kid, subject = ?claims.sub(), "Credential authenticated");
        Ok(claims)
    }
}
