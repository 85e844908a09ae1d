//! Mapping verified claims to a principal
//!
//! The gate hands the verified claims to an [`IdentityResolver`] and passes its
//! result through untouched. Without a resolver, [`StubResolver`] reports an
//! authenticated caller whose identity is unspecified.

use async_trait::async_trait;

use crate::claims::Claims;

/// Maps verified claims to the host application's principal type.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use jwks_auth::{Claims, IdentityResolver};
///
/// struct SubjectResolver;
///
/// #[async_trait]
/// impl IdentityResolver for SubjectResolver {
///     type Principal = Option<String>;
///
///     async fn resolve(&self, claims: &Claims) -> Self::Principal {
///         claims.sub().map(str::to_owned)
///     }
/// }
/// ```
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// What the resolver produces. `Option<User>` is a common choice when a
    /// verified token may name an unknown user.
    type Principal: Send;

    /// Produce the principal for a verified token.
    async fn resolve(&self, claims: &Claims) -> Self::Principal;
}

/// Principal produced by [`StubResolver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AuthenticatedStub;

impl AuthenticatedStub {
    /// Always true
    pub fn is_authenticated(&self) -> bool {
        true
    }
}

/// Default resolver: authenticated, identity unspecified.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubResolver;

#[async_trait]
impl IdentityResolver for StubResolver {
    type Principal = AuthenticatedStub;

    async fn resolve(&self, _claims: &Claims) -> Self::Principal {
        AuthenticatedStub
    }
}

/// Resolver backed by a synchronous closure. Build one with [`resolver_fn`].
#[derive(Clone)]
pub struct FnResolver<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnResolver<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnResolver").finish_non_exhaustive()
    }
}

/// Adapt a closure into an [`IdentityResolver`].
///
/// ```rust
/// use jwks_auth::resolver_fn;
///
/// let resolver = resolver_fn(|claims| claims.sub().map(str::to_owned));
/// ```
pub fn resolver_fn<F, P>(f: F) -> FnResolver<F>
where
    F: Fn(&Claims) -> P + Send + Sync,
    P: Send,
{
    FnResolver { f }
}

#[async_trait]
impl<F, P> IdentityResolver for FnResolver<F>
where
    F: Fn(&Claims) -> P + Send + Sync,
    P: Send,
{
    type Principal = P;

    async fn resolve(&self, claims: &Claims) -> Self::Principal {
        (self.f)(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_stub_resolver() {
        let principal = StubResolver.resolve(&Claims::default()).await;
        assert!(principal.is_authenticated());
    }

    #[tokio::test]
    async fn test_resolver_fn_passes_result_through() {
        let claims: Claims = serde_json::from_value(json!({"sub": "user-1"})).unwrap();

        let known = resolver_fn(|c: &Claims| c.sub().map(str::to_owned));
        assert_eq!(known.resolve(&claims).await, Some("user-1".to_string()));

        let unknown = resolver_fn(|_: &Claims| Option::<String>::None);
        assert_eq!(unknown.resolve(&claims).await, None);
    }
}
