//! Tower Service implementation for authentication

use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderValue, StatusCode};
use tower_service::Service;
use tracing::info;

use super::Authenticated;
use crate::error::FailureKind;
use crate::gate::{AuthResult, Authenticator};
use crate::identity::IdentityResolver;

/// Challenge sent with every rejection. Carries no cause detail.
const INVALID_TOKEN_CHALLENGE: &str = r#"Bearer error="invalid_token""#;

/// Future type for auth service responses
pub type AuthServiceFuture<T, E> = BoxFuture<'static, Result<T, E>>;

/// Tower Service that authenticates `http` requests.
///
/// See the [module documentation](super) for the request flow.
pub struct AuthService<S, R> {
    inner: S,
    authenticator: Authenticator<R>,
}

impl<S: Clone, R> Clone for AuthService<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            authenticator: self.authenticator.clone(),
        }
    }
}

impl<S: std::fmt::Debug, R> std::fmt::Debug for AuthService<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("inner", &self.inner)
            .field("authenticator", &self.authenticator)
            .finish()
    }
}

impl<S, R> AuthService<S, R> {
    /// Create a new auth service
    pub fn new(inner: S, authenticator: Authenticator<R>) -> Self {
        Self {
            inner,
            authenticator,
        }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the inner service
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

fn unauthorized<ResBody: Default>() -> http::Response<ResBody> {
    let mut response = http::Response::new(ResBody::default());
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response.headers_mut().insert(
        WWW_AUTHENTICATE,
        HeaderValue::from_static(INVALID_TOKEN_CHALLENGE),
    );
    response
}

impl<S, R, B, ResBody> Service<http::Request<B>> for AuthService<S, R>
where
    S: Service<http::Request<B>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    R: IdentityResolver + 'static,
    R::Principal: Clone + Send + Sync + 'static,
    B: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = S::Error;
    type Future = AuthServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        // The clone may not be ready; keep the one that was polled
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let authenticator = self.authenticator.clone();

        let header = match req.headers().get(AUTHORIZATION).map(HeaderValue::to_str) {
            None => None,
            Some(Ok(value)) => Some(value.to_owned()),
            Some(Err(e)) => {
                info!(cause = %FailureKind::Malformed, error = %e, "Rejected credential");
                return Box::pin(async { Ok(unauthorized()) });
            }
        };

        Box::pin(async move {
            match authenticator.authenticate_header(header.as_deref()).await {
                AuthResult::Authenticated { principal, claims } => {
                    req.extensions_mut()
                        .insert(Authenticated { principal, claims });
                    inner.call(req).await
                }
                AuthResult::NoCredential => inner.call(req).await,
                AuthResult::Rejected(_) => Ok(unauthorized()),
            }
        })
    }
}
