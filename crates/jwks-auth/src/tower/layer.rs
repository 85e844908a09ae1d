//! Tower Layer implementation for authentication

use tower::Layer;

use super::service::AuthService;
use crate::gate::Authenticator;
use crate::identity::StubResolver;

/// Tower Layer that authenticates requests before the inner service sees them.
///
/// # Example
///
/// ```rust,ignore
/// use tower::ServiceBuilder;
/// use jwks_auth::tower::AuthLayer;
///
/// let service = ServiceBuilder::new()
///     .layer(AuthLayer::new(authenticator))
///     .service(my_inner_service);
/// ```
pub struct AuthLayer<R = StubResolver> {
    authenticator: Authenticator<R>,
}

impl<R> Clone for AuthLayer<R> {
    fn clone(&self) -> Self {
        Self {
            authenticator: self.authenticator.clone(),
        }
    }
}

impl<R> std::fmt::Debug for AuthLayer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthLayer")
            .field("authenticator", &self.authenticator)
            .finish()
    }
}

impl<R> AuthLayer<R> {
    /// Create a new auth layer
    pub fn new(authenticator: Authenticator<R>) -> Self {
        Self { authenticator }
    }

    /// The authenticator shared by every service this layer builds
    pub fn authenticator(&self) -> &Authenticator<R> {
        &self.authenticator
    }
}

impl<S, R> Layer<S> for AuthLayer<R> {
    type Service = AuthService<S, R>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService::new(inner, self.authenticator.clone())
    }
}
