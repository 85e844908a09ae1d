//! # Tower Middleware Integration
//!
//! [`AuthLayer`] wraps an `http` service with an [`Authenticator`]:
//!
//! - `Authenticated`: an [`Authenticated`] extension (principal + claims) is
//!   inserted into the request before it reaches the inner service
//! - `NoCredential`: the request passes through untouched, so the inner
//!   service decides whether anonymous access is allowed
//! - `Rejected`: the inner service is not called; the response is
//!   `401 Unauthorized` with `WWW-Authenticate: Bearer error="invalid_token"`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use jwks_auth::tower::AuthLayer;
//!
//! let service = ServiceBuilder::new()
//!     .layer(AuthLayer::new(authenticator))
//!     .service(my_inner_service);
//! ```
//!
//! ## Request Extensions
//!
//! ```rust,ignore
//! if let Some(auth) = req.extensions().get::<Authenticated<AuthenticatedStub>>() {
//!     println!("subject: {:?}", auth.claims.sub());
//! }
//! ```
//!
//! [`Authenticator`]: crate::Authenticator

mod layer;
mod service;

pub use layer::AuthLayer;
pub use service::{AuthService, AuthServiceFuture};

use crate::claims::Claims;

/// Request extension inserted for authenticated requests.
#[derive(Debug, Clone, PartialEq)]
pub struct Authenticated<P> {
    /// Whatever the identity resolver produced
    pub principal: P,
    /// The verified claims
    pub claims: Claims,
}
