//! Authentication metrics
//!
//! Enable with the `metrics` feature flag. Requires a `metrics` recorder
//! to be installed (e.g., via `metrics-exporter-prometheus`).
//!
//! ## Metrics Provided
//!
//! - `jwks_auth_attempts_total` - Counter for authentication attempts (labels: outcome)
//! - `jwks_auth_rejections_total` - Counter for rejected credentials (labels: cause)
//! - `jwks_auth_key_set_fetches_total` - Counter for key-set fetches (labels: status)
//! - `jwks_auth_verification_duration_seconds` - Histogram for credential checks
//!
//! ## Example
//!
//! ```rust,ignore
//! use jwks_auth::init_auth_metrics;
//!
//! init_auth_metrics();
//! ```

use crate::error::FailureKind;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static INIT: Once = Once::new();

/// Initialize metric descriptions. Idempotent; call once at startup.
#[cfg(feature = "metrics")]
pub fn init_auth_metrics() {
    INIT.call_once(|| {
        describe_counter!(
            "jwks_auth_attempts_total",
            "Total authentication attempts by outcome"
        );
        describe_counter!(
            "jwks_auth_rejections_total",
            "Total rejected credentials by internal cause"
        );
        describe_counter!(
            "jwks_auth_key_set_fetches_total",
            "Total key-set document fetches"
        );
        describe_histogram!(
            "jwks_auth_verification_duration_seconds",
            "Credential verification duration in seconds"
        );
    });
}

/// Record the outcome of one `authenticate` call
///
/// `outcome` is one of `authenticated`, `rejected`, `no_credential`.
#[cfg(feature = "metrics")]
pub(crate) fn record_auth_attempt(outcome: &'static str) {
    counter!("jwks_auth_attempts_total", "outcome" => outcome).increment(1);
}

/// Record a rejected credential with its internal cause
#[cfg(feature = "metrics")]
pub(crate) fn record_rejection(cause: FailureKind) {
    counter!("jwks_auth_rejections_total", "cause" => cause.as_str()).increment(1);
}

/// Record a key-set fetch
#[cfg(feature = "metrics")]
pub(crate) fn record_key_set_fetch(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("jwks_auth_key_set_fetches_total", "status" => status).increment(1);
}

/// Record how long a credential check took
#[cfg(feature = "metrics")]
pub(crate) fn record_verification_duration(duration_seconds: f64) {
    histogram!("jwks_auth_verification_duration_seconds").record(duration_seconds);
}

// No-op versions when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub fn init_auth_metrics() {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_auth_attempt(_outcome: &'static str) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_rejection(_cause: FailureKind) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_key_set_fetch(_success: bool) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_verification_duration(_duration_seconds: f64) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_auth_metrics() {
        init_auth_metrics();
        init_auth_metrics();
    }

    #[test]
    fn test_record_functions() {
        init_auth_metrics();
        record_auth_attempt("authenticated");
        record_auth_attempt("rejected");
        record_rejection(FailureKind::MissingKey);
        record_key_set_fetch(true);
        record_key_set_fetch(false);
        record_verification_duration(0.002);
    }
}
