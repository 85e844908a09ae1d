//! Error taxonomy
//!
//! Everything in this module except [`RejectionKind`] and [`ConfigError`] is
//! internal diagnostic detail. The authentication gate logs it and collapses it
//! into [`RejectionKind::InvalidCredential`] before anything reaches the caller.

use std::fmt;

use thiserror::Error;

/// The coarse reason a credential was rejected.
///
/// This is the only failure a caller ever observes. It intentionally carries
/// no detail: an expired token, an unknown key and a forged signature all look
/// the same from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RejectionKind {
    /// The presented credential could not be accepted.
    #[error("Invalid token")]
    InvalidCredential,
}

/// Internal classification of a rejected credential, for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The key-set endpoint could not be fetched or its document parsed.
    FetchFailed,
    /// The key identifier is unknown even after the rotation re-fetch.
    MissingKey,
    /// The token is not a structurally valid compact JWS.
    Malformed,
    /// The declared algorithm is not permitted by policy or by the key.
    AlgorithmRejected,
    /// The signature does not verify under the resolved key.
    BadSignature,
    /// A claim check (exp, nbf, iat, aud, iss, sub, required claims) failed.
    ClaimRejected,
}

impl FailureKind {
    /// Stable label used for log fields and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchFailed => "fetch_failed",
            Self::MissingKey => "missing_key",
            Self::Malformed => "malformed",
            Self::AlgorithmRejected => "algorithm_rejected",
            Self::BadSignature => "bad_signature",
            Self::ClaimRejected => "claim_rejected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to retrieve the key-set document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request to the key-set endpoint failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("Key-set endpoint returned status {0}")]
    Status(u16),

    /// The response body was not JSON
    #[error("Invalid key-set response: {0}")]
    InvalidResponse(String),
}

/// Failure to turn a fetched document into a usable key set.
#[derive(Debug, Error)]
pub enum KeySetError {
    /// The document is not an object with a `keys` array
    #[error("Key-set document has no `keys` array")]
    MissingKeys,

    /// No entry in the document is a usable signing key
    #[error("Key-set document contains no usable signing keys")]
    NoSigningKeys,
}

/// Failure to decode a single JSON Web Key into verification material.
#[derive(Debug, Error)]
pub enum KeyDecodeError {
    /// Key type is not supported for signature verification
    #[error("Unsupported key type: {kty}")]
    UnsupportedKeyType {
        /// The unsupported key type
        kty: String,
    },

    /// Key parameters are missing or cannot be decoded
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),
}

/// Failure of the key set cache to produce a key.
#[derive(Debug, Error)]
pub enum KeyResolutionError {
    /// The identifier was not found, even after re-fetching the key set
    #[error("Key not found: {kid}")]
    MissingKey {
        /// The key ID that was not found
        kid: String,
    },

    /// The key set could not be fetched
    #[error("Key-set fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The key set was fetched but could not be used
    #[error("Key-set parse failed: {0}")]
    Parse(#[from] KeySetError),
}

impl KeyResolutionError {
    /// Internal failure class of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::MissingKey { .. } => FailureKind::MissingKey,
            Self::Fetch(_) | Self::Parse(_) => FailureKind::FetchFailed,
        }
    }
}

/// Failure of the token verifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    /// Token structure could not be parsed
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Declared algorithm is not permitted
    #[error("Algorithm rejected: {0}")]
    AlgorithmRejected(String),

    /// Signature verification failed
    #[error("Bad signature: {0}")]
    BadSignature(String),

    /// A policy-enabled claim check failed
    #[error("Claim rejected: {0}")]
    ClaimRejected(String),
}

impl VerificationFailure {
    /// Internal failure class of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Malformed(_) => FailureKind::Malformed,
            Self::AlgorithmRejected(_) => FailureKind::AlgorithmRejected,
            Self::BadSignature(_) => FailureKind::BadSignature,
            Self::ClaimRejected(_) => FailureKind::ClaimRejected,
        }
    }
}

/// Configuration errors. These are fatal and surface at startup, never per request.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `jwks_uri` is missing or empty
    #[error("JWKS URI is required")]
    MissingJwksUri,

    /// `jwks_uri` is not an absolute http(s) URL
    #[error("Invalid JWKS URI `{uri}`: {reason}")]
    InvalidJwksUri {
        /// The rejected URI
        uri: String,
        /// Why it was rejected
        reason: String,
    },

    /// No algorithms configured
    #[error("At least one algorithm must be allowed")]
    NoAlgorithms,

    /// An algorithm name is unknown
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// The algorithm cannot be verified with public keys (HMAC)
    #[error("Algorithm {0} cannot be verified against a public key set")]
    UnsupportedAlgorithm(String),

    /// Clock skew tolerance above the allowed maximum
    #[error("leeway_secs must be at most {max}, got {secs}")]
    LeewayTooLarge {
        /// Configured value
        secs: u64,
        /// Allowed maximum
        max: u64,
    },

    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(std::path::PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    /// The HTTP client for key-set fetching could not be built
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
