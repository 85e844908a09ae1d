//! Token verification
//!
//! Verification runs in a fixed order and stops at the first failure:
//!
//! 1. Structure: size limit, three segments, base64url JSON header → `Malformed`
//! 2. Algorithm: allow-listed by policy and usable with the key → `AlgorithmRejected`
//! 3. Signature → `BadSignature`
//! 4. Claims enabled by the policy (exp, nbf, iat, aud, iss, sub, required) → `ClaimRejected`
//!
//! Signature and registered-claim checks are delegated to `jsonwebtoken`; the
//! header is parsed here so the algorithm allow-list is enforced before any key
//! material is touched, including for `alg` values `jsonwebtoken` cannot name.

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, get_current_timestamp};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::error::{ConfigError, VerificationFailure};
use crate::jwks::SigningKey;

/// Default upper bound on the encoded token size
pub const DEFAULT_MAX_TOKEN_BYTES: usize = 8192;

/// Upper bound on clock skew tolerance
pub const MAX_LEEWAY_SECS: u64 = 86_400;

/// Registered claims `jsonwebtoken` can require by name
const SPEC_CLAIMS: [&str; 5] = ["exp", "nbf", "aud", "iss", "sub"];

/// What a token must satisfy to be accepted.
///
/// Every check is opt-in except the algorithm allow-list, which has no
/// "accept anything" default. Audience, issuer and subject are verified only
/// when configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationPolicy {
    algorithms: Vec<Algorithm>,
    /// Reject tokens whose `exp` has passed
    pub verify_exp: bool,
    /// Reject tokens whose `nbf` lies in the future
    pub verify_nbf: bool,
    /// Reject tokens whose `iat` lies in the future
    pub verify_iat: bool,
    /// Accepted audiences; the token must name at least one
    pub audience: Option<Vec<String>>,
    /// Accepted issuers
    pub issuer: Option<Vec<String>>,
    /// Required subject
    pub subject: Option<String>,
    /// Claims that must be present
    pub required_claims: Vec<String>,
    /// Clock skew tolerance for time-based claims, capped at [`MAX_LEEWAY_SECS`]
    pub leeway: Duration,
    /// Tokens longer than this are rejected before decoding
    pub max_token_bytes: usize,
}

impl VerificationPolicy {
    /// Policy accepting the given algorithms, with exp/nbf/iat checks on,
    /// no leeway and no audience, issuer or subject constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoAlgorithms`] if `algorithms` is empty.
    pub fn new(algorithms: Vec<Algorithm>) -> Result<Self, ConfigError> {
        if algorithms.is_empty() {
            return Err(ConfigError::NoAlgorithms);
        }
        Ok(Self {
            algorithms,
            verify_exp: true,
            verify_nbf: true,
            verify_iat: true,
            audience: None,
            issuer: None,
            subject: None,
            required_claims: Vec::new(),
            leeway: Duration::ZERO,
            max_token_bytes: DEFAULT_MAX_TOKEN_BYTES,
        })
    }

    /// Allowed signature algorithms
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    /// Require one of the given audiences.
    pub fn with_audience<I, S>(mut self, audience: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audience = Some(audience.into_iter().map(Into::into).collect());
        self
    }

    /// Require one of the given issuers.
    pub fn with_issuer<I, S>(mut self, issuer: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.issuer = Some(issuer.into_iter().map(Into::into).collect());
        self
    }

    /// Require this subject.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Require these claims to be present.
    pub fn with_required_claims<I, S>(mut self, claims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_claims = claims.into_iter().map(Into::into).collect();
        self
    }

    /// Tolerate this much clock skew.
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Toggle the exp/nbf/iat checks.
    pub fn with_time_checks(mut self, exp: bool, nbf: bool, iat: bool) -> Self {
        self.verify_exp = exp;
        self.verify_nbf = nbf;
        self.verify_iat = iat;
        self
    }

    fn leeway_secs(&self) -> u64 {
        self.leeway.as_secs().min(MAX_LEEWAY_SECS)
    }

    /// Whether a time claim is checked, and so must be a NumericDate
    fn checks_time_claim(&self, name: &str) -> bool {
        let enabled = match name {
            "exp" => self.verify_exp,
            "nbf" => self.verify_nbf,
            "iat" => self.verify_iat,
            _ => false,
        };
        enabled || self.required_claims.iter().any(|claim| claim == name)
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.algorithms = vec![alg];
        validation.validate_exp = self.verify_exp;
        validation.validate_nbf = self.verify_nbf;
        validation.leeway = self.leeway_secs();

        let mut required: HashSet<String> = self
            .required_claims
            .iter()
            .filter(|claim| SPEC_CLAIMS.contains(&claim.as_str()))
            .cloned()
            .collect();

        match &self.audience {
            Some(audience) => {
                validation.set_audience(audience);
                required.insert("aud".to_string());
            }
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(issuer);
            required.insert("iss".to_string());
        }
        if let Some(subject) = &self.subject {
            validation.sub = Some(subject.clone());
            required.insert("sub".to_string());
        }

        validation.required_spec_claims = required;
        validation
    }
}

/// The parts of a token header needed to find its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    /// Declared signature algorithm, already checked against the allow-list
    pub algorithm: Algorithm,
    /// Key identifier
    pub kid: String,
}

#[derive(Deserialize)]
struct RawHeader {
    alg: Option<Value>,
    kid: Option<Value>,
}

/// Parse the token header and enforce the algorithm allow-list.
///
/// # Errors
///
/// - [`VerificationFailure::Malformed`] for oversize tokens, a segment count
///   other than three, an undecodable header, or a missing `kid`
/// - [`VerificationFailure::AlgorithmRejected`] if `alg` is unknown (including
///   `none`) or not allowed by `policy`
pub fn parse_header(
    token: &str,
    policy: &VerificationPolicy,
) -> Result<ParsedHeader, VerificationFailure> {
    if token.len() > policy.max_token_bytes {
        return Err(VerificationFailure::Malformed(format!(
            "token exceeds {} bytes",
            policy.max_token_bytes
        )));
    }

    let mut segments = token.split('.');
    let (Some(header), Some(_payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(VerificationFailure::Malformed(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|e| VerificationFailure::Malformed(format!("header is not base64url: {e}")))?;
    let raw: RawHeader = serde_json::from_slice(&bytes)
        .map_err(|e| VerificationFailure::Malformed(format!("header is not a JSON object: {e}")))?;

    let alg = match raw.alg {
        Some(Value::String(alg)) => alg,
        _ => {
            return Err(VerificationFailure::Malformed(
                "header has no `alg`".to_string(),
            ));
        }
    };
    let algorithm = Algorithm::from_str(&alg)
        .map_err(|_| VerificationFailure::AlgorithmRejected(format!("unknown algorithm `{alg}`")))?;
    if !policy.algorithms.contains(&algorithm) {
        return Err(VerificationFailure::AlgorithmRejected(format!(
            "{algorithm:?} is not allowed"
        )));
    }

    let kid = match raw.kid {
        Some(Value::String(kid)) if !kid.is_empty() => kid,
        _ => {
            return Err(VerificationFailure::Malformed(
                "header has no `kid`".to_string(),
            ));
        }
    };

    Ok(ParsedHeader { algorithm, kid })
}

/// Verify `token` with `key` under `policy` and return its claims unchanged.
///
/// # Errors
///
/// Returns the first [`VerificationFailure`] encountered, in the order
/// structure, algorithm, signature, claims.
pub fn verify(
    token: &str,
    key: &SigningKey,
    policy: &VerificationPolicy,
) -> Result<Claims, VerificationFailure> {
    let header = parse_header(token, policy)?;
    let alg = header.algorithm;

    if !key.supports(alg) {
        return Err(VerificationFailure::AlgorithmRejected(format!(
            "key `{}` ({:?}) cannot verify {alg:?}",
            key.kid(),
            key.family()
        )));
    }

    let data = decode::<Claims>(token, key.decoding_key(), &policy.validation(alg))
        .map_err(|e| classify(e.kind(), e.to_string()))?;
    let claims = data.claims;

    check_claims(&claims, policy, get_current_timestamp())?;

    debug!(
        kid = %header.kid,
        algorithm = ?alg,
        subject = ?claims.sub(),
        "Token verified"
    );
    Ok(claims)
}

fn classify(kind: &ErrorKind, message: String) -> VerificationFailure {
    match kind {
        ErrorKind::InvalidSignature => VerificationFailure::BadSignature(message),
        ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
            VerificationFailure::AlgorithmRejected(message)
        }
        ErrorKind::ExpiredSignature
        | ErrorKind::ImmatureSignature
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidSubject
        | ErrorKind::MissingRequiredClaim(_) => VerificationFailure::ClaimRejected(message),
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            VerificationFailure::Malformed(message)
        }
        // key material or crypto backend problems: the signature is not trusted
        _ => VerificationFailure::BadSignature(message),
    }
}

/// Checks `jsonwebtoken` does not cover: iat, fractional NumericDates,
/// and presence of non-registered required claims. A time claim whose check
/// is disabled is not inspected unless it is required.
fn check_claims(
    claims: &Claims,
    policy: &VerificationPolicy,
    now: u64,
) -> Result<(), VerificationFailure> {
    let now = i64::try_from(now).unwrap_or(i64::MAX);
    let leeway = i64::try_from(policy.leeway_secs()).unwrap_or(i64::MAX);

    for name in ["exp", "nbf", "iat"] {
        if policy.checks_time_claim(name)
            && claims.contains_key(name)
            && claims.numeric(name).is_none()
        {
            return Err(VerificationFailure::ClaimRejected(format!(
                "`{name}` must be a NumericDate"
            )));
        }
    }

    if policy.verify_exp
        && let Some(exp) = claims.exp()
        && exp <= now.saturating_sub(leeway)
    {
        return Err(VerificationFailure::ClaimRejected(
            "token has expired".to_string(),
        ));
    }
    if policy.verify_nbf
        && let Some(nbf) = claims.nbf()
        && nbf > now.saturating_add(leeway)
    {
        return Err(VerificationFailure::ClaimRejected(
            "token is not yet valid (nbf)".to_string(),
        ));
    }
    if policy.verify_iat
        && let Some(iat) = claims.iat()
        && iat > now.saturating_add(leeway)
    {
        return Err(VerificationFailure::ClaimRejected(
            "token was issued in the future (iat)".to_string(),
        ));
    }

    if let Some(claim) = policy
        .required_claims
        .iter()
        .find(|claim| !claims.contains_key(claim.as_str()))
    {
        return Err(VerificationFailure::ClaimRejected(format!(
            "token is missing the `{claim}` claim"
        )));
    }

    Ok(())
}
