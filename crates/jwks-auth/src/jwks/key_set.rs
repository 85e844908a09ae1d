//! Key-set document parsing
//!
//! Turns a fetched JWKS document into an immutable [`KeySet`]. Entries are
//! parsed one by one so a single exotic key cannot poison the whole set:
//!
//! - entries with `use` other than `sig` are skipped
//! - entries without a `kid` are skipped
//! - unsupported key types (`oct`, unknown) and undecodable material are skipped
//! - duplicate identifiers keep the first occurrence
//!
//! Supports RSA (RS*/PS*), ECDSA (ES256/ES384) and Ed25519 (EdDSA) keys.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{KeyDecodeError, KeySetError};

/// JSON Web Key (JWK) entry of a key-set document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key Type (RSA, EC, OKP, oct)
    pub kty: String,

    /// Key ID, used for key selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Public Key Use (sig, enc)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "use")]
    pub key_use: Option<String>,

    /// Algorithm (RS256, ES256, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// RSA modulus (base64url encoded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// Curve name (P-256, P-384, Ed25519)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC X coordinate or Ed25519 public key (base64url encoded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC Y coordinate (base64url encoded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// Algorithm family a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    /// RSA keys (RS256/384/512, PS256/384/512)
    Rsa,
    /// Elliptic-curve keys (ES256, ES384)
    Ec,
    /// Octet key pairs (EdDSA)
    Okp,
}

impl KeyFamily {
    /// Family that can verify signatures made with `alg`, if any.
    pub fn of(alg: Algorithm) -> Option<Self> {
        match alg {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Some(Self::Rsa),
            Algorithm::ES256 | Algorithm::ES384 => Some(Self::Ec),
            Algorithm::EdDSA => Some(Self::Okp),
            _ => None,
        }
    }
}

impl Jwk {
    /// Convert this JWK into a verification key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyDecodeError`] for unsupported key types and for missing or
    /// undecodable key parameters.
    pub fn to_decoding_key(&self) -> Result<(KeyFamily, DecodingKey), KeyDecodeError> {
        match self.kty.as_str() {
            "RSA" => self.to_rsa_key().map(|k| (KeyFamily::Rsa, k)),
            "EC" => self.to_ec_key().map(|k| (KeyFamily::Ec, k)),
            "OKP" => self.to_okp_key().map(|k| (KeyFamily::Okp, k)),
            _ => Err(KeyDecodeError::UnsupportedKeyType {
                kty: self.kty.clone(),
            }),
        }
    }

    fn to_rsa_key(&self) -> Result<DecodingKey, KeyDecodeError> {
        let n = required(&self.n, "RSA key missing 'n' parameter")?;
        let e = required(&self.e, "RSA key missing 'e' parameter")?;

        DecodingKey::from_rsa_components(n, e).map_err(|e| {
            KeyDecodeError::InvalidKeyFormat(format!("Failed to create RSA key: {e}"))
        })
    }

    fn to_ec_key(&self) -> Result<DecodingKey, KeyDecodeError> {
        let x = required(&self.x, "EC key missing 'x' parameter")?;
        let y = required(&self.y, "EC key missing 'y' parameter")?;

        DecodingKey::from_ec_components(x, y)
            .map_err(|e| KeyDecodeError::InvalidKeyFormat(format!("Failed to create EC key: {e}")))
    }

    fn to_okp_key(&self) -> Result<DecodingKey, KeyDecodeError> {
        if let Some(crv) = &self.crv
            && crv != "Ed25519"
        {
            return Err(KeyDecodeError::UnsupportedKeyType {
                kty: format!("OKP/{crv}"),
            });
        }
        let x = required(&self.x, "OKP key missing 'x' parameter")?;

        DecodingKey::from_ed_components(x).map_err(|e| {
            KeyDecodeError::InvalidKeyFormat(format!("Failed to create Ed25519 key: {e}"))
        })
    }
}

fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str, KeyDecodeError> {
    value
        .as_deref()
        .ok_or_else(|| KeyDecodeError::InvalidKeyFormat(message.to_string()))
}

/// A verification key resolved from the key set.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    family: KeyFamily,
    algorithm: Option<Algorithm>,
    curve: Option<String>,
    key: DecodingKey,
}

// DecodingKey has no useful Debug output
impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("algorithm", &self.algorithm)
            .field("curve", &self.curve)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Build a signing key from a parsed JWK.
    ///
    /// # Errors
    ///
    /// Returns [`KeyDecodeError`] if the JWK has no `kid`, declares an unknown
    /// algorithm, or carries unusable key material.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyDecodeError> {
        let kid = jwk
            .kid
            .clone()
            .ok_or_else(|| KeyDecodeError::InvalidKeyFormat("JWK missing 'kid'".to_string()))?;

        let algorithm = jwk
            .alg
            .as_deref()
            .map(|alg| {
                Algorithm::from_str(alg).map_err(|_| {
                    KeyDecodeError::InvalidKeyFormat(format!("Unknown JWK algorithm '{alg}'"))
                })
            })
            .transpose()?;

        let (family, key) = jwk.to_decoding_key()?;

        if let Some(alg) = algorithm
            && KeyFamily::of(alg) != Some(family)
        {
            return Err(KeyDecodeError::InvalidKeyFormat(format!(
                "JWK algorithm {alg:?} does not match key type {}",
                jwk.kty
            )));
        }

        Ok(Self {
            kid,
            family,
            algorithm,
            curve: jwk.crv.clone(),
            key,
        })
    }

    /// Key identifier
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm family of the key material
    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Algorithm pinned by the JWK `alg` member, if any
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Whether this key may verify a signature declared as `alg`.
    pub fn supports(&self, alg: Algorithm) -> bool {
        if let Some(pinned) = self.algorithm {
            return pinned == alg;
        }
        if KeyFamily::of(alg) != Some(self.family) {
            return false;
        }
        match (alg, self.curve.as_deref()) {
            (Algorithm::ES256, Some(crv)) => crv == "P-256",
            (Algorithm::ES384, Some(crv)) => crv == "P-384",
            _ => true,
        }
    }

    /// The verification key for `jsonwebtoken`
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

/// An immutable snapshot of the key-set document.
#[derive(Debug)]
pub struct KeySet {
    keys: Vec<Arc<SigningKey>>,
    fetched_at: SystemTime,
}

impl KeySet {
    /// Parse a key-set document.
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::MissingKeys`] if the document has no `keys` array
    /// and [`KeySetError::NoSigningKeys`] if no entry is a usable signing key.
    pub fn from_document(document: &Value) -> Result<Self, KeySetError> {
        let entries = document
            .get("keys")
            .and_then(Value::as_array)
            .ok_or(KeySetError::MissingKeys)?;

        let mut keys: Vec<Arc<SigningKey>> = Vec::with_capacity(entries.len());
        for entry in entries {
            let jwk: Jwk = match serde_json::from_value(entry.clone()) {
                Ok(jwk) => jwk,
                Err(e) => {
                    warn!(error = %e, "Skipping unparsable JWK entry");
                    continue;
                }
            };

            if let Some(key_use) = &jwk.key_use
                && key_use != "sig"
            {
                debug!(kid = ?jwk.kid, key_use = %key_use, "Skipping non-signing JWK");
                continue;
            }

            let key = match SigningKey::from_jwk(&jwk) {
                Ok(key) => key,
                Err(e) => {
                    warn!(kid = ?jwk.kid, kty = %jwk.kty, error = %e, "Skipping unusable JWK");
                    continue;
                }
            };

            if keys.iter().any(|existing| existing.kid == key.kid) {
                debug!(kid = %key.kid, "Duplicate kid in key set, keeping first occurrence");
                continue;
            }

            debug!(kid = %key.kid, kty = %jwk.kty, alg = ?jwk.alg, "Parsed JWK");
            keys.push(Arc::new(key));
        }

        if keys.is_empty() {
            return Err(KeySetError::NoSigningKeys);
        }

        Ok(Self {
            keys,
            fetched_at: SystemTime::now(),
        })
    }

    /// Look up a key by identifier.
    pub fn find(&self, kid: &str) -> Option<&Arc<SigningKey>> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    /// Keys in document order
    pub fn keys(&self) -> &[Arc<SigningKey>] {
        &self.keys
    }

    /// Number of usable keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set is empty (never true for a parsed set)
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// When this snapshot was fetched
    pub fn fetched_at(&self) -> SystemTime {
        self.fetched_at
    }
}
