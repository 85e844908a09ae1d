//! Verified token claims
//!
//! [`Claims`] is the decoded payload of a verified token, kept verbatim. The
//! accessors below read the registered claims (RFC 7519 Section 4.1) without
//! rewriting anything; claims this crate does not understand are preserved.

use std::ops::Deref;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims of a verified token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Wrap an already-decoded claims object.
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Issuer (iss)
    pub fn iss(&self) -> Option<&str> {
        self.0.get("iss").and_then(Value::as_str)
    }

    /// Subject (sub)
    pub fn sub(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    /// Audience (aud), which may be a single string or an array of strings
    pub fn aud(&self) -> Vec<&str> {
        match self.0.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Expiration Time (exp) as a Unix timestamp
    pub fn exp(&self) -> Option<i64> {
        self.numeric("exp")
    }

    /// Not Before (nbf) as a Unix timestamp
    pub fn nbf(&self) -> Option<i64> {
        self.numeric("nbf")
    }

    /// Issued At (iat) as a Unix timestamp
    pub fn iat(&self) -> Option<i64> {
        self.numeric("iat")
    }

    /// A NumericDate claim. Fractional seconds are truncated.
    pub fn numeric(&self, name: &str) -> Option<i64> {
        let value = self.0.get(name)?;
        value
            .as_i64()
            .or_else(|| value.as_u64().and_then(|v| i64::try_from(v).ok()))
            .or_else(|| value.as_f64().map(|v| v as i64))
    }

    /// The underlying claims object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the underlying claims object.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl Deref for Claims {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
