//! `Authorization` header parsing

use thiserror::Error;

/// Default scheme keyword
pub const BEARER: &str = "Bearer";

/// The header names the expected scheme but carries no usable token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    /// Scheme keyword without a token
    #[error("Invalid token header. No credentials provided.")]
    MissingToken,

    /// More than one word after the scheme keyword
    #[error("Invalid token header. Token string should not contain spaces.")]
    ContainsSpaces,
}

/// Extract the token from an `Authorization` header value.
///
/// Returns `Ok(None)` when the header is absent, empty, or uses another
/// scheme, so other authentication mechanisms can still handle the request.
/// The keyword comparison is case-insensitive.
///
/// # Errors
///
/// Returns [`HeaderError`] when the header uses `keyword` but is not
/// `<keyword> <token>`.
///
/// # Example
///
/// ```rust
/// use jwks_auth::bearer::{BEARER, extract_bearer};
///
/// assert_eq!(extract_bearer(Some("Bearer abc.def.ghi"), BEARER), Ok(Some("abc.def.ghi")));
/// assert_eq!(extract_bearer(Some("Basic dXNlcjpwdw=="), BEARER), Ok(None));
/// assert_eq!(extract_bearer(None, BEARER), Ok(None));
/// ```
pub fn extract_bearer<'a>(
    header: Option<&'a str>,
    keyword: &str,
) -> Result<Option<&'a str>, HeaderError> {
    let Some(header) = header else {
        return Ok(None);
    };

    let mut parts = header.split_whitespace();
    match parts.next() {
        Some(scheme) if scheme.eq_ignore_ascii_case(keyword) => {}
        _ => return Ok(None),
    }

    match (parts.next(), parts.next()) {
        (None, _) => Err(HeaderError::MissingToken),
        (Some(_), Some(_)) => Err(HeaderError::ContainsSpaces),
        (Some(token), None) => Ok(Some(token)),
    }
}
