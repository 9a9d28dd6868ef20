//! `Authorization: Bearer` parsing
//!
//! The scheme is matched case-insensitively (RFC 7235). Callers are expected
//! to collapse every [`BearerError`] into one generic "unauthorized" answer.

use http::{HeaderMap, header};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BearerError {
    #[error("Missing Authorization header")]
    Missing,

    #[error("Authorization header is not valid ASCII")]
    NotAscii,

    #[error("Malformed Authorization header")]
    Malformed,

    #[error("Unsupported authorization scheme")]
    WrongScheme,
}

/// Parse an `Authorization` header value into its token.
///
/// ```rust
/// use platform::bearer::parse_bearer;
///
/// assert_eq!(parse_bearer("bearer ABC234").unwrap(), "ABC234");
/// assert!(parse_bearer("Basic ABC234").is_err());
/// ```
pub fn parse_bearer(value: &str) -> Result<&str, BearerError> {
    let mut parts = value.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().map(str::trim).unwrap_or_default();

    if scheme.is_empty() || token.is_empty() {
        return Err(BearerError::Malformed);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(BearerError::WrongScheme);
    }
    if token.contains(char::is_whitespace) {
        return Err(BearerError::Malformed);
    }

    Ok(token)
}

/// Pull the bearer token out of request headers
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, BearerError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(BearerError::Missing)?
        .to_str()
        .map_err(|_| BearerError::NotAscii)?;

    parse_bearer(value)
}
