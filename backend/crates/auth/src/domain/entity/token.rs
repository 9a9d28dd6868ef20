//! Bearer Token
//!
//! 16 random bytes, sent to the client as unpadded base32 (26 chars) and
//! stored only as the SHA-256 of that text.

use chrono::{DateTime, Utc};
use platform::crypto::{random_bytes, sha256, to_base32_nopad};
use std::fmt;
use std::time::Duration;

use crate::domain::value_object::ids::UserId;

const TOKEN_SECRET_BYTES: usize = 16;

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScope {
    Authentication,
}

impl TokenScope {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Authentication => "authentication",
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A freshly issued token. The plaintext exists only here.
#[derive(Clone)]
pub struct Token {
    pub plaintext: String,
    pub hash: [u8; 32],
    pub user_id: UserId,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

impl Token {
    pub fn generate(user_id: UserId, ttl: Duration, scope: TokenScope) -> Self {
        let plaintext = to_base32_nopad(&random_bytes(TOKEN_SECRET_BYTES));
        let hash = hash_token(&plaintext);
        let expiry = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(48));

        Self {
            plaintext,
            hash,
            user_id,
            expiry,
            scope,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Digest stored and looked up in place of the plaintext
pub fn hash_token(plaintext: &str) -> [u8; 32] {
    sha256(plaintext.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_shape() {
        let token = Token::generate(
            UserId::new(),
            Duration::from_secs(48 * 3600),
            TokenScope::Authentication,
        );
        assert_eq!(token.plaintext.len(), 26);
        assert!(
            token
                .plaintext
                .chars()
                .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c))
        );
    }

    #[test]
    fn test_hash_matches_plaintext() {
        let token = Token::generate(UserId::new(), Duration::from_secs(60), TokenScope::Authentication);
        assert_eq!(token.hash, hash_token(&token.plaintext));
        assert_ne!(token.hash, hash_token("SOMETHINGELSE"));
    }

    #[test]
    fn test_expiry_uses_ttl() {
        let before = Utc::now();
        let token = Token::generate(
            UserId::new(),
            Duration::from_secs(48 * 3600),
            TokenScope::Authentication,
        );
        let lifetime = token.expiry - before;
        assert!(lifetime >= chrono::Duration::hours(48));
        assert!(lifetime < chrono::Duration::hours(48) + chrono::Duration::seconds(5));
    }

    #[test]
    fn test_tokens_are_unique_and_debug_is_redacted() {
        let a = Token::generate(UserId::new(), Duration::from_secs(60), TokenScope::Authentication);
        let b = Token::generate(UserId::new(), Duration::from_secs(60), TokenScope::Authentication);
        assert_ne!(a.plaintext, b.plaintext);
        assert!(!format!("{a:?}").contains(&a.plaintext));
    }
}
