//! Verification Code
//!
//! One row per issued code. Rows are never deleted; confirming flips
//! `is_used` once and for all.

use chrono::{DateTime, Utc};
use platform::crypto::random_alphanumeric;
use std::time::Duration;

use crate::domain::value_object::{email::Email, ids::UserId, ids::VerifyEmailId};

pub const SECRET_CODE_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyEmail {
    pub id: VerifyEmailId,
    pub user_id: UserId,
    /// Address the code was sent to
    pub email: Email,
    pub secret_code: String,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

impl VerifyEmail {
    /// Unused, unexpired and the secret matches
    pub fn accepts(&self, secret_code: &str, now: DateTime<Utc>) -> bool {
        !self.is_used
            && self.expired_at > now
            && platform::crypto::constant_time_eq(self.secret_code.as_bytes(), secret_code.as_bytes())
    }

    /// `{base}?email_id={id}&secret_code={secret}`
    pub fn link(&self, verify_url_base: &str) -> String {
        format!(
            "{verify_url_base}?email_id={}&secret_code={}",
            self.id, self.secret_code
        )
    }
}

/// Code about to be inserted; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewVerifyEmail {
    pub user_id: UserId,
    pub email: Email,
    pub secret_code: String,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

impl NewVerifyEmail {
    pub fn generate(user_id: UserId, email: Email, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            email,
            secret_code: random_alphanumeric(SECRET_CODE_LENGTH),
            created_at: now,
            expired_at: now
                + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(15)),
        }
    }

    pub fn with_id(self, id: VerifyEmailId) -> VerifyEmail {
        VerifyEmail {
            id,
            user_id: self.user_id,
            email: self.email,
            secret_code: self.secret_code,
            is_used: false,
            created_at: self.created_at,
            expired_at: self.expired_at,
        }
    }
}
