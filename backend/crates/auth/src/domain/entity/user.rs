//! User Entity

use chrono::{DateTime, Utc};

use crate::domain::value_object::{
    email::Email, ids::UserId, user_name::UserName, user_password::UserPassword,
    user_role::UserRole,
};

pub const DEFAULT_AVATAR: &str = "static/fox-icon.png";

/// Registered account
///
/// `is_email_verified` only ever goes from false to true, through the
/// verification flow.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: UserId,
    /// Unique, lower-cased
    pub email: Email,
    pub password: UserPassword,
    /// Unique on its canonical form
    pub name: UserName,
    pub role: UserRole,
    pub avatar: String,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Fresh, unverified account with the default role and avatar
    pub fn new(email: Email, name: UserName, password: UserPassword) -> Self {
        let now = Utc::now();
        Self {
            user_id: UserId::new(),
            email,
            password,
            name,
            role: UserRole::default(),
            avatar: DEFAULT_AVATAR.to_string(),
            is_email_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_email_verified(&mut self, now: DateTime<Utc>) {
        if !self.is_email_verified {
            self.is_email_verified = true;
            self.updated_at = now;
        }
    }
}
