//! Cached User Snapshot
//!
//! Denormalized User + Profile written on login. Best-effort: it is never
//! invalidated and the credential store always wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entity::{profile::Profile, user::User};
use crate::domain::value_object::{ids::UserId, user_role::UserRole};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub avatar: String,
    pub status: String,
    pub wallet: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserSnapshot {
    /// Profile fields fall back to defaults when the profile row is missing
    pub fn build(user: &User, profile: Option<&Profile>) -> Self {
        let fallback;
        let profile = match profile {
            Some(p) => p,
            None => {
                fallback = Profile::default_for(user.user_id);
                &fallback
            }
        };

        Self {
            id: user.user_id,
            email: user.email.as_str().to_string(),
            name: user.name.display().to_string(),
            role: user.role,
            avatar: profile.avatar.clone(),
            status: profile.status.clone(),
            wallet: profile.wallet,
            created_at: user.created_at,
            updated_at: user.updated_at.max(profile.updated_at),
        }
    }

    pub fn cache_key(user_id: &UserId) -> String {
        format!("user:{user_id}")
    }
}
