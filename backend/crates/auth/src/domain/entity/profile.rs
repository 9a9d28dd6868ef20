//! Profile Entity

use chrono::{DateTime, Utc};

use crate::domain::entity::user::DEFAULT_AVATAR;
use crate::domain::value_object::ids::UserId;

pub const DEFAULT_STATUS: &str = "silver";

/// Per-user profile, 1:1 with `User`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub user_id: UserId,
    pub wallet: i64,
    pub status: String,
    pub avatar: String,
    pub about: String,
    pub friends: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn default_for(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            wallet: 0,
            status: DEFAULT_STATUS.to_string(),
            avatar: DEFAULT_AVATAR.to_string(),
            about: String::new(),
            friends: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
