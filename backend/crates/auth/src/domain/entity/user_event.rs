//! User Events
//!
//! Fanned out on the stats bus and appended to `user_stat`.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::domain::value_object::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEventKind {
    Register,
    Login,
}

impl UserEventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            UserEventKind::Register => "user.register",
            UserEventKind::Login => "user.login",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "user.register" => Some(UserEventKind::Register),
            "user.login" => Some(UserEventKind::Login),
            _ => None,
        }
    }
}

impl fmt::Display for UserEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEvent {
    pub user_id: UserId,
    pub kind: UserEventKind,
    pub at: DateTime<Utc>,
}

impl UserEvent {
    pub fn now(user_id: UserId, kind: UserEventKind) -> Self {
        Self {
            user_id,
            kind,
            at: Utc::now(),
        }
    }
}
