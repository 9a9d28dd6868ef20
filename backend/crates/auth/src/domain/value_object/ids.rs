//! Identifiers

use kernel::id::Id;
use serde::{Deserialize, Serialize};
use std::fmt;

pub struct UserMarker;

/// UUID v4 user identity
pub type UserId = Id<UserMarker>;

/// Numeric id of a verification code row, carried in the link as `email_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerifyEmailId(pub i64);

impl VerifyEmailId {
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for VerifyEmailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_is_v4() {
        assert_eq!(UserId::new().as_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_verify_email_id_serializes_as_number() {
        assert_eq!(serde_json::to_string(&VerifyEmailId(42)).unwrap(), "42");
    }
}
