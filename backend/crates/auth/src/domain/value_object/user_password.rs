//! User Password Value Object
//!
//! Stored Argon2id hash of a user's password. Hashing and verification are
//! delegated to `platform::password`.

use platform::password::{ClearTextPassword, HashCost, HashedPassword};
use std::fmt;

use crate::error::{AuthError, AuthResult};

#[derive(Clone, PartialEq, Eq)]
pub struct UserPassword(HashedPassword);

impl UserPassword {
    /// Apply the password policy, then hash
    pub fn create(raw: String, cost: &HashCost, pepper: Option<&[u8]>) -> AuthResult<Self> {
        let clear = ClearTextPassword::new(raw)?;
        clear
            .hash_at(cost, pepper)
            .map(Self)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    pub fn from_db(phc: impl Into<String>) -> AuthResult<Self> {
        HashedPassword::from_phc_string(phc)
            .map(Self)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    pub fn as_phc_string(&self) -> &str {
        self.0.as_phc_string()
    }

    /// Constant-time check of a presented password.
    /// No policy is applied to `raw`; the stored hash is the only authority.
    pub fn verify(&self, raw: String, pepper: Option<&[u8]>) -> bool {
        self.0
            .verify(&ClearTextPassword::for_verification(raw), pepper)
    }
}

impl fmt::Debug for UserPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserPassword([HASH])")
    }
}
