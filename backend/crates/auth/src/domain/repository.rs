//! Repository Traits
//!
//! Interfaces for data persistence. Implementations live in `infra`.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::entity::{
    profile::Profile,
    snapshot::UserSnapshot,
    token::{Token, TokenScope},
    user::User,
    user_event::UserEvent,
    verify_email::{NewVerifyEmail, VerifyEmail},
};
use crate::domain::hook::RegistrationHook;
use crate::domain::value_object::{
    email::Email,
    ids::{UserId, VerifyEmailId},
    user_name::UserName,
};
use crate::error::AuthResult;

/// Credential store
#[trait_variant::make(UserRepository: Send)]
pub trait LocalUserRepository {
    /// Insert `user` and run `hook` in one transaction.
    ///
    /// Duplicate email or name is `UserExists`; a failing hook is
    /// `RegistrationHook` and nothing is persisted.
    async fn create_with_hook<H>(&self, user: &User, hook: &H) -> AuthResult<()>
    where
        H: RegistrationHook + Sync;

    async fn find_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>>;

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>>;

    /// Lookup on the canonical name
    async fn find_by_name(&self, name: &UserName) -> AuthResult<Option<User>>;

    async fn exists_by_email_or_name(&self, email: &Email, name: &UserName) -> AuthResult<bool>;

    /// Remove a user and everything that hangs off it
    async fn delete(&self, user_id: &UserId) -> AuthResult<bool>;
}

#[trait_variant::make(ProfileRepository: Send)]
pub trait LocalProfileRepository {
    async fn create(&self, profile: &Profile) -> AuthResult<()>;

    async fn find_by_user_id(&self, user_id: &UserId) -> AuthResult<Option<Profile>>;

    /// Insert defaults unless a row exists; true when a row was inserted
    async fn create_default_if_missing(&self, user_id: &UserId) -> AuthResult<bool>;
}

/// Token store: one active token per user
#[trait_variant::make(TokenRepository: Send)]
pub trait LocalTokenRepository {
    /// Delete every token of the user and insert `token`, under a row lock
    /// on the user
    async fn replace_for_user(&self, token: &Token) -> AuthResult<()>;

    /// Owner of an unexpired token with this hash and scope
    async fn find_user_by_token(
        &self,
        hash: &[u8; 32],
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<User>>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> AuthResult<u64>;
}

#[trait_variant::make(VerifyEmailRepository: Send)]
pub trait LocalVerifyEmailRepository {
    async fn create(&self, code: NewVerifyEmail) -> AuthResult<VerifyEmail>;

    /// In one transaction: mark the code used if it is unused, unexpired and
    /// the secret matches, then flip the owner's verified flag.
    /// Any miss is `VerificationNotFound`.
    async fn confirm(
        &self,
        id: VerifyEmailId,
        secret_code: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<User>;
}

#[trait_variant::make(StatRepository: Send)]
pub trait LocalStatRepository {
    async fn record(&self, event: &UserEvent) -> AuthResult<()>;
}

/// Best-effort snapshot cache keyed by `user:{id}`
#[trait_variant::make(UserCache: Send)]
pub trait LocalUserCache {
    async fn put(&self, snapshot: &UserSnapshot, ttl: Duration) -> AuthResult<()>;

    async fn get(&self, user_id: &UserId) -> AuthResult<Option<UserSnapshot>>;
}
