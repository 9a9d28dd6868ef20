//! In-memory Repository
//!
//! Same contract as `PgAuthRepository`, used by the test suites and for
//! running without a database. Registration writes its outbox rows into a
//! shared `MemoryOutbox`, only when the hook succeeds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use jobs::{MemoryOutbox, OutboxBatch};

use crate::domain::entity::{
    profile::Profile,
    token::{Token, TokenScope},
    user::User,
    user_event::UserEvent,
    verify_email::{NewVerifyEmail, VerifyEmail},
};
use crate::domain::hook::RegistrationHook;
use crate::domain::repository::{
    ProfileRepository, StatRepository, TokenRepository, UserRepository, VerifyEmailRepository,
};
use crate::domain::value_object::{
    email::Email,
    ids::{UserId, VerifyEmailId},
    user_name::UserName,
    user_role::UserRole,
};
use crate::error::{AuthError, AuthResult};

struct StoredToken {
    user_id: UserId,
    expiry: DateTime<Utc>,
    scope: TokenScope,
}

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    profiles: HashMap<UserId, Profile>,
    tokens: HashMap<[u8; 32], StoredToken>,
    verify_emails: Vec<VerifyEmail>,
    stats: Vec<UserEvent>,
    failing_profile_creates: u32,
}

impl State {
    fn taken(&self, email: &Email, name: &UserName) -> bool {
        self.users
            .values()
            .any(|u| &u.email == email || u.name.canonical() == name.canonical())
    }
}

pub struct MemoryAuthRepository {
    state: Mutex<State>,
    /// Held from the duplicate check until the user row is in
    registrations: tokio::sync::Mutex<()>,
    outbox: Arc<MemoryOutbox>,
}

impl MemoryAuthRepository {
    pub fn new(outbox: Arc<MemoryOutbox>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            registrations: tokio::sync::Mutex::new(()),
            outbox,
        }
    }

    fn lock(&self) -> AuthResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| AuthError::Internal("memory store lock poisoned".to_string()))
    }

    pub fn outbox(&self) -> &Arc<MemoryOutbox> {
        &self.outbox
    }

    /// Fail the next `n` profile inserts
    pub fn fail_profile_creates(&self, n: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_profile_creates = n;
        }
    }

    /// Promote or demote; there is no HTTP route for this
    pub fn set_role(&self, user_id: &UserId, role: UserRole) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        match state.users.get_mut(user_id) {
            Some(user) => {
                user.role = role;
                true
            }
            None => false,
        }
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().map(|s| s.users.len()).unwrap_or_default()
    }

    /// Token rows held for a user, expired ones included
    pub fn tokens_for(&self, user_id: &UserId) -> usize {
        self.state
            .lock()
            .map(|s| s.tokens.values().filter(|t| &t.user_id == user_id).count())
            .unwrap_or_default()
    }

    pub fn verify_emails_for(&self, user_id: &UserId) -> Vec<VerifyEmail> {
        self.state
            .lock()
            .map(|s| {
                s.verify_emails
                    .iter()
                    .filter(|v| &v.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every issued code, oldest first
    pub fn verify_emails(&self) -> Vec<VerifyEmail> {
        self.state
            .lock()
            .map(|s| s.verify_emails.clone())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> Vec<UserEvent> {
        self.state.lock().map(|s| s.stats.clone()).unwrap_or_default()
    }
}

impl Default for MemoryAuthRepository {
    fn default() -> Self {
        Self::new(Arc::new(MemoryOutbox::new()))
    }
}

impl UserRepository for MemoryAuthRepository {
    async fn create_with_hook<H>(&self, user: &User, hook: &H) -> AuthResult<()>
    where
        H: RegistrationHook + Sync,
    {
        let _registering = self.registrations.lock().await;
        if self.lock()?.taken(&user.email, &user.name) {
            return Err(AuthError::UserExists);
        }

        // Nothing is written until the hook has succeeded
        let mut batch = OutboxBatch::new();
        hook.after_create(user, &mut batch)
            .await
            .map_err(|e| match e {
                AuthError::RegistrationHook(_) => e,
                other => AuthError::RegistrationHook(other.to_string()),
            })?;

        let mut state = self.lock()?;
        self.outbox
            .insert_batch(batch)
            .map_err(|e| AuthError::RegistrationHook(e.to_string()))?;
        state.users.insert(user.user_id, user.clone());

        Ok(())
    }

    async fn find_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>> {
        Ok(self.lock()?.users.get(user_id).cloned())
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| &u.email == email)
            .cloned())
    }

    async fn find_by_name(&self, name: &UserName) -> AuthResult<Option<User>> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.name.canonical() == name.canonical())
            .cloned())
    }

    async fn exists_by_email_or_name(&self, email: &Email, name: &UserName) -> AuthResult<bool> {
        Ok(self.lock()?.taken(email, name))
    }

    async fn delete(&self, user_id: &UserId) -> AuthResult<bool> {
        let mut state = self.lock()?;
        let removed = state.users.remove(user_id).is_some();
        if removed {
            state.profiles.remove(user_id);
            state.tokens.retain(|_, t| &t.user_id != user_id);
            state.verify_emails.retain(|v| &v.user_id != user_id);
        }
        Ok(removed)
    }
}

impl ProfileRepository for MemoryAuthRepository {
    async fn create(&self, profile: &Profile) -> AuthResult<()> {
        let mut state = self.lock()?;
        if state.failing_profile_creates > 0 {
            state.failing_profile_creates -= 1;
            return Err(AuthError::Internal("injected profile failure".to_string()));
        }
        if state.profiles.contains_key(&profile.user_id) {
            return Err(AuthError::Internal("profile already exists".to_string()));
        }
        state.profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn find_by_user_id(&self, user_id: &UserId) -> AuthResult<Option<Profile>> {
        Ok(self.lock()?.profiles.get(user_id).cloned())
    }

    async fn create_default_if_missing(&self, user_id: &UserId) -> AuthResult<bool> {
        let mut state = self.lock()?;
        if state.profiles.contains_key(user_id) {
            return Ok(false);
        }
        state
            .profiles
            .insert(*user_id, Profile::default_for(*user_id));
        Ok(true)
    }
}

impl TokenRepository for MemoryAuthRepository {
    async fn replace_for_user(&self, token: &Token) -> AuthResult<()> {
        let mut state = self.lock()?;
        if !state.users.contains_key(&token.user_id) {
            return Err(AuthError::UserNotFound);
        }
        state.tokens.retain(|_, t| t.user_id != token.user_id);
        state.tokens.insert(
            token.hash,
            StoredToken {
                user_id: token.user_id,
                expiry: token.expiry,
                scope: token.scope,
            },
        );
        Ok(())
    }

    async fn find_user_by_token(
        &self,
        hash: &[u8; 32],
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<User>> {
        let state = self.lock()?;
        let user = state
            .tokens
            .get(hash)
            .filter(|t| t.scope == scope && t.expiry > now)
            .and_then(|t| state.users.get(&t.user_id))
            .cloned();
        Ok(user)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let mut state = self.lock()?;
        let before = state.tokens.len();
        state.tokens.retain(|_, t| t.expiry > now);
        Ok((before - state.tokens.len()) as u64)
    }
}

impl VerifyEmailRepository for MemoryAuthRepository {
    async fn create(&self, code: NewVerifyEmail) -> AuthResult<VerifyEmail> {
        let mut state = self.lock()?;
        if !state.users.contains_key(&code.user_id) {
            return Err(AuthError::UserNotFound);
        }
        let id = VerifyEmailId(state.verify_emails.len() as i64 + 1);
        let code = code.with_id(id);
        state.verify_emails.push(code.clone());
        Ok(code)
    }

    async fn confirm(
        &self,
        id: VerifyEmailId,
        secret_code: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<User> {
        let mut state = self.lock()?;

        let code = state
            .verify_emails
            .iter()
            .find(|v| v.id == id && v.accepts(secret_code, now))
            .ok_or(AuthError::VerificationNotFound)?;
        let owner = code.user_id;

        // Check the owner before consuming so a miss leaves the code untouched
        if !state.users.contains_key(&owner) {
            return Err(AuthError::UserNotFound);
        }
        if let Some(code) = state.verify_emails.iter_mut().find(|v| v.id == id) {
            code.is_used = true;
        }

        let user = state
            .users
            .get_mut(&owner)
            .ok_or(AuthError::UserNotFound)?;
        user.mark_email_verified(now);
        Ok(user.clone())
    }
}

impl StatRepository for MemoryAuthRepository {
    async fn record(&self, event: &UserEvent) -> AuthResult<()> {
        self.lock()?.stats.push(event.clone());
        Ok(())
    }
}
