//! Sign In Use Case
//!
//! Checks email and password, then issues the user's only bearer token.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::application::config::AuthConfig;
use crate::application::deadline::bounded;
use crate::application::events::EventBus;
use crate::domain::entity::{
    snapshot::UserSnapshot,
    token::{Token, TokenScope},
    user::User,
    user_event::{UserEvent, UserEventKind},
};
use crate::domain::repository::{ProfileRepository, TokenRepository, UserCache, UserRepository};
use crate::domain::value_object::email::Email;
use crate::error::{AuthError, AuthResult};

/// Sign in input
pub struct SignInInput {
    pub email: String,
    pub password: String,
}

/// Sign in output
pub struct SignInOutput {
    /// Shown once, never stored
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// Sign in use case
pub struct SignInUseCase<R, C> {
    repo: Arc<R>,
    cache: Arc<C>,
    events: EventBus,
    config: Arc<AuthConfig>,
}

impl<R, C> SignInUseCase<R, C>
where
    R: UserRepository + ProfileRepository + TokenRepository + Send + Sync,
    C: UserCache + Send + Sync,
{
    pub fn new(repo: Arc<R>, cache: Arc<C>, events: EventBus, config: Arc<AuthConfig>) -> Self {
        Self {
            repo,
            cache,
            events,
            config,
        }
    }

    pub async fn execute(&self, input: SignInInput) -> AuthResult<SignInOutput> {
        let timeout = self.config.store_timeout;

        // A malformed email can't belong to anyone
        let email = Email::parse(&input.email).map_err(|_| AuthError::InvalidCredentials)?;

        let user = bounded(timeout, "find_user_by_email", self.repo.find_by_email(&email))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.password.verify(input.password, self.config.pepper()) {
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_email_verified {
            return Err(AuthError::Unverified);
        }

        let token = Token::generate(user.user_id, self.config.token_ttl, TokenScope::Authentication);
        bounded(timeout, "replace_token", self.repo.replace_for_user(&token)).await?;

        self.write_snapshot(&user).await;

        self.events
            .publish(UserEvent::now(user.user_id, UserEventKind::Login));

        tracing::info!(
            user_id = %user.user_id,
            expires_at = %token.expiry,
            "User signed in"
        );

        Ok(SignInOutput {
            token: token.plaintext,
            expires_at: token.expiry,
            user,
        })
    }

    /// Cache trouble never fails the login
    async fn write_snapshot(&self, user: &User) {
        let timeout = self.config.store_timeout;

        let profile = match bounded(timeout, "find_profile", self.repo.find_by_user_id(&user.user_id)).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(user_id = %user.user_id, error = %e, "Profile lookup for snapshot failed");
                None
            }
        };

        let snapshot = UserSnapshot::build(user, profile.as_ref());
        if let Err(e) = bounded(timeout, "cache_put", self.cache.put(&snapshot, self.config.cache_ttl)).await {
            tracing::warn!(
                key = %UserSnapshot::cache_key(&user.user_id),
                error = %e,
                "Failed to cache user snapshot"
            );
        }
    }
}
