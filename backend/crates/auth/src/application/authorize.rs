//! Authorize Use Case
//!
//! Resolves a bearer token to its user. Every failure is the same
//! `Unauthorized`; the role check on top reports `Forbidden`.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::application::config::AuthConfig;
use crate::application::deadline::bounded;
use crate::domain::entity::token::{TokenScope, hash_token};
use crate::domain::entity::user::User;
use crate::domain::repository::TokenRepository;
use crate::domain::value_object::{ids::UserId, user_role::UserRole};
use crate::error::{AuthError, AuthResult};

/// The caller behind a valid token, stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedUser {
    pub user_id: UserId,
    pub email: String,
    pub name: String,
    pub role: UserRole,
}

impl From<&User> for AuthorizedUser {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email.as_str().to_string(),
            name: user.name.display().to_string(),
            role: user.role,
        }
    }
}

pub struct AuthorizeUseCase<R> {
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> AuthorizeUseCase<R>
where
    R: TokenRepository + Send + Sync,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    pub async fn authorize(&self, plaintext: &str) -> AuthResult<AuthorizedUser> {
        if plaintext.is_empty() {
            return Err(AuthError::Unauthorized);
        }

        let hash = hash_token(plaintext);
        let user = bounded(
            self.config.store_timeout,
            "find_user_by_token",
            self.repo
                .find_user_by_token(&hash, TokenScope::Authentication, Utc::now()),
        )
        .await?
        .ok_or(AuthError::Unauthorized)?;

        Ok(AuthorizedUser::from(&user))
    }

    /// `authorize`, then require admin or moderator
    pub async fn require_staff(&self, plaintext: &str) -> AuthResult<AuthorizedUser> {
        let user = self.authorize(plaintext).await?;
        ensure_staff(&user)?;
        Ok(user)
    }
}

pub fn ensure_staff(user: &AuthorizedUser) -> AuthResult<()> {
    if user.role.is_staff() {
        Ok(())
    } else {
        tracing::debug!(user_id = %user.user_id, role = %user.role.code(), "Staff role required");
        Err(AuthError::Forbidden)
    }
}
