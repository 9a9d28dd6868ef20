//! Get Profile Use Case
//!
//! A user committed without a profile gets one on first read: the miss is
//! reported and a default row is inserted for the next call.

use std::sync::Arc;

use crate::application::config::AuthConfig;
use crate::application::deadline::bounded;
use crate::domain::entity::profile::Profile;
use crate::domain::repository::ProfileRepository;
use crate::domain::value_object::ids::UserId;
use crate::error::{AuthError, AuthResult};

pub struct GetProfileUseCase<R> {
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> GetProfileUseCase<R>
where
    R: ProfileRepository + Send + Sync,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    pub async fn execute(&self, user_id: &UserId) -> AuthResult<Profile> {
        let timeout = self.config.store_timeout;

        if let Some(profile) =
            bounded(timeout, "find_profile", self.repo.find_by_user_id(user_id)).await?
        {
            return Ok(profile);
        }

        let inserted = bounded(
            timeout,
            "repair_profile",
            self.repo.create_default_if_missing(user_id),
        )
        .await?;
        tracing::warn!(user_id = %user_id, inserted, "Profile missing, default profile created");

        Err(AuthError::ProfileNotFound)
    }
}
