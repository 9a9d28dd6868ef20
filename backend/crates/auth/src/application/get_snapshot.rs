//! Get Snapshot Use Case
//!
//! Serves the caller's denormalized identity from the snapshot cache. A miss
//! (or an unreachable cache) rebuilds it from the store and writes it back.
//! A profile edit can stay invisible here until the entry expires.

use std::sync::Arc;

use crate::application::config::AuthConfig;
use crate::application::deadline::bounded;
use crate::domain::entity::snapshot::UserSnapshot;
use crate::domain::repository::{ProfileRepository, UserCache, UserRepository};
use crate::domain::value_object::ids::UserId;
use crate::error::{AuthError, AuthResult};

pub struct GetSnapshotUseCase<R, C> {
    repo: Arc<R>,
    cache: Arc<C>,
    config: Arc<AuthConfig>,
}

impl<R, C> GetSnapshotUseCase<R, C>
where
    R: UserRepository + ProfileRepository + Send + Sync,
    C: UserCache + Send + Sync,
{
    pub fn new(repo: Arc<R>, cache: Arc<C>, config: Arc<AuthConfig>) -> Self {
        Self {
            repo,
            cache,
            config,
        }
    }

    pub async fn execute(&self, user_id: &UserId) -> AuthResult<UserSnapshot> {
        let timeout = self.config.store_timeout;

        match bounded(timeout, "cache_get", self.cache.get(user_id)).await {
            Ok(Some(snapshot)) => return Ok(snapshot),
            Ok(None) => {}
            Err(e) => tracing::warn!(
                key = %UserSnapshot::cache_key(user_id),
                error = %e,
                "Snapshot cache read failed, falling back to the store"
            ),
        }

        let user = bounded(timeout, "find_user_by_id", self.repo.find_by_id(user_id))
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let profile = bounded(timeout, "find_profile", self.repo.find_by_user_id(user_id)).await?;

        let snapshot = UserSnapshot::build(&user, profile.as_ref());
        if let Err(e) = bounded(
            timeout,
            "cache_put",
            self.cache.put(&snapshot, self.config.cache_ttl),
        )
        .await
        {
            tracing::warn!(key = %UserSnapshot::cache_key(user_id), error = %e, "Failed to cache user snapshot");
        }

        Ok(snapshot)
    }
}
