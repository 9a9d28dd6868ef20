//! Register Use Case
//!
//! Creates the user and runs the registration hook in one store
//! transaction, then creates the profile as a separate step.

use std::sync::Arc;

use crate::application::config::AuthConfig;
use crate::application::deadline::bounded;
use crate::application::events::EventBus;
use crate::domain::entity::{
    profile::Profile,
    user::User,
    user_event::{UserEvent, UserEventKind},
};
use crate::domain::hook::RegistrationHook;
use crate::domain::repository::{ProfileRepository, UserRepository};
use crate::domain::value_object::{
    email::Email, user_name::UserName, user_password::UserPassword,
};
use crate::error::{AuthError, AuthResult};

pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub name: String,
}

pub struct RegisterUseCase<R, H> {
    repo: Arc<R>,
    hook: Arc<H>,
    events: EventBus,
    config: Arc<AuthConfig>,
}

impl<R, H> RegisterUseCase<R, H>
where
    R: UserRepository + ProfileRepository + Send + Sync,
    H: RegistrationHook + Send + Sync,
{
    pub fn new(repo: Arc<R>, hook: Arc<H>, events: EventBus, config: Arc<AuthConfig>) -> Self {
        Self {
            repo,
            hook,
            events,
            config,
        }
    }

    pub async fn execute(&self, input: RegisterInput) -> AuthResult<User> {
        let email = Email::parse(&input.email).map_err(|e| AuthError::Validation(e.to_string()))?;
        let name = UserName::parse(&input.name).map_err(|e| AuthError::Validation(e.to_string()))?;

        // Fast path only; the unique indexes decide
        let taken = bounded(
            self.config.store_timeout,
            "exists_by_email_or_name",
            self.repo.exists_by_email_or_name(&email, &name),
        )
        .await?;
        if taken {
            return Err(AuthError::UserExists);
        }

        let password =
            UserPassword::create(input.password, &self.config.hash_cost, self.config.pepper())?;
        let user = User::new(email, name, password);

        self.repo.create_with_hook(&user, self.hook.as_ref()).await?;

        tracing::info!(
            user_id = %user.user_id,
            name = %user.name,
            "User registered"
        );

        // The user is committed from here on; a missing profile is repaired on read
        let profile = Profile::default_for(user.user_id);
        bounded(
            self.config.store_timeout,
            "create_profile",
            ProfileRepository::create(self.repo.as_ref(), &profile),
        )
        .await
        .map_err(|e| AuthError::ProfileCreation(e.to_string()))?;

        self.events
            .publish(UserEvent::now(user.user_id, UserEventKind::Register));

        Ok(user)
    }
}
