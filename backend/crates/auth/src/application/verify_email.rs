//! Verify Email Use Case

use std::sync::Arc;

use chrono::Utc;

use crate::domain::entity::user::User;
use crate::domain::repository::VerifyEmailRepository;
use crate::domain::value_object::ids::VerifyEmailId;
use crate::error::{AuthError, AuthResult};

pub struct VerifyEmailUseCase<R> {
    repo: Arc<R>,
}

impl<R> VerifyEmailUseCase<R>
where
    R: VerifyEmailRepository + Send + Sync,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Consume the code and mark its owner verified. Used, expired and
    /// mismatched codes all come back as `VerificationNotFound`.
    pub async fn execute(&self, email_id: i64, secret_code: &str) -> AuthResult<User> {
        if secret_code.is_empty() {
            return Err(AuthError::VerificationNotFound);
        }

        let user = self
            .repo
            .confirm(VerifyEmailId(email_id), secret_code, Utc::now())
            .await?;

        tracing::info!(user_id = %user.user_id, email_id, "Email verified");
        Ok(user)
    }
}
