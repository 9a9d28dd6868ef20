//! Verification Mail Worker
//!
//! Handles `task:send_verify_email`. The payload only names the user; the
//! current row is re-read so a changed email or a deleted account is seen.
//! Every delivery issues a fresh code, earlier codes stay valid until expiry.

use std::sync::Arc;
use std::time::Duration;

use jobs::{EnqueueOptions, Job, ProcessError, QueueName, TaskHandler};
use platform::mail::MailSender;
use serde::{Deserialize, Serialize};

use crate::application::config::AuthConfig;
use crate::application::deadline::bounded;
use crate::domain::entity::user::User;
use crate::domain::entity::verify_email::{NewVerifyEmail, VerifyEmail};
use crate::domain::repository::{UserRepository, VerifyEmailRepository};
use crate::domain::value_object::user_name::UserName;
use crate::error::AuthError;

pub const TASK_SEND_VERIFY_EMAIL: &str = "task:send_verify_email";

const VERIFY_EMAIL_MAX_RETRY: u32 = 10;
const VERIFY_EMAIL_DELAY: Duration = Duration::from_secs(5);

/// Wire payload: `{"name": "<username>"}`. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyEmailPayload {
    pub name: String,
}

impl VerifyEmailPayload {
    pub fn for_user(user: &User) -> Self {
        Self {
            name: user.name.display().to_string(),
        }
    }
}

/// Critical queue, ten retries, first attempt after five seconds
pub fn verify_email_options() -> EnqueueOptions {
    EnqueueOptions::new()
        .queue(QueueName::Critical)
        .max_retry(VERIFY_EMAIL_MAX_RETRY)
        .process_in(VERIFY_EMAIL_DELAY)
}

pub struct SendVerifyEmailHandler<R, M> {
    repo: Arc<R>,
    mailer: Arc<M>,
    config: Arc<AuthConfig>,
}

impl<R, M> SendVerifyEmailHandler<R, M> {
    pub fn new(repo: Arc<R>, mailer: Arc<M>, config: Arc<AuthConfig>) -> Self {
        Self {
            repo,
            mailer,
            config,
        }
    }
}

impl<R, M> TaskHandler for SendVerifyEmailHandler<R, M>
where
    R: UserRepository + VerifyEmailRepository + Send + Sync,
    M: MailSender + Send + Sync,
{
    async fn process(&self, job: &Job) -> Result<(), ProcessError> {
        let payload: VerifyEmailPayload = job.decode().map_err(|e| {
            ProcessError::terminal(format!("undecodable payload: {e}"))
        })?;

        let name = UserName::parse(&payload.name)
            .map_err(|e| ProcessError::terminal(format!("invalid user name in payload: {e}")))?;

        let timeout = self.config.store_timeout;
        let user = bounded(timeout, "find_user_by_name", self.repo.find_by_name(&name))
            .await
            .map_err(store_failure)?
            .ok_or_else(|| {
                ProcessError::terminal(format!("user {} doesn't exist", payload.name))
            })?;

        let code = NewVerifyEmail::generate(
            user.user_id,
            user.email.clone(),
            self.config.verify_email_ttl,
        );
        let code = bounded(timeout, "create_verify_email", self.repo.create(code))
            .await
            .map_err(store_failure)?;

        let body = render_body(&user, &code, &self.config.verify_url_base);
        self.mailer
            .send(
                &self.config.verify_email_subject,
                &body,
                &[user.email.as_str().to_string()],
            )
            .await
            .map_err(ProcessError::retryable)?;

        tracing::info!(
            job_id = %job.id,
            user_id = %user.user_id,
            email_id = %code.id,
            "Verification mail sent"
        );
        Ok(())
    }
}

/// Outages and deadlines are retried; anything else would fail the same way again
fn store_failure(err: AuthError) -> ProcessError {
    if err.is_transient() {
        ProcessError::retryable(err)
    } else {
        err.log();
        ProcessError::terminal(err)
    }
}

fn render_body(user: &User, code: &VerifyEmail, verify_url_base: &str) -> String {
    let link = code.link(verify_url_base);
    format!(
        "Hello {name},<br/>\
         Thank you for registering with us!<br/>\
         Please <a href=\"{link}\">click here</a> to verify your email address.<br/>\
         The link expires at {expires}.",
        name = user.name.display(),
        expires = code.expired_at.format("%Y-%m-%d %H:%M UTC"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_ignores_unknown_fields() {
        let payload: VerifyEmailPayload =
            serde_json::from_str(r#"{"name":"alice","email":"stale@example.com"}"#).unwrap();
        assert_eq!(payload.name, "alice");
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"name":"alice"}"#
        );
    }

    #[test]
    fn test_store_failures_split_on_transience() {
        assert!(!store_failure(AuthError::Timeout("find_user_by_name")).is_terminal());
        let outage = AuthError::database("find_user_by_name")(sqlx::Error::PoolTimedOut);
        assert!(!store_failure(outage).is_terminal());

        let corrupt = AuthError::Internal("Invalid role id: 9".into());
        assert!(store_failure(corrupt).is_terminal());
        let missing = AuthError::database("create_verify_email")(sqlx::Error::RowNotFound);
        assert!(store_failure(missing).is_terminal());
    }

    #[test]
    fn test_options() {
        let options = verify_email_options();
        assert_eq!(options.queue, QueueName::Critical);
        assert_eq!(options.max_retry, 10);
        assert_eq!(options.process_in_ms(), 5000);
    }
}
