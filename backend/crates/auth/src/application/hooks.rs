//! Registration Hooks
//!
//! Two ways to hand the verification job off from the registration
//! transaction:
//! - [`VerifyEmailOutboxHook`] writes an outbox row in the same transaction;
//!   the relay enqueues it after commit. Used by the HTTP surface.
//! - [`DirectEnqueueHook`] enqueues straight into the queue before commit. An
//!   enqueue failure aborts the registration, but a crash between enqueue
//!   and commit leaves a job whose user never existed; the worker treats
//!   that job as terminal.

use std::sync::Arc;

use jobs::{JobQueue, NewOutboxMessage, OutboxBatch, Task};

use crate::application::send_verify_email::{
    TASK_SEND_VERIFY_EMAIL, VerifyEmailPayload, verify_email_options,
};
use crate::domain::entity::user::User;
use crate::domain::hook::RegistrationHook;
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyEmailOutboxHook;

impl RegistrationHook for VerifyEmailOutboxHook {
    async fn after_create(&self, user: &User, outbox: &mut OutboxBatch) -> AuthResult<()> {
        stage_verify_email(user, outbox)
    }
}

/// Append the verification job for `user` to `outbox`
pub fn stage_verify_email(user: &User, outbox: &mut OutboxBatch) -> AuthResult<()> {
    let message = NewOutboxMessage::json(
        TASK_SEND_VERIFY_EMAIL,
        &VerifyEmailPayload::for_user(user),
        verify_email_options(),
    )
    .map_err(|e| AuthError::RegistrationHook(e.to_string()))?;

    tracing::debug!(
        user_id = %user.user_id,
        outbox_id = %message.id,
        "Verification job staged in outbox"
    );
    outbox.push(message);
    Ok(())
}

pub struct DirectEnqueueHook<Q> {
    queue: Arc<Q>,
}

impl<Q> DirectEnqueueHook<Q> {
    pub fn new(queue: Arc<Q>) -> Self {
        Self { queue }
    }
}

impl<Q> RegistrationHook for DirectEnqueueHook<Q>
where
    Q: JobQueue + Send + Sync,
{
    async fn after_create(&self, user: &User, _outbox: &mut OutboxBatch) -> AuthResult<()> {
        let task = Task::json(TASK_SEND_VERIFY_EMAIL, &VerifyEmailPayload::for_user(user))
            .map_err(|e| AuthError::RegistrationHook(e.to_string()))?;

        let info = self
            .queue
            .enqueue(&task, verify_email_options())
            .await
            .map_err(|e| AuthError::RegistrationHook(e.to_string()))?;

        tracing::info!(
            user_id = %user.user_id,
            job_id = %info.id,
            queue = %info.queue,
            "Verification job enqueued before commit"
        );
        Ok(())
    }
}
