//! Registration Hook
//!
//! Runs inside the registration transaction, after the user row is written
//! and before commit. An error rolls the whole registration back.
//!
//! Hooks that need durability append to the `OutboxBatch`; the store writes
//! the batch in the same transaction.

use jobs::OutboxBatch;

use crate::domain::entity::user::User;
use crate::error::AuthResult;

#[trait_variant::make(RegistrationHook: Send)]
pub trait LocalRegistrationHook {
    async fn after_create(&self, user: &User, outbox: &mut OutboxBatch) -> AuthResult<()>;
}

/// Adapts a plain function into a hook
pub struct HookFn<F>(pub F);

impl<F> RegistrationHook for HookFn<F>
where
    F: Fn(&User, &mut OutboxBatch) -> AuthResult<()> + Send + Sync,
{
    async fn after_create(&self, user: &User, outbox: &mut OutboxBatch) -> AuthResult<()> {
        (self.0)(user, outbox)
    }
}

/// Registers without side effects
pub struct NoopHook;

impl RegistrationHook for NoopHook {
    async fn after_create(&self, _user: &User, _outbox: &mut OutboxBatch) -> AuthResult<()> {
        Ok(())
    }
}
