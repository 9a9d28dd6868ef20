//! Application Layer
//!
//! Use cases, the registration hooks, the verification worker and the
//! stats bus.

pub mod authorize;
pub mod config;
pub mod deadline;
pub mod events;
pub mod get_profile;
pub mod get_snapshot;
pub mod hooks;
pub mod register;
pub mod send_verify_email;
pub mod sign_in;
pub mod verify_email;

// Re-exports
pub use authorize::{AuthorizeUseCase, AuthorizedUser};
pub use config::AuthConfig;
pub use events::{EventBus, StatsRecorder};
pub use get_profile::GetProfileUseCase;
pub use get_snapshot::GetSnapshotUseCase;
pub use hooks::{DirectEnqueueHook, VerifyEmailOutboxHook};
pub use register::{RegisterInput, RegisterUseCase};
pub use send_verify_email::{
    SendVerifyEmailHandler, TASK_SEND_VERIFY_EMAIL, VerifyEmailPayload, verify_email_options,
};
pub use sign_in::{SignInInput, SignInOutput, SignInUseCase};
pub use verify_email::VerifyEmailUseCase;
