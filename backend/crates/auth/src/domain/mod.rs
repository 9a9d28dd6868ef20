//! Domain Layer
//!
//! Entities, value objects, repository traits and the registration hook.

pub mod entity;
pub mod hook;
pub mod repository;
pub mod value_object;

// Re-exports
pub use entity::{profile::Profile, token::Token, user::User, verify_email::VerifyEmail};
pub use hook::{HookFn, LocalRegistrationHook, NoopHook, RegistrationHook};
pub use repository::{
    ProfileRepository, StatRepository, TokenRepository, UserCache, UserRepository,
    VerifyEmailRepository,
};
