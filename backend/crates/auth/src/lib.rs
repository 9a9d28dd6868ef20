//! Auth (Authentication) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, repository traits, registration hook
//! - `application/` - Use cases, verification worker, stats bus
//! - `infra/` - Postgres and in-memory stores, snapshot cache
//! - `presentation/` - HTTP handlers, DTOs, router, middleware
//!
//! ## Features
//! - Registration in one transaction with a hook that stages the
//!   verification job (outbox) or enqueues it directly
//! - Verification mail worker on the `jobs` queue
//! - Email confirmation through a conditional update
//! - Bearer tokens: one per user, 48h, only the SHA-256 is stored
//! - Staff role check (admin, moderator)
//!
//! ## Security Model
//! - Passwords hashed with Argon2id (NIST SP 800-63B compliant)
//! - Token, code and credential failures never say which check failed

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::config::{AuthConfig, DEFAULT_PUBLIC_BASE_URL};
pub use application::{
    AuthorizedUser, DirectEnqueueHook, EventBus, SendVerifyEmailHandler, StatsRecorder,
    TASK_SEND_VERIFY_EMAIL, VerifyEmailOutboxHook,
};
pub use error::{AuthError, AuthResult};
pub use infra::{MemoryAuthRepository, MemoryUserCache, PgAuthRepository};
pub use presentation::{AuthAppState, auth_router};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};
