//! Auth Error Types
//!
//! Auth-specific variants that integrate with the unified
//! `kernel::error::AppError` system. Responses never carry store details.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Email or name already registered
    #[error("A user with this email or name already exists")]
    UserExists,

    #[error("User not found")]
    UserNotFound,

    /// Unknown email or wrong password, deliberately indistinguishable
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email address has not been verified")]
    Unverified,

    /// Missing, malformed, unknown or expired bearer token
    #[error("Invalid or expired authentication token")]
    Unauthorized,

    /// Valid token, insufficient role
    #[error("Insufficient permissions")]
    Forbidden,

    /// Unknown id, wrong secret, expired or already used
    #[error("Verification code not found")]
    VerificationNotFound,

    #[error("Profile not found")]
    ProfileNotFound,

    /// User committed, dependent profile row failed
    #[error("Profile creation failed: {0}")]
    ProfileCreation(String),

    /// Post-commit hook failed; the registration was rolled back
    #[error("Registration hook failed: {0}")]
    RegistrationHook(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// A bounded store call exceeded its deadline
    #[error("Store operation timed out: {0}")]
    Timeout(&'static str),

    /// `op` names the store call that failed
    #[error("Database error in {op}: {source}")]
    Database {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Tags a sqlx failure with the store call it came from, for `map_err`
    pub fn database(op: &'static str) -> impl FnOnce(sqlx::Error) -> AuthError {
        move |source| AuthError::Database { op, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::UserNotFound
            | AuthError::VerificationNotFound
            | AuthError::ProfileNotFound => ErrorKind::NotFound,
            AuthError::UserExists => ErrorKind::Conflict,
            AuthError::InvalidCredentials | AuthError::Unauthorized => ErrorKind::Unauthorized,
            AuthError::Unverified | AuthError::Forbidden => ErrorKind::Forbidden,
            AuthError::Validation(_) => ErrorKind::BadRequest,
            AuthError::Timeout(_) => ErrorKind::RequestTimeout,
            AuthError::ProfileCreation(_)
            | AuthError::RegistrationHook(_)
            | AuthError::Database { .. }
            | AuthError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Store or infrastructure trouble that may clear up on its own
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Timeout(_) => true,
            AuthError::Database { source, .. } => match source {
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
                // serialization_failure, deadlock_detected, admin_shutdown
                sqlx::Error::Database(db) => {
                    matches!(db.code().as_deref(), Some("40001" | "40P01" | "57P01"))
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Convert to AppError. Server-side failures get a generic message.
    pub fn to_app_error(&self) -> AppError {
        match self {
            AuthError::Database { .. }
            | AuthError::Internal(_)
            | AuthError::RegistrationHook(_) => {
                AppError::internal("Internal server error")
            }
            AuthError::ProfileCreation(_) => AppError::internal(
                "Account created, but the profile could not be initialized",
            )
            .with_action("Sign in again later; the profile is repaired on first access"),
            AuthError::Timeout(_) => {
                AppError::request_timeout("The request took too long").with_action("Retry shortly")
            }
            AuthError::Unverified => AppError::forbidden(self.to_string())
                .with_action("Check your inbox for the verification link"),
            AuthError::Validation(msg) => AppError::bad_request(msg.clone()),
            _ => AppError::new(self.kind(), self.to_string()),
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            AuthError::Database { op, source } => {
                tracing::error!(operation = op, error = %source, "Auth database error");
            }
            AuthError::Internal(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::RegistrationHook(msg) => {
                tracing::error!(message = %msg, "Registration rolled back by hook");
            }
            AuthError::ProfileCreation(msg) => {
                tracing::error!(message = %msg, "Profile creation failed after commit");
            }
            AuthError::Timeout(op) => {
                tracing::error!(operation = op, "Store call timed out");
            }
            AuthError::InvalidCredentials => {
                tracing::warn!("Invalid login attempt");
            }
            AuthError::Unauthorized => {
                tracing::warn!("Rejected bearer token");
            }
            AuthError::Forbidden => {
                tracing::warn!("Role check failed");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        err.to_app_error()
    }
}

impl From<platform::bearer::BearerError> for AuthError {
    fn from(err: platform::bearer::BearerError) -> Self {
        tracing::debug!(error = %err, "Bearer credential rejected");
        AuthError::Unauthorized
    }
}

impl From<platform::password::PasswordPolicyError> for AuthError {
    fn from(err: platform::password::PasswordPolicyError) -> Self {
        AuthError::Validation(err.to_string())
    }
}
