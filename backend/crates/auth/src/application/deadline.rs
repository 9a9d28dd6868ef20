//! Bounded store calls

use std::future::Future;
use std::time::Duration;

use crate::error::{AuthError, AuthResult};

/// Run `call` with a deadline; an elapsed deadline is `AuthError::Timeout(op)`
/// and a database failure is re-tagged with `op`, so both name the caller's step.
/// Dropping the inner future cancels the store call.
pub async fn bounded<T, F>(limit: Duration, op: &'static str, call: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Err(AuthError::Database { source, .. })) => Err(AuthError::Database { op, source }),
        Ok(result) => result,
        Err(_) => Err(AuthError::Timeout(op)),
    }
}
