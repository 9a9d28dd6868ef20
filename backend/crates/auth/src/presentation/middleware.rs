//! Auth Middleware
//!
//! `require_bearer` resolves the `Authorization: Bearer` token and stores the
//! [`AuthorizedUser`] in request extensions. `require_staff` runs after it
//! and checks the role.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use platform::bearer::bearer_token;

use crate::application::authorize::{AuthorizeUseCase, AuthorizedUser, ensure_staff};
use crate::domain::repository::TokenRepository;
use crate::error::AuthError;
use crate::presentation::handlers::AuthAppState;

/// Reject requests without a valid bearer token
pub async fn require_bearer<R, C, H>(
    State(state): State<AuthAppState<R, C, H>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError>
where
    R: TokenRepository + Send + Sync + 'static,
    C: Send + Sync + 'static,
    H: Send + Sync + 'static,
{
    let token = bearer_token(req.headers())?.to_string();

    let use_case = AuthorizeUseCase::new(state.repo.clone(), state.config.clone());
    let user = use_case.authorize(&token).await?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Reject callers that are not admin or moderator
pub async fn require_staff(req: Request, next: Next) -> Result<Response, AuthError> {
    let user = req
        .extensions()
        .get::<AuthorizedUser>()
        .ok_or(AuthError::Unauthorized)?;
    ensure_staff(user)?;

    Ok(next.run(req).await)
}
