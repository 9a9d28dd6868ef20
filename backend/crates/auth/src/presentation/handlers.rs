//! HTTP Handlers

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use std::sync::Arc;

use crate::application::config::AuthConfig;
use crate::application::{
    AuthorizedUser, EventBus, GetProfileUseCase, GetSnapshotUseCase, RegisterInput,
    RegisterUseCase, SignInInput, SignInUseCase, VerifyEmailUseCase,
};
use crate::domain::entity::snapshot::UserSnapshot;
use crate::domain::hook::RegistrationHook;
use crate::domain::repository::{
    ProfileRepository, TokenRepository, UserCache, UserRepository, VerifyEmailRepository,
};
use crate::error::AuthResult;
use crate::presentation::dto::{
    LoginRequest, LoginResponse, MessageResponse, ProfileResponse, RegisterRequest,
    RegisterResponse, VerifyEmailQuery, VerifyEmailResponse,
};

/// Every store capability the HTTP surface needs
pub trait AuthStore:
    UserRepository
    + ProfileRepository
    + TokenRepository
    + VerifyEmailRepository
    + Send
    + Sync
    + 'static
{
}

impl<T> AuthStore for T where
    T: UserRepository
        + ProfileRepository
        + TokenRepository
        + VerifyEmailRepository
        + Send
        + Sync
        + 'static
{
}

/// Shared state for auth handlers
pub struct AuthAppState<R, C, H> {
    pub repo: Arc<R>,
    pub cache: Arc<C>,
    pub hook: Arc<H>,
    pub events: EventBus,
    pub config: Arc<AuthConfig>,
}

impl<R, C, H> AuthAppState<R, C, H> {
    pub fn new(repo: Arc<R>, cache: Arc<C>, hook: Arc<H>, events: EventBus, config: Arc<AuthConfig>) -> Self {
        Self {
            repo,
            cache,
            hook,
            events,
            config,
        }
    }
}

// Derive would demand `R: Clone` and friends
impl<R, C, H> Clone for AuthAppState<R, C, H> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            cache: self.cache.clone(),
            hook: self.hook.clone(),
            events: self.events.clone(),
            config: self.config.clone(),
        }
    }
}

// ============================================================================
// Register
// ============================================================================

/// POST /api/auth/register
pub async fn register<R, C, H>(
    State(state): State<AuthAppState<R, C, H>>,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<(StatusCode, Json<RegisterResponse>)>
where
    R: AuthStore,
    C: UserCache + Send + Sync + 'static,
    H: RegistrationHook + Send + Sync + 'static,
{
    let use_case = RegisterUseCase::new(
        state.repo.clone(),
        state.hook.clone(),
        state.events.clone(),
        state.config.clone(),
    );

    let user = use_case
        .execute(RegisterInput {
            email: req.email,
            password: req.password,
            name: req.name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(RegisterResponse::from(&user))))
}

// ============================================================================
// Login
// ============================================================================

/// POST /api/auth/login
pub async fn login<R, C, H>(
    State(state): State<AuthAppState<R, C, H>>,
    Json(req): Json<LoginRequest>,
) -> AuthResult<Json<LoginResponse>>
where
    R: AuthStore,
    C: UserCache + Send + Sync + 'static,
    H: RegistrationHook + Send + Sync + 'static,
{
    let use_case = SignInUseCase::new(
        state.repo.clone(),
        state.cache.clone(),
        state.events.clone(),
        state.config.clone(),
    );

    let output = use_case
        .execute(SignInInput {
            email: req.email,
            password: req.password,
        })
        .await?;

    Ok(Json(LoginResponse {
        token: output.token,
        expires_at: output.expires_at,
    }))
}

// ============================================================================
// Email verification
// ============================================================================

/// GET /api/auth/verify_email?email_id=&secret_code=
pub async fn verify_email<R, C, H>(
    State(state): State<AuthAppState<R, C, H>>,
    Query(query): Query<VerifyEmailQuery>,
) -> AuthResult<Json<VerifyEmailResponse>>
where
    R: AuthStore,
    C: UserCache + Send + Sync + 'static,
    H: RegistrationHook + Send + Sync + 'static,
{
    let use_case = VerifyEmailUseCase::new(state.repo.clone());
    let user = use_case.execute(query.email_id, &query.secret_code).await?;

    Ok(Json(VerifyEmailResponse {
        is_verified: user.is_email_verified,
    }))
}

// ============================================================================
// Bearer-protected
// ============================================================================

/// GET /api/auth/verify_token
pub async fn verify_token(Extension(user): Extension<AuthorizedUser>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: format!("authenticated user {}", user.email),
    })
}

/// GET /api/auth/verify_role
pub async fn verify_role(Extension(user): Extension<AuthorizedUser>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: format!("authorized {} {}", user.role, user.email),
    })
}

/// GET /api/auth/profile
pub async fn get_profile<R, C, H>(
    State(state): State<AuthAppState<R, C, H>>,
    Extension(user): Extension<AuthorizedUser>,
) -> AuthResult<Json<ProfileResponse>>
where
    R: AuthStore,
    C: UserCache + Send + Sync + 'static,
    H: RegistrationHook + Send + Sync + 'static,
{
    let use_case = GetProfileUseCase::new(state.repo.clone(), state.config.clone());
    let profile = use_case.execute(&user.user_id).await?;

    Ok(Json(ProfileResponse::from(profile)))
}

/// GET /api/auth/me
pub async fn me<R, C, H>(
    State(state): State<AuthAppState<R, C, H>>,
    Extension(user): Extension<AuthorizedUser>,
) -> AuthResult<Json<UserSnapshot>>
where
    R: AuthStore,
    C: UserCache + Send + Sync + 'static,
    H: RegistrationHook + Send + Sync + 'static,
{
    let use_case =
        GetSnapshotUseCase::new(state.repo.clone(), state.cache.clone(), state.config.clone());
    Ok(Json(use_case.execute(&user.user_id).await?))
}
