//! Auth Router

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::domain::hook::RegistrationHook;
use crate::domain::repository::UserCache;
use crate::presentation::handlers::{self, AuthAppState, AuthStore};
use crate::presentation::middleware::{require_bearer, require_staff};

/// Routes relative to `/api/auth`
pub fn auth_router<R, C, H>(state: AuthAppState<R, C, H>) -> Router
where
    R: AuthStore,
    C: UserCache + Send + Sync + 'static,
    H: RegistrationHook + Send + Sync + 'static,
{
    let bearer = middleware::from_fn_with_state(state.clone(), require_bearer::<R, C, H>);

    let authenticated = Router::new()
        .route("/verify_token", get(handlers::verify_token))
        .route("/profile", get(handlers::get_profile::<R, C, H>))
        .route("/me", get(handlers::me::<R, C, H>))
        .route_layer(bearer.clone());

    // Layers run outermost-last: bearer first, then the role check
    let staff = Router::new()
        .route("/verify_role", get(handlers::verify_role))
        .route_layer(middleware::from_fn(require_staff))
        .route_layer(bearer);

    Router::new()
        .route("/register", post(handlers::register::<R, C, H>))
        .route("/login", post(handlers::login::<R, C, H>))
        .route("/verify_email", get(handlers::verify_email::<R, C, H>))
        .merge(authenticated)
        .merge(staff)
        .with_state(state)
}
