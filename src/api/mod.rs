mod error;
mod sessions;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;
use crate::session::SessionManager;

pub use error::{ApiError, ResultExt};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    sessions: Arc<SessionManager>,
    secure_cookies: bool,
    no_signup: bool,
    rate_limits: Arc<RateLimitConfig>,
) -> Router {
    let users_state = users::UsersState {
        db,
        jwt: jwt.clone(),
        sessions: sessions.clone(),
        secure_cookies,
        no_signup,
        rate_limits,
    };

    let sessions_state = sessions::SessionsState {
        jwt,
        sessions,
        secure_cookies,
    };

    Router::new()
        .nest("/users", users::router(users_state))
        .nest("/sessions", sessions::router(sessions_state))
}
