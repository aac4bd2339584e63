//! User account API endpoints.
//!
//! - POST `/` - Register a new account (starts a session immediately)
//! - POST `/login` - Authenticate with credentials
//! - GET `/` - List accounts (admin only)
//! - DELETE `/{id}` - Delete an account (own account or admin)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

use super::error::{ApiError, ResultExt};
use super::sessions::session_response;
use crate::auth::ApiAuth;
use crate::db::{Database, UserRole};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};
use crate::session::SessionManager;

const MAX_EMAIL_LENGTH: usize = 254;
const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub sessions: Arc<SessionManager>,
    pub secure_cookies: bool,
    pub no_signup: bool,
    pub rate_limits: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limits.clone(),
            rate_limit_login,
        ));

    let account_router = Router::new()
        .route("/", get(list_users))
        .route("/{id}", delete(delete_user))
        .with_state(state.clone());

    if state.no_signup {
        login_router.merge(account_router)
    } else {
        let register_router = Router::new()
            .route("/", post(register))
            .with_state(state.clone())
            .layer(middleware::from_fn_with_state(
                state.rate_limits.clone(),
                rate_limit_register,
            ));

        login_router.merge(account_router).merge(register_router)
    }
}

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() {
        return Err(ApiError::bad_request("Email cannot be empty"));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ApiError::bad_request("Email is too long"));
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ApiError::bad_request("Invalid email address"));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    Ok(())
}

/// Register a new account and start its first session.
async fn register(
    State(state): State<UsersState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let email = payload.email.trim();

    validate_email(email)?;

    if payload.password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let existing = state
        .db
        .users()
        .get_by_email(email)
        .await
        .db_err("Failed to check email availability")?;
    if existing.is_some() {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let id = state
        .db
        .users()
        .create(email, &payload.password, UserRole::User)
        .await
        .db_err("Failed to create user")?;

    let tokens = state
        .sessions
        .start_session(id, UserRole::User)
        .await
        .map_err(|e| {
            error!("Failed to start session after registration: {}", e);
            ApiError::internal("Session store error")
        })?;

    Ok(session_response(
        StatusCode::CREATED,
        &tokens,
        &state.jwt,
        state.secure_cookies,
    ))
}

/// Authenticate with credentials and start a session.
async fn login(
    State(state): State<UsersState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let user = state
        .db
        .users()
        .verify_credentials(payload.email.trim(), &payload.password)
        .await
        .db_err("Failed to verify credentials")?;

    // Unknown email, wrong password, and deactivated account all read the
    // same from the outside.
    let user = match user {
        Some(user) if user.active => user,
        _ => return Err(ApiError::unauthorized("Invalid email or password")),
    };

    let tokens = state
        .sessions
        .start_session(user.id, user.role)
        .await
        .map_err(|e| {
            error!("Failed to start session at login: {}", e);
            ApiError::internal("Session store error")
        })?;

    Ok(session_response(
        StatusCode::OK,
        &tokens,
        &state.jwt,
        state.secure_cookies,
    ))
}

/// List all accounts. Admin only.
async fn list_users(
    State(state): State<UsersState>,
    ApiAuth(identity): ApiAuth,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_role(&[UserRole::Admin])?;

    let users = state
        .db
        .users()
        .list()
        .await
        .db_err("Failed to list users")?;

    Ok(Json(serde_json::json!({ "users": users })))
}

/// Delete an account. Users can delete their own account, admins can delete
/// any. Every session of the deleted account is revoked.
async fn delete_user(
    State(state): State<UsersState>,
    ApiAuth(identity): ApiAuth,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_owner_or_role(id, &[UserRole::Admin])?;

    let deleted = state
        .db
        .users()
        .delete(id)
        .await
        .db_err("Failed to delete user")?;

    if !deleted {
        return Err(ApiError::not_found("User not found"));
    }

    // The account is gone; none of its refresh tokens may renew.
    if let Err(e) = state.sessions.revoke_all_for_owner(id).await {
        error!("Failed to revoke sessions of deleted user: {}", e);
    }

    Ok(StatusCode::NO_CONTENT)
}
