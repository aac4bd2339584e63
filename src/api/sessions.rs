//! Session management API endpoints.
//!
//! - POST `/refresh` - Exchange the refresh cookie for a new token pair
//! - POST `/logout` - Revoke the presented refresh token and clear the cookie
//! - POST `/logout-all` - Revoke every refresh token for the caller
//! - GET `/verify` - Check that the current access token is still valid
//!
//! The refresh cookie is path-scoped to this router, so browsers never send
//! it anywhere else.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use super::error::ApiError;
use crate::auth::{ApiAuth, REFRESH_COOKIE_NAME, clear_refresh_cookie, get_cookie, refresh_cookie};
use crate::db::UserRole;
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::session::{SessionError, SessionManager, SessionTokens};

#[derive(Clone)]
pub struct SessionsState {
    pub jwt: Arc<JwtConfig>,
    pub sessions: Arc<SessionManager>,
    pub secure_cookies: bool,
}

impl_has_auth_backend!(SessionsState);

pub fn router(state: SessionsState) -> Router {
    Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/verify", get(verify))
        .with_state(state)
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
    expires_in: u64,
}

/// Build the success response for a fresh token pair: access token in the
/// body, refresh token in the cookie.
pub(super) fn session_response(
    status: StatusCode,
    tokens: &SessionTokens,
    jwt: &JwtConfig,
    secure_cookies: bool,
) -> Response {
    let cookie = refresh_cookie(
        &tokens.refresh_token,
        jwt.refresh_ttl().as_secs(),
        secure_cookies,
    );

    (
        status,
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(TokenResponse {
            access_token: tokens.access_token.clone(),
            token_type: "Bearer",
            expires_in: tokens.expires_in,
        }),
    )
        .into_response()
}

/// A rejected refresh: 401 plus a cleared cookie, so the client discards its
/// cached token and re-authenticates.
fn rejected(secure_cookies: bool, message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        AppendHeaders([(SET_COOKIE, clear_refresh_cookie(secure_cookies))]),
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Rotate the refresh token: the presented token is consumed, and a new
/// access/refresh pair under the same family comes back.
async fn refresh(
    State(state): State<SessionsState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let Some(token) = get_cookie(&headers, REFRESH_COOKIE_NAME) else {
        return Ok(rejected(state.secure_cookies, "No refresh token"));
    };

    match state.sessions.rotate(token).await {
        Ok(tokens) => Ok(session_response(
            StatusCode::OK,
            &tokens,
            &state.jwt,
            state.secure_cookies,
        )),
        Err(SessionError::ExpiredToken) => {
            Ok(rejected(state.secure_cookies, "Refresh token expired"))
        }
        Err(SessionError::InvalidToken) | Err(SessionError::FamilyMismatch) => {
            Ok(rejected(state.secure_cookies, "Invalid refresh token"))
        }
        Err(SessionError::Internal(e)) => {
            error!("Failed to rotate session: {}", e);
            Err(ApiError::internal("Session store error"))
        }
    }
}

/// Logout - revoke the presented refresh token and clear the cookie.
/// Best-effort: an already-invalid token still logs out successfully.
async fn logout(State(state): State<SessionsState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = get_cookie(&headers, REFRESH_COOKIE_NAME) {
        if let Err(e) = state.sessions.revoke(token).await {
            error!("Failed to revoke session at logout: {}", e);
        }
    }

    (
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, clear_refresh_cookie(state.secure_cookies))]),
        Json(serde_json::json!({ "success": true })),
    )
}

/// Logout on all devices - revoke every refresh token for the caller.
/// Requires a valid access token; outstanding access tokens stay valid until
/// they expire, but none of them can be renewed afterwards.
async fn logout_all(
    State(state): State<SessionsState>,
    ApiAuth(identity): ApiAuth,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = state
        .sessions
        .revoke_all_for_owner(identity.owner_id)
        .await
        .map_err(|e| {
            error!("Failed to revoke sessions: {}", e);
            ApiError::internal("Session store error")
        })?;

    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, clear_refresh_cookie(state.secure_cookies))]),
        Json(serde_json::json!({ "revoked": revoked })),
    ))
}

#[derive(Serialize)]
struct IdentityResponse {
    id: i64,
    role: UserRole,
}

/// Verify that the current access token is still valid and report who the
/// caller is. A lightweight probe for clients checking auth status.
async fn verify(ApiAuth(identity): ApiAuth) -> impl IntoResponse {
    Json(IdentityResponse {
        id: identity.owner_id,
        role: identity.role,
    })
}
