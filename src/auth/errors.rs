//! Authentication and authorization error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::jwt::JwtError;

/// Failures surfaced by the request authentication middleware and the
/// authorization guards. Everything here maps to a 401 or 403, never a 500.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Authorization header absent or not of the form `Bearer <token>`
    MissingToken,
    /// Bad signature or unparsable structure
    InvalidToken,
    /// Access token past its expiry
    ExpiredToken,
    /// A non-access token presented as an access credential
    WrongTokenPurpose,
    /// Authenticated, but the role/ownership check failed
    Forbidden,
}

impl AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::WrongTokenPurpose => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "Not authenticated",
            AuthError::InvalidToken => "Invalid token",
            AuthError::ExpiredToken => "Token expired",
            AuthError::WrongTokenPurpose => "Wrong token purpose",
            AuthError::Forbidden => "Insufficient permissions",
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(e: JwtError) -> Self {
        match e {
            JwtError::Expired => AuthError::ExpiredToken,
            JwtError::WrongPurpose => AuthError::WrongTokenPurpose,
            _ => AuthError::InvalidToken,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        #[derive(serde::Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}
