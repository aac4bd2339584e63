//! Axum extractors for request authentication.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use super::backend::HasAuthBackend;
use super::errors::AuthError;
use crate::db::UserRole;
use crate::jwt::JwtConfig;

/// The authenticated subject attached to a request: who is calling and with
/// what role. Carried by value; nothing here touches the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub owner_id: i64,
    pub role: UserRole,
}

impl Identity {
    /// Reject unless the caller's role is one of `allowed`.
    pub fn require_role(&self, allowed: &[UserRole]) -> Result<(), AuthError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }

    /// Reject unless the caller owns the resource or holds one of the
    /// privileged roles.
    pub fn require_owner_or_role(
        &self,
        resource_owner_id: i64,
        privileged: &[UserRole],
    ) -> Result<(), AuthError> {
        if self.owner_id == resource_owner_id || privileged.contains(&self.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

/// Authenticate an Authorization header value against the access codec.
///
/// A refresh token presented here fails: either on the signature (the
/// purposes sign with different secrets) or on the purpose tag.
pub fn authenticate(header: Option<&str>, jwt: &JwtConfig) -> Result<Identity, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MissingToken)?;

    let claims = jwt.verify_access(token)?;
    let owner_id = claims.owner_id().ok_or(AuthError::InvalidToken)?;

    Ok(Identity {
        owner_id,
        role: claims.role,
    })
}

/// Extractor for API endpoints that require authentication. Validates the
/// bearer access token and rejects with a JSON 401 otherwise.
pub struct ApiAuth(pub Identity);

impl<S> FromRequestParts<S> for ApiAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        authenticate(header, state.jwt()).map(ApiAuth)
    }
}
