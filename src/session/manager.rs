//! Session issuance, rotation, and revocation.
//!
//! A session is a family of refresh tokens descending from one login. At any
//! instant a family has at most one unconsumed refresh token in the store:
//! rotation atomically claims the presented token's record and issues a
//! successor under the same family id, so a replayed (already consumed)
//! token can never be exchanged again.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, warn};

use crate::db::UserRole;
use crate::jwt::{JwtConfig, JwtError};
use crate::session::directory::UserDirectory;
use crate::session::store::{RefreshRecord, RefreshTokenStore};

/// An access/refresh pair, as handed to a client.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    /// Access token, returned in the response body
    pub access_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Refresh token, transported via the session cookie
    pub refresh_token: String,
    /// Family id shared by every refresh token in this session
    pub family_id: String,
}

/// Result of issuing a single refresh token.
#[derive(Debug, Clone)]
pub struct IssuedRefresh {
    pub token: String,
    pub family_id: String,
}

/// The outcomes of session operations, one variant per terminal state so
/// callers match exhaustively instead of poking at error strings.
#[derive(Debug)]
pub enum SessionError {
    /// Bad signature/structure, unknown token, or a token that was already
    /// consumed or revoked. Deliberately indistinguishable from the outside:
    /// telling a replayed token apart from a never-issued one would leak
    /// whether the rotation it lost to ever happened.
    InvalidToken,
    /// Past its embedded expiry.
    ExpiredToken,
    /// The store record's family does not match the token's embedded family.
    /// Unreachable under correct single-writer store semantics; guards
    /// against store corruption or codec/store drift.
    FamilyMismatch,
    /// Store or directory failure. Maps to a 500, never a 401.
    Internal(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::InvalidToken => write!(f, "Invalid refresh token"),
            SessionError::ExpiredToken => write!(f, "Refresh token expired"),
            SessionError::FamilyMismatch => write!(f, "Refresh token family mismatch"),
            SessionError::Internal(msg) => write!(f, "Session backend error: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

/// Issues, rotates, and revokes sessions. All collaborators are injected;
/// the manager holds no global state.
pub struct SessionManager {
    jwt: Arc<JwtConfig>,
    store: Arc<dyn RefreshTokenStore>,
    directory: Arc<dyn UserDirectory>,
}

impl SessionManager {
    pub fn new(
        jwt: Arc<JwtConfig>,
        store: Arc<dyn RefreshTokenStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            jwt,
            store,
            directory,
        }
    }

    /// Generate a fresh family id: 128 bits of entropy, hex-encoded.
    fn new_family_id() -> String {
        hex::encode(rand::rng().random::<[u8; 16]>())
    }

    /// Issue a stateless access token for an owner with their current role.
    pub fn issue_access_token(
        &self,
        owner_id: i64,
        role: UserRole,
    ) -> Result<crate::jwt::AccessTokenResult, JwtError> {
        self.jwt.issue_access(owner_id, role)
    }

    /// Issue a refresh token and record it in the store. With no family id
    /// given, a new family is started (login/registration); rotation passes
    /// the existing family id to keep the chain linked.
    pub async fn issue_refresh_token(
        &self,
        owner_id: i64,
        family_id: Option<String>,
    ) -> Result<IssuedRefresh, SessionError> {
        let family_id = family_id.unwrap_or_else(Self::new_family_id);

        let issued = self
            .jwt
            .issue_refresh(owner_id, &family_id)
            .map_err(|e| SessionError::Internal(e.to_string()))?;

        self.store
            .put(
                &issued.token,
                RefreshRecord {
                    owner_id,
                    family_id: family_id.clone(),
                },
            )
            .await
            .map_err(|e| SessionError::Internal(e.to_string()))?;

        Ok(IssuedRefresh {
            token: issued.token,
            family_id,
        })
    }

    /// Start a new session: access token plus a refresh token under a fresh
    /// family. Used by login and registration.
    pub async fn start_session(
        &self,
        owner_id: i64,
        role: UserRole,
    ) -> Result<SessionTokens, SessionError> {
        let access = self
            .issue_access_token(owner_id, role)
            .map_err(|e| SessionError::Internal(e.to_string()))?;
        let refresh = self.issue_refresh_token(owner_id, None).await?;

        debug!(owner_id, family = %refresh.family_id, "session started");

        Ok(SessionTokens {
            access_token: access.token,
            expires_in: access.expires_in,
            refresh_token: refresh.token,
            family_id: refresh.family_id,
        })
    }

    /// Exchange a refresh token for a successor pair, consuming the
    /// presented token.
    ///
    /// Of two concurrent calls presenting the same token, exactly one
    /// succeeds: the store's `remove` atomically claims the record, and the
    /// loser observes it already gone.
    pub async fn rotate(&self, presented: &str) -> Result<SessionTokens, SessionError> {
        let claims = match self.jwt.verify_refresh(presented) {
            Ok(claims) => claims,
            Err(JwtError::Expired) => {
                // Lazy cleanup: the record for an expired token can never be
                // used again, drop it if it is still around.
                let _ = self.store.remove(presented).await;
                return Err(SessionError::ExpiredToken);
            }
            Err(_) => return Err(SessionError::InvalidToken),
        };

        // Claim the record. Absent covers consumed, revoked, and
        // never-issued alike.
        let record = self
            .store
            .remove(presented)
            .await
            .map_err(|e| SessionError::Internal(e.to_string()))?
            .ok_or(SessionError::InvalidToken)?;

        if record.family_id != claims.fam {
            // The single presented token is rejected (its record is already
            // consumed above); the rest of the family stays valid.
            warn!(
                owner_id = record.owner_id,
                family = %record.family_id,
                "refresh token family mismatch"
            );
            return Err(SessionError::FamilyMismatch);
        }

        // Re-resolve the role from the directory rather than trusting the
        // old token, so role changes take effect on the next rotation.
        let user = self
            .directory
            .find_by_id(record.owner_id)
            .await
            .map_err(|e| SessionError::Internal(e.to_string()))?;
        let user = match user {
            Some(user) if user.active => user,
            _ => return Err(SessionError::InvalidToken),
        };

        let access = self
            .issue_access_token(user.id, user.role)
            .map_err(|e| SessionError::Internal(e.to_string()))?;
        let refresh = self
            .issue_refresh_token(user.id, Some(record.family_id))
            .await?;

        debug!(owner_id = user.id, family = %refresh.family_id, "session rotated");

        Ok(SessionTokens {
            access_token: access.token,
            expires_in: access.expires_in,
            refresh_token: refresh.token,
            family_id: refresh.family_id,
        })
    }

    /// Revoke a single refresh token (logout). Returns whether a record was
    /// present to revoke.
    pub async fn revoke(&self, presented: &str) -> Result<bool, SessionError> {
        let removed = self
            .store
            .remove(presented)
            .await
            .map_err(|e| SessionError::Internal(e.to_string()))?;

        if let Some(record) = &removed {
            debug!(owner_id = record.owner_id, family = %record.family_id, "session revoked");
        }

        Ok(removed.is_some())
    }

    /// Revoke every refresh token for an owner: logout on all devices, or
    /// forced re-authentication after a password change. Returns how many
    /// records were removed.
    pub async fn revoke_all_for_owner(&self, owner_id: i64) -> Result<u64, SessionError> {
        let removed = self
            .store
            .remove_all_for_owner(owner_id)
            .await
            .map_err(|e| SessionError::Internal(e.to_string()))?;

        debug!(owner_id, removed, "all sessions revoked for owner");

        Ok(removed)
    }
}
