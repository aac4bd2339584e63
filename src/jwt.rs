//! Signed token issuance and verification.
//!
//! Two token purposes with separate signing secrets: a leaked access-signing
//! key must not be able to forge refresh tokens, and vice versa. Refresh
//! tokens additionally carry the family id that links a chain of rotations
//! back to one login.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::db::UserRole;

/// Token purpose for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    /// Short-lived access token (15 minutes) - stateless, not tracked
    Access,
    /// Long-lived refresh token (7 days) - tracked in the refresh store
    Refresh,
}

/// JWT claims for access tokens (stateless).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (owner id as string)
    pub sub: String,
    /// Role at issuance time
    pub role: UserRole,
    /// Token purpose
    #[serde(rename = "typ")]
    pub purpose: TokenPurpose,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT claims for refresh tokens (tracked in the refresh store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// JWT ID. Makes every refresh token unique, even two minted for the
    /// same owner and family within one second
    pub jti: String,
    /// Subject (owner id as string)
    pub sub: String,
    /// Token purpose
    #[serde(rename = "typ")]
    pub purpose: TokenPurpose,
    /// Family id linking the rotation chain back to one login
    pub fam: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl AccessClaims {
    /// Parse the subject back into an owner id.
    pub fn owner_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

impl RefreshClaims {
    /// Parse the subject back into an owner id.
    pub fn owner_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

/// Default refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for token operations. Holds one key pair per purpose.
#[derive(Clone)]
pub struct JwtConfig {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

/// Result of issuing an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The JWT token string
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
}

/// Result of issuing a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    /// The JWT token string
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
}

impl JwtConfig {
    /// Create a new configuration with the given per-purpose secrets and
    /// default lifetimes.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
        }
    }

    /// Override token lifetimes. Mainly for tests and local setups.
    pub fn with_ttls(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    /// Access token lifetime.
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Refresh token lifetime. Also used as the refresh cookie Max-Age.
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue an access token for an owner with their current role.
    pub fn issue_access(&self, owner_id: i64, role: UserRole) -> Result<AccessTokenResult, JwtError> {
        let now = unix_now()?;

        let claims = AccessClaims {
            sub: owner_id.to_string(),
            role,
            purpose: TokenPurpose::Access,
            iat: now,
            exp: now + self.access_ttl.as_secs(),
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.access_encoding)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult {
            token,
            expires_in: self.access_ttl.as_secs(),
        })
    }

    /// Issue a refresh token for an owner under the given family.
    pub fn issue_refresh(&self, owner_id: i64, family_id: &str) -> Result<RefreshTokenResult, JwtError> {
        let now = unix_now()?;

        let claims = RefreshClaims {
            jti: new_jti(),
            sub: owner_id.to_string(),
            purpose: TokenPurpose::Refresh,
            fam: family_id.to_string(),
            iat: now,
            exp: now + self.refresh_ttl.as_secs(),
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.refresh_encoding)
            .map_err(JwtError::Encoding)?;

        Ok(RefreshTokenResult {
            token,
            expires_in: self.refresh_ttl.as_secs(),
        })
    }

    /// Verify and decode an access token.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let claims = decode_claims::<AccessClaims>(token, &self.access_decoding)?;

        if claims.purpose != TokenPurpose::Access {
            return Err(JwtError::WrongPurpose);
        }

        Ok(claims)
    }

    /// Verify and decode a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        let claims = decode_claims::<RefreshClaims>(token, &self.refresh_decoding)?;

        if claims.purpose != TokenPurpose::Refresh {
            return Err(JwtError::WrongPurpose);
        }

        Ok(claims)
    }
}

fn decode_claims<T: serde::de::DeserializeOwned>(
    token: &str,
    key: &DecodingKey,
) -> Result<T, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let token_data = jsonwebtoken::decode::<T>(token, key, &validation).map_err(|e| {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Malformed,
        }
    })?;

    Ok(token_data.claims)
}

fn new_jti() -> String {
    use rand::Rng;
    hex::encode(rand::rng().random::<[u8; 16]>())
}

fn unix_now() -> Result<u64, JwtError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| JwtError::TimeError)?
        .as_secs())
}

/// Errors that can occur during token operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error serializing/signing the token. Expected never for well-formed claims
    Encoding(jsonwebtoken::errors::Error),
    /// Bad signature or unparsable structure
    Malformed,
    /// Past its embedded expiry
    Expired,
    /// Valid token of the other purpose (e.g. refresh token where access expected)
    WrongPurpose,
    /// System clock before the Unix epoch
    TimeError,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Malformed => write!(f, "Invalid token"),
            JwtError::Expired => write!(f, "Token expired"),
            JwtError::WrongPurpose => write!(f, "Wrong token purpose"),
            JwtError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for JwtError {}
