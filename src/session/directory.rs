//! User directory seam.
//!
//! The session core never touches passwords or user rows directly; it asks
//! the directory. Password comparison (salted hashing) is the directory's
//! concern.

use crate::db::User;

/// Directory lookup failure. Surfaces as a 500 at the HTTP boundary.
#[derive(Debug)]
pub struct DirectoryError(pub String);

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user directory error: {}", self.0)
    }
}

impl std::error::Error for DirectoryError {}

/// Where the session core looks up users: at login (credentials) and at
/// every rotation (re-resolving the current role so role changes take effect
/// without waiting out the access TTL).
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by credentials. Returns `None` for an unknown email or a
    /// wrong password, indistinguishably.
    async fn find_by_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, DirectoryError>;

    /// Find a user by owner id.
    async fn find_by_id(&self, owner_id: i64) -> Result<Option<User>, DirectoryError>;
}
