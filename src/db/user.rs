//! User accounts and credential verification.
//!
//! This is the concrete user directory the session core consults. Password
//! comparison happens here, against Argon2 hashes; the token core never sees
//! a password.

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use sqlx::sqlite::SqlitePool;

use crate::session::{DirectoryError, UserDirectory};

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role: UserRole,
    pub active: bool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    role: String,
    active: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            role: UserRole::from_str(&row.role),
            active: row.active != 0,
        }
    }
}

/// User summary for the admin listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub role: UserRole,
    pub active: bool,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct UserSummaryRow {
    id: i64,
    email: String,
    role: String,
    active: i32,
    created_at: String,
}

impl From<UserSummaryRow> for UserSummary {
    fn from(row: UserSummaryRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            role: UserRole::from_str(&row.role),
            active: row.active != 0,
            created_at: row.created_at,
        }
    }
}

/// Errors from the user store: the database itself, or password hashing.
#[derive(Debug)]
pub enum UserStoreError {
    Database(sqlx::Error),
    Password(argon2::password_hash::Error),
}

impl std::fmt::Display for UserStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserStoreError::Database(e) => write!(f, "database error: {}", e),
            UserStoreError::Password(e) => write!(f, "password hash error: {}", e),
        }
    }
}

impl std::error::Error for UserStoreError {}

impl From<sqlx::Error> for UserStoreError {
    fn from(e: sqlx::Error) -> Self {
        UserStoreError::Database(e)
    }
}

/// Store for user accounts.
#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

fn verify_password(
    password: &str,
    password_hash: &str,
) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(password_hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user with the given credentials. Returns the user id.
    pub async fn create(
        &self,
        email: &str,
        password: &str,
        role: UserRole,
    ) -> Result<i64, UserStoreError> {
        let password_hash = hash_password(password).map_err(UserStoreError::Password)?;

        let result = sqlx::query("INSERT INTO users (email, password_hash, role) VALUES (?, ?, ?)")
            .bind(email)
            .bind(&password_hash)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get a user by id.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserStoreError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, email, role, active FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by email.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, UserStoreError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, email, role, active FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Verify credentials. Returns the user on a match, `None` for an
    /// unknown email or a wrong password, indistinguishably.
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, UserStoreError> {
        let row: Option<(i64, String, String, i32, String)> = sqlx::query_as(
            "SELECT id, email, role, active, password_hash FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, email, role, active, password_hash)) = row else {
            return Ok(None);
        };

        if !verify_password(password, &password_hash).map_err(UserStoreError::Password)? {
            return Ok(None);
        }

        Ok(Some(User {
            id,
            email,
            role: UserRole::from_str(&role),
            active: active != 0,
        }))
    }

    /// Set the role for a user by email. Used by the admin bootstrap flag.
    pub async fn set_role_by_email(
        &self,
        email: &str,
        role: UserRole,
    ) -> Result<bool, UserStoreError> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE email = ?")
            .bind(role.as_str())
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user by id.
    pub async fn delete(&self, id: i64) -> Result<bool, UserStoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all users, newest last. For the admin listing.
    pub async fn list(&self) -> Result<Vec<UserSummary>, UserStoreError> {
        let rows: Vec<UserSummaryRow> = sqlx::query_as(
            "SELECT id, email, role, active, created_at FROM users ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(UserSummary::from).collect())
    }
}

#[async_trait::async_trait]
impl UserDirectory for super::Database {
    async fn find_by_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, DirectoryError> {
        self.users()
            .verify_credentials(email, password)
            .await
            .map_err(|e| DirectoryError(e.to_string()))
    }

    async fn find_by_id(&self, owner_id: i64) -> Result<Option<User>, DirectoryError> {
        self.users()
            .get_by_id(owner_id)
            .await
            .map_err(|e| DirectoryError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_verify_credentials_roundtrip() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create("alice@example.com", "correct horse battery", UserRole::User)
            .await
            .unwrap();

        let user = db
            .users()
            .verify_credentials("alice@example.com", "correct horse battery")
            .await
            .unwrap()
            .expect("credentials should match");
        assert_eq!(user.id, id);
    }

    #[tokio::test]
    async fn test_wrong_password_is_absent() {
        let db = Database::open(":memory:").await.unwrap();
        db.users()
            .create("alice@example.com", "correct horse battery", UserRole::User)
            .await
            .unwrap();

        let result = db
            .users()
            .verify_credentials("alice@example.com", "wrong password here")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_unknown_email_is_absent() {
        let db = Database::open(":memory:").await.unwrap();

        let result = db
            .users()
            .verify_credentials("nobody@example.com", "whatever password")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_password_hashes_are_salted() {
        let db = Database::open(":memory:").await.unwrap();
        db.users()
            .create("a@example.com", "same password here", UserRole::User)
            .await
            .unwrap();
        db.users()
            .create("b@example.com", "same password here", UserRole::User)
            .await
            .unwrap();

        let hashes: Vec<(String,)> = sqlx::query_as("SELECT password_hash FROM users")
            .fetch_all(db.pool())
            .await
            .unwrap();
        assert_ne!(hashes[0].0, hashes[1].0);
    }

    #[tokio::test]
    async fn test_set_role_by_email() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create("alice@example.com", "correct horse battery", UserRole::User)
            .await
            .unwrap();

        assert!(
            db.users()
                .set_role_by_email("alice@example.com", UserRole::Admin)
                .await
                .unwrap()
        );
        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.role, UserRole::Admin);

        assert!(
            !db.users()
                .set_role_by_email("nobody@example.com", UserRole::Admin)
                .await
                .unwrap()
        );
    }
}
