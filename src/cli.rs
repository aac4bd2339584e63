//! CLI argument parsing, validation, and startup helpers.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

use crate::ServerConfig;
use crate::db::{Database, UserRole};
use crate::rate_limit::RateLimitConfig;
use crate::session::MemoryRefreshStore;

const MIN_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "Magpie", about = "CRM backend with rotating session tokens")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7380")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "magpie.db")]
    pub database: String,

    /// Public origin the API is served from (e.g., "https://crm.example.com").
    /// Cookies are marked Secure when this is https
    #[arg(long, default_value = "http://localhost:7380")]
    pub public_origin: String,

    /// Path to file containing the access-token signing secret.
    /// Prefer using the ACCESS_TOKEN_SECRET env var instead
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh-token signing secret.
    /// Prefer using the REFRESH_TOKEN_SECRET env var instead
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Promote an existing account to admin on startup
    #[arg(long, value_name = "EMAIL")]
    pub promote_admin: Option<String>,

    /// Disable new account registration
    #[arg(long)]
    pub no_signup: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// The two signing secrets, one per token purpose.
pub struct TokenSecrets {
    pub access: Vec<u8>,
    pub refresh: Vec<u8>,
}

fn load_secret(env_var: &str, file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking.
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            "{} is required. Set the environment variable (recommended) or use the corresponding --*-secret-file flag",
            env_var
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            env_var, MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load both signing secrets from environment variables or files.
/// Returns None and logs an error if either cannot be loaded, or if the two
/// are identical (a leaked access key must not be able to forge refresh
/// tokens).
pub fn load_token_secrets(args: &Args) -> Option<TokenSecrets> {
    let access = load_secret("ACCESS_TOKEN_SECRET", args.access_secret_file.as_deref())?;
    let refresh = load_secret("REFRESH_TOKEN_SECRET", args.refresh_secret_file.as_deref())?;

    if access == refresh {
        error!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        return None;
    }

    Some(TokenSecrets {
        access: access.into_bytes(),
        refresh: refresh.into_bytes(),
    })
}

/// Parse and validate the public-origin URL.
/// Returns None and logs an error if it does not parse.
pub fn validate_public_origin(public_origin: &str) -> Option<Url> {
    let url = match Url::parse(public_origin) {
        Ok(url) => url,
        Err(e) => {
            error!(origin = %public_origin, error = %e, "Invalid public-origin URL");
            return None;
        }
    };

    let is_https = url.scheme() == "https";
    let is_localhost = url.host_str() == Some("localhost");

    if !is_https && !is_localhost {
        warn!(
            "public-origin is not HTTPS; refresh cookies will be sent without the Secure flag"
        );
    }

    Some(url)
}

/// Promote an existing account to admin, logging the outcome.
pub async fn handle_promote_admin(db: &Database, email: &str) {
    match db.users().set_role_by_email(email, UserRole::Admin).await {
        Ok(true) => info!(email = %email, "Account promoted to admin"),
        Ok(false) => {
            error!(email = %email, "No account with that email; register it first");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "Failed to promote account");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    db: Database,
    public_origin: Url,
    secrets: TokenSecrets,
    no_signup: bool,
) -> ServerConfig {
    let secure_cookies = public_origin.scheme() == "https";

    ServerConfig {
        db,
        access_secret: secrets.access,
        refresh_secret: secrets.refresh,
        secure_cookies,
        no_signup,
        refresh_store: Arc::new(MemoryRefreshStore::new()),
        rate_limits: RateLimitConfig::new(),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
