pub mod api;
pub mod auth;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod rate_limit;
pub mod session;

use api::create_api_router;
use axum::Router;
use db::Database;
use jwt::JwtConfig;
use rate_limit::RateLimitConfig;
use session::{RefreshTokenStore, SessionManager};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses a connection pool internally)
    pub db: Database,
    /// Signing secret for access tokens
    pub access_secret: Vec<u8>,
    /// Signing secret for refresh tokens (must differ from the access secret)
    pub refresh_secret: Vec<u8>,
    /// Whether to set the Secure flag on cookies (true in production with HTTPS)
    pub secure_cookies: bool,
    /// Whether new account registration is disabled
    pub no_signup: bool,
    /// Refresh token store. The default is process-local; a shared-cache
    /// implementation can be injected here without touching the protocol
    pub refresh_store: Arc<dyn RefreshTokenStore>,
    /// Rate limit quotas for the credential endpoints
    pub rate_limits: RateLimitConfig,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::new(&config.access_secret, &config.refresh_secret));

    let sessions = Arc::new(SessionManager::new(
        jwt.clone(),
        config.refresh_store.clone(),
        Arc::new(config.db.clone()),
    ));

    let api_router = create_api_router(
        config.db.clone(),
        jwt,
        sessions,
        config.secure_cookies,
        config.no_signup,
        Arc::new(config.rate_limits.clone()),
    );

    Router::new().nest("/api", api_router)
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> (tokio::task::JoinHandle<()>, SocketAddr) {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    let local_addr = listener.local_addr().expect("Failed to get local address");

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    (handle, local_addr)
}
