//! Refresh cookie handling.
//!
//! The refresh token never travels in a response body. It is set as an
//! HTTP-only cookie scoped to the session endpoints, so the browser only
//! ever sends it where rotation and logout happen.

use axum::http::header;

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Path the refresh cookie is scoped to: the session endpoints only.
pub const REFRESH_COOKIE_PATH: &str = "/api/sessions";

/// Build the Set-Cookie value carrying a refresh token.
pub fn refresh_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path={}; Max-Age={}{}",
        REFRESH_COOKIE_NAME, token, REFRESH_COOKIE_PATH, max_age_secs, secure
    )
}

/// Build the Set-Cookie value that clears the refresh cookie.
pub fn clear_refresh_cookie(secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}=; HttpOnly; SameSite=Lax; Path={}; Max-Age=0{}",
        REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH, secure
    )
}

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}
