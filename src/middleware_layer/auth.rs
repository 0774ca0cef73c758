use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;

use crate::{
    models::session::SessionKey,
    state::AppState,
};

/// Name of the cookie carrying the session key.
pub const SESSION_COOKIE: &str = "session_id";

/// Extracts the session key from the request cookies.
///
/// # Arguments
///
/// * `cookies` - The request cookies.
///
/// # Returns
///
/// An `Option` containing the session key if found.
pub fn extract_session_key(cookies: &Cookies) -> Option<SessionKey> {
    cookies
        .get(SESSION_COOKIE)
        .and_then(|cookie| SessionKey::parse(cookie.value()))
}

/// A middleware that requires a valid session to be present.
///
/// On success the request carries the `SessionKey` and the `Session` as
/// extensions.
pub async fn require_session(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    tracing::debug!("🔐 Checking authentication...");

    let key = extract_session_key(&cookies)
        .ok_or_else(|| {
            tracing::warn!("❌ No session_id cookie found");
            StatusCode::FORBIDDEN
        })?;

    let session = state
        .identity
        .get_session(key)
        .await
        .map_err(|e| {
            tracing::warn!("❌ Session lookup failed: {}", e);
            StatusCode::FORBIDDEN
        })?
        .ok_or_else(|| {
            tracing::warn!("❌ Session not found: {}", key);
            StatusCode::FORBIDDEN
        })?;

    tracing::debug!("✅ User authenticated: {}", session.user.id);

    request.extensions_mut().insert(key);
    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}
