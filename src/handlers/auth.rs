use axum::{
    extract::{RawQuery, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use tower_cookies::{Cookies, Cookie};
use tower_cookies::cookie::time::Duration;

use crate::{
    crypto::csrf::generate_csrf_token,
    error::Result,
    flow::{FlowView, fragment::Landing},
    middleware_layer::{
        auth::{SESSION_COOKIE, extract_session_key},
        csrf::CSRF_COOKIE,
    },
    models::session::SessionKey,
    services::auth::{self as auth_service, ActionOutcome},
    state::AppState,
    validation::auth::validate_landing,
};

/// The request payload posted by the auth page after a provider redirect.
#[derive(Deserialize)]
pub struct CallbackRequest {
    /// `window.location.hash` as the browser saw it.
    #[serde(default)]
    pub fragment: String,
    /// `window.location.search` as the browser saw it.
    #[serde(default)]
    pub query: String,
}

/// Creates a secure cookie with the given name, value, and max age.
fn create_secure_cookie(name: &'static str, value: String, max_age_days: i64, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);

    if name != CSRF_COOKIE {
        cookie.set_http_only(true);
    }

    if secure {
        cookie.set_secure(true);
    }

    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(Duration::seconds(max_age_days * 86400));
    cookie.set_path("/");

    cookie
}

/// Expires a cookie in the browser.
fn remove_cookie(cookies: &Cookies, name: &'static str) {
    let mut cookie = Cookie::new(name, "");
    cookie.set_max_age(Duration::seconds(0));
    cookie.set_path("/");
    cookies.remove(cookie);
}

/// Issues a CSRF cookie for a signed-in browser that has none. It lives as
/// long as the session cookie.
fn ensure_csrf_cookie(cookies: &Cookies, state: &AppState) {
    if cookies.get(CSRF_COOKIE).is_some() {
        return;
    }

    cookies.add(create_secure_cookie(
        CSRF_COOKIE,
        generate_csrf_token(),
        state.config.session_duration_days,
        state.config.secure_cookies,
    ));
    tracing::info!("✅ CSRF cookie added");
}

/// Evaluates the auth page for the current session and query string.
#[axum::debug_handler]
pub async fn flow_status(
    State(state): State<AppState>,
    cookies: Cookies,
    RawQuery(query): RawQuery,
) -> Result<Json<FlowView>> {
    let landing = Landing::query_only(query.unwrap_or_default());
    validate_landing("", &landing.query)?;

    let key = extract_session_key(&cookies).unwrap_or_else(SessionKey::generate);
    let view = state.flow.visit(key, &landing).await;

    if view.user.is_some() {
        ensure_csrf_cookie(&cookies, &state);
    }

    Ok(Json(view))
}

/// Streams flow views as the session changes, ending once the flow redirects.
pub async fn flow_events(
    State(state): State<AppState>,
    cookies: Cookies,
    RawQuery(query): RawQuery,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let landing = Landing::query_only(query.unwrap_or_default());
    validate_landing("", &landing.query)?;

    let key = extract_session_key(&cookies).unwrap_or_else(SessionKey::generate);
    tracing::debug!("📡 Flow event stream opened for {}", key);

    let watch = state.flow.watch(key, &landing);
    let stream = futures::stream::unfold(Some(watch), |watch| async move {
        let mut watch = watch?;
        match watch.next().await {
            Some(view) => {
                let body = sonic_rs::to_string(&view)
                    .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());
                Some((Ok(Event::default().event("flow").data(body)), Some(watch)))
            }
            None => {
                watch.close();
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Handles the landing after a provider redirect.
///
/// Sets the session and CSRF cookies when the landing leaves the browser
/// signed in.
#[axum::debug_handler]
pub async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<CallbackRequest>,
) -> Result<Json<FlowView>> {
    validate_landing(&payload.fragment, &payload.query)?;

    let existing = extract_session_key(&cookies);
    let key = existing.unwrap_or_else(SessionKey::generate);
    let landing = Landing::new(payload.fragment, payload.query);

    let view = state.flow.visit(key, &landing).await;

    if view.user.is_some() {
        let days = state.config.session_duration_days;
        let secure = state.config.secure_cookies;

        if existing.is_none() {
            cookies.add(create_secure_cookie(SESSION_COOKIE, key.to_string(), days, secure));
            tracing::info!("✅ Session cookie added: session_id={}", key);
        }

        ensure_csrf_cookie(&cookies, &state);
    }

    Ok(Json(view))
}

/// Starts a Google sign-in.
#[axum::debug_handler]
pub async fn sign_in(State(state): State<AppState>) -> Json<ActionOutcome> {
    Json(auth_service::sign_in(state.identity.as_ref(), &state.config.public_origin).await)
}

/// Starts the Gmail connect step.
#[axum::debug_handler]
pub async fn connect(State(state): State<AppState>, cookies: Cookies) -> Json<ActionOutcome> {
    let key = extract_session_key(&cookies);
    Json(auth_service::connect_gmail(state.identity.as_ref(), key, &state.config.public_origin).await)
}

/// Handles user sign-out.
#[axum::debug_handler]
pub async fn sign_out(
    State(state): State<AppState>,
    Extension(key): Extension<SessionKey>,
    cookies: Cookies,
) -> Json<ActionOutcome> {
    let outcome = auth_service::sign_out(state.identity.as_ref(), key).await;

    if outcome.redirect_to.is_some() {
        remove_cookie(&cookies, SESSION_COOKIE);
        remove_cookie(&cookies, CSRF_COOKIE);
    }

    Json(outcome)
}
