use axum::{
    Router,
    routing::{get, post},
    middleware::{from_fn, from_fn_with_state},
};
use http::{HeaderName, HeaderValue, Method, header};
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{handlers, middleware_layer, state::AppState};

/// Liveness probe.
async fn health() -> &'static str {
    "ok"
}

/// Builds the application router around `state`.
pub fn build_router(state: AppState) -> Router {
    let cors = match HeaderValue::from_str(&state.config.public_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::COOKIE,
                HeaderName::from_static(middleware_layer::csrf::CSRF_HEADER),
            ])
            .allow_credentials(true)
            .max_age(Duration::from_secs(86400)),
        Err(e) => {
            tracing::warn!("PUBLIC_ORIGIN is not a valid header value, CORS disabled: {}", e);
            CorsLayer::new()
        }
    };

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/auth/flow", get(handlers::auth::flow_status))
        .route("/api/auth/flow/events", get(handlers::auth::flow_events))
        .route("/api/auth/callback", post(handlers::auth::callback))
        .route("/api/auth/sign-in", post(handlers::auth::sign_in))
        .route("/api/auth/connect", post(handlers::auth::connect))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/sign-out", post(handlers::auth::sign_out))
        .route(
            "/api/connections/google",
            get(handlers::connections::google_status),
        )
        .route_layer(from_fn(middleware_layer::csrf::verify_csrf))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_session,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(cors)
}
