use axum::{extract::State, Extension, Json};
use chrono::Utc;

use crate::{
    error::Result,
    models::{
        connection::{ConnectionStatus, Provider},
        session::Session,
    },
    state::AppState,
};

/// Reports whether the signed-in user has linked a Google account.
#[axum::debug_handler]
pub async fn google_status(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<ConnectionStatus>> {
    let record = state
        .connections
        .find(session.user.id, Provider::Google)
        .await?;

    let status = match record {
        Some(record) => ConnectionStatus::from_record(&record, Utc::now().timestamp()),
        None => ConnectionStatus::disconnected(Provider::Google),
    };

    tracing::debug!("Connect status for {}: {}", session.user.id, status.connected);
    Ok(Json(status))
}
