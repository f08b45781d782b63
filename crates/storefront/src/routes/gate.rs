//! Store password unlock and the coming-soon status endpoint.

use artfulfam_core::crypto::constant_time_eq;
use axum::{Json, extract::State};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_sessions::Session;
use tracing::instrument;

use super::JsonBody;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::store_gate::has_store_access;
use crate::models::session::{STORE_ACCESS_GRANTED, STORE_ACCESS_TTL, put_expiring};
use crate::models::session_keys;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    #[serde(default)]
    pub password: String,
}

/// Grant 24 hours of store access for the right password.
///
/// # Route
///
/// `POST /api/unlock-store`
#[instrument(skip_all)]
pub async fn unlock_store(
    State(state): State<AppState>,
    session: Session,
    JsonBody(request): JsonBody<UnlockRequest>,
) -> Result<Json<Value>> {
    if request.password.is_empty() {
        return Err(AppError::BadRequest("Password is required".to_string()));
    }

    let Some(expected) = &state.config().gate.password else {
        return Ok(Json(json!({"success": true})));
    };

    if !constant_time_eq(&request.password, expected.expose_secret()) {
        add_breadcrumb("gate", "Incorrect store password", None);
        return Err(AppError::Unauthorized("Incorrect password".to_string()));
    }

    put_expiring(
        &session,
        session_keys::STORE_ACCESS,
        STORE_ACCESS_GRANTED,
        STORE_ACCESS_TTL,
    )
    .await?;

    tracing::info!("Store unlocked for session");
    Ok(Json(json!({"success": true})))
}

/// What the coming-soon page needs to render.
///
/// # Route
///
/// `GET /coming-soon`
pub async fn coming_soon(State(state): State<AppState>, session: Session) -> Json<Value> {
    let unlocked = has_store_access(&session).await.unwrap_or(false);
    Json(json!({
        "passwordRequired": state.config().gate.is_active(),
        "brokerConfigured": state.broker().is_some(),
        "unlocked": unlocked,
    }))
}
