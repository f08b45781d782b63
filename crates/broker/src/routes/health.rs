//! Liveness and readiness probes.

use axum::{extract::State, http::StatusCode};

use crate::state::AppState;

/// Returns "ok" while the process is up.
pub async fn health() -> &'static str {
    "ok"
}

/// 200 when the token database answers (or none is configured), else 503.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    let Some(pool) = state.pool() else {
        return StatusCode::OK;
    };
    match sqlx::query("SELECT 1").fetch_one(pool).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Token database not reachable");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
