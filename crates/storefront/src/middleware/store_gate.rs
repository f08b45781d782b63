//! "Coming soon" password gate.
//!
//! When `STORE_PASSWORD_ENABLED=true` and a password is set, every page
//! request needs an unexpired `store_access` grant in the session. API,
//! health and static paths are never gated so the unlock form keeps working.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::models::session::{STORE_ACCESS_GRANTED, get_valid};
use crate::models::session_keys;
use crate::state::AppState;

/// Where locked-out visitors are sent.
pub const COMING_SOON_PATH: &str = "/coming-soon";

/// Paths reachable without a grant.
fn is_exempt(path: &str) -> bool {
    path.starts_with("/api/")
        || path == COMING_SOON_PATH
        || path.starts_with("/health")
        || path.starts_with("/static/")
        || path == "/favicon.ico"
        || path == "/robots.txt"
}

/// Whether the session holds a valid grant.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn has_store_access(session: &Session) -> Result<bool, tower_sessions::session::Error> {
    let grant: Option<String> = get_valid(session, session_keys::STORE_ACCESS).await?;
    Ok(grant.as_deref() == Some(STORE_ACCESS_GRANTED))
}

/// Redirect (303) to `/coming-soon` unless the store is open or unlocked.
///
/// Must run inside the session layer.
pub async fn store_gate_middleware(
    State(state): State<AppState>,
    session: Session,
    request: Request,
    next: Next,
) -> Response {
    if !state.config().gate.is_active() || is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    match has_store_access(&session).await {
        Ok(true) => next.run(request).await,
        Ok(false) => Redirect::to(COMING_SOON_PATH).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read store access grant");
            Redirect::to(COMING_SOON_PATH).into_response()
        }
    }
}
