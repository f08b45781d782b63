//! Artfulfam Broker library.
//!
//! The private half of the system: it holds Shopify Admin tokens and performs
//! every customer write. The storefront reaches it only through signed
//! requests, and operators connect shops through the Admin OAuth flow.
//!
//! Exposed as a library so the binary, the route tests and the integration
//! tests all build the same router through [`app`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod middleware;
pub mod replay;
pub mod routes;
pub mod session;
pub mod shopify;
pub mod state;
pub mod store;

use axum::{Router, http::Request};
use tower_http::trace::TraceLayer;
use tower_sessions::SessionStore;

use crate::middleware::{request_id_middleware, security_headers};
use crate::session::create_session_layer;
use crate::state::AppState;

/// Build the broker router with its middleware stack.
///
/// Sentry layers are added by the binary so tests run without a hub.
pub fn app<S>(state: AppState, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = create_session_layer(session_store, state.config());

    routes::routes()
        .layer(session_layer)
        .layer(security_headers())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri().path(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}
