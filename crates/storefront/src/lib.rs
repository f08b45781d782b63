//! Artfulfam Storefront library.
//!
//! The public JSON API behind the headless storefront UI: customer login via
//! the Shopify Customer Account API, the cart, the coming-soon gate, and
//! signed forwarding of signup writes to the private broker.
//!
//! Exposed as a library so the binary, the route tests and the integration
//! tests all build the same router through [`app`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod broker;
pub mod cart;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod shopify;
pub mod state;

use axum::{Router, http::Request};
use tower_http::trace::TraceLayer;
use tower_sessions::SessionStore;

use crate::middleware::{
    create_session_layer, request_id_middleware, security_headers, store_gate_middleware,
};
use crate::state::AppState;

/// Build the storefront router with its middleware stack.
///
/// Sentry layers are added by the binary so tests run without a hub.
pub fn app<S>(state: AppState, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = create_session_layer(session_store, state.config());

    routes::routes(state.config().rate_limit_enabled)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            store_gate_middleware,
        ))
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
