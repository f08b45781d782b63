//! Middleware for the broker.

mod request_id;
mod signed;

pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
pub use signed::Signed;

use axum::http::{
    HeaderValue,
    header::{CACHE_CONTROL, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS},
};
use tower::ServiceBuilder;
use tower::layer::util::{Identity, Stack};
use tower_http::set_header::SetResponseHeaderLayer;

type HeaderLayer = SetResponseHeaderLayer<HeaderValue>;

/// Layer stack type returned by [`security_headers`].
pub type SecurityHeadersLayer = ServiceBuilder<
    Stack<HeaderLayer, Stack<HeaderLayer, Stack<HeaderLayer, Identity>>>,
>;

/// Broker responses are never framed, sniffed or cached.
#[must_use]
pub fn security_headers() -> SecurityHeadersLayer {
    ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}
