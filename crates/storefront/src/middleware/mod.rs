//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers
//! 5. Session layer (tower-sessions, `PostgreSQL` or memory store)
//! 6. Store gate (redirect to `/coming-soon` while locked)
//! 7. Rate limiting (governor, per route group)

pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;
pub mod shopify_customer;
pub mod store_gate;

pub use rate_limit::{api_rate_limiter, auth_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers;
pub use session::create_session_layer;
pub use shopify_customer::{
    OptionalShopifyCustomer, clear_shopify_customer_token, set_shopify_customer_token,
    shopify_refresh_token,
};
pub use store_gate::store_gate_middleware;
