//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                      - Liveness
//! GET  /health/ready                - Readiness (database, when configured)
//! GET  /coming-soon                 - Gate status for the coming-soon page
//!
//! # Customer Account OAuth (PKCE)
//! GET  /api/auth/login              - Redirect to Shopify
//! GET  /api/auth/callback           - Exchange code, store tokens
//! GET  /api/auth/logout             - Clear tokens, end Shopify session
//! POST /api/auth/logout
//! GET  /api/auth/customer           - Current customer (refreshes once)
//! GET  /api/auth/debug              - Configuration diagnostics
//!
//! # Cart
//! POST   /api/cart                  - Create cart
//! GET    /api/cart/{id}             - Cart plus pending lines
//! POST   /api/cart/{id}/lines       - Add item
//! PATCH  /api/cart/{id}/lines       - Update quantity (debounced)
//! DELETE /api/cart/{id}/lines       - Remove lines
//! POST   /api/checkout-url          - Checkout URL for a cart
//!
//! # Catalog
//! GET  /api/products/{handle}
//! GET  /api/collections/{handle}
//!
//! # Gate and broker forwarding
//! POST /api/unlock-store            - Store password
//! POST /api/customer-signup         - Forwarded to the broker
//! POST /api/update-customer-sms     - Forwarded to the broker
//! ```

pub mod cart;
pub mod catalog;
pub mod customer_auth;
pub mod gate;
pub mod health;
pub mod signup;

use axum::{
    Router,
    extract::FromRequest,
    routing::{get, post},
};

use crate::error::AppError;
use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// `Json` body whose rejection renders as `{"error": "Invalid JSON"}`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// Login, callback and logout. Strictly rate limited.
fn customer_login_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(customer_auth::login))
        .route("/callback", get(customer_auth::callback))
        .route(
            "/logout",
            get(customer_auth::logout).post(customer_auth::logout),
        )
}

/// Customer lookups the UI polls.
fn customer_read_routes() -> Router<AppState> {
    Router::new()
        .route("/customer", get(customer_auth::customer))
        .route("/debug", get(customer_auth::debug))
}

/// Unlock, signup and SMS. Strictly rate limited.
fn sensitive_routes() -> Router<AppState> {
    Router::new()
        .route("/unlock-store", post(gate::unlock_store))
        .route("/customer-signup", post(signup::customer_signup))
        .route("/update-customer-sms", post(signup::update_customer_sms))
}

/// Cart, checkout and catalog.
fn shop_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", post(cart::create))
        .route("/cart/{cart_id}", get(cart::show))
        .route(
            "/cart/{cart_id}/lines",
            post(cart::add_line)
                .patch(cart::update_line)
                .delete(cart::remove_lines),
        )
        .route("/checkout-url", post(cart::checkout_url))
        .route("/products/{handle}", get(catalog::product))
        .route("/collections/{handle}", get(catalog::collection))
}

/// Create all routes for the storefront.
///
/// Rate limiters need the peer address or a proxy header to key on, so they
/// are only attached when `rate_limited` is set.
pub fn routes(rate_limited: bool) -> Router<AppState> {
    let mut login = customer_login_routes();
    let mut reads = customer_read_routes();
    let mut sensitive = sensitive_routes();
    let mut shop = shop_routes();

    if rate_limited {
        login = login.layer(auth_rate_limiter());
        sensitive = sensitive.layer(auth_rate_limiter());
        reads = reads.layer(api_rate_limiter());
        shop = shop.layer(api_rate_limiter());
    }

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/coming-soon", get(gate::coming_soon))
        .nest("/api/auth", login.merge(reads))
        .nest("/api", sensitive.merge(shop))
}
