//! HTTP route handlers for the broker.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                              - Liveness
//! GET  /health/ready                        - Readiness (database, when configured)
//!
//! # Admin OAuth
//! GET  /admin/broker                        - Status and connected shops
//! GET  /admin/broker/start?shop=            - Redirect to Shopify
//! GET  /admin/broker/callback               - Verify, exchange code, store token
//! POST /admin/broker/disconnect?shop=       - Forget a shop's token (signed)
//! GET  /api/auth/shopify/install            - Alias of /admin/broker/start
//! GET  /api/auth/shopify/callback           - Alias of /admin/broker/callback
//!
//! # Signed customer API
//! POST /admin/broker/api/customer-signup
//! POST /admin/broker/api/update-customer-sms
//! POST /admin/broker/api/customer-upsert
//! POST /admin/broker/api/customer-sms
//! ```

pub mod customers;
pub mod health;
pub mod oauth;

use artfulfam_core::ShopDomain;
use axum::{
    Router,
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::config::BrokerConfig;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Plain 302 redirect.
pub(crate) fn found(location: String) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

/// The first non-empty candidate, then `ADMIN_BROKER_SHOP`.
pub(crate) fn resolve_shop(candidates: &[Option<&str>], config: &BrokerConfig) -> Result<ShopDomain> {
    candidates
        .iter()
        .flatten()
        .find_map(|raw| ShopDomain::normalize(raw).ok())
        .or_else(|| config.oauth.shop.clone())
        .ok_or_else(|| AppError::BadRequest("Missing shop".to_string()))
}

fn oauth_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/broker", get(oauth::status))
        .route("/admin/broker/start", get(oauth::start))
        .route("/admin/broker/callback", get(oauth::callback))
        .route("/admin/broker/disconnect", post(oauth::disconnect))
        .route("/api/auth/shopify/install", get(oauth::start))
        .route("/api/auth/shopify/callback", get(oauth::callback))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/customer-signup", post(customers::customer_signup))
        .route("/update-customer-sms", post(customers::update_customer_sms))
        .route("/customer-upsert", post(customers::customer_upsert))
        .route("/customer-sms", post(customers::customer_sms))
}

/// Create all routes for the broker.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .merge(oauth_routes())
        .nest("/admin/broker/api", api_routes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    //! In-process router harness shared by the route tests.

    use std::sync::Arc;

    use artfulfam_core::crypto::BrokerSignature;
    use axum::body::Body;
    use axum::http::{Request, header};
    use chrono::Utc;
    use tower::ServiceExt;
    use tower_sessions::MemoryStore;

    use super::*;
    use crate::config::tests::test_config;
    use crate::store::{MemoryTokenStore, TokenStore};

    pub const SHOP: &str = "artfulfam.myshopify.com";
    pub const SHARED_SECRET: &str = "broker-shared-secret";
    pub const SIGNUP_SECRET: &str = "signup-token-secret";

    pub struct TestApp {
        router: axum::Router,
        pub tokens: Arc<MemoryTokenStore>,
    }

    impl TestApp {
        pub fn new(upstream: &str) -> Self {
            Self::with_config(test_config(upstream))
        }

        pub fn with_config(config: BrokerConfig) -> Self {
            let tokens = Arc::new(MemoryTokenStore::new());
            let store: Arc<dyn TokenStore> = tokens.clone();
            let state = AppState::with_token_store(config, None, store);
            Self {
                router: crate::app(state, MemoryStore::default()),
                tokens,
            }
        }

        /// Connect [`SHOP`] with `access_token`.
        pub async fn connect(&self, access_token: &str) {
            self.tokens
                .set(crate::store::BrokerToken {
                    shop: ShopDomain::normalize(SHOP).unwrap(),
                    access_token: secrecy::SecretString::from(access_token),
                    scope: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        pub async fn send(&self, request: Request<Body>) -> Response {
            self.router.clone().oneshot(request).await.unwrap()
        }

        pub async fn get(&self, uri: &str) -> Response {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        pub async fn get_with_cookie(&self, uri: &str, cookie: &str) -> Response {
            self.send(
                Request::get(uri)
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
        }

        /// POST `body` signed the way the storefront signs it.
        pub async fn post_signed(&self, uri: &str, body: &serde_json::Value) -> Response {
            self.post_signed_at(uri, body, Utc::now().timestamp_millis(), Some(SHOP))
                .await
        }

        pub async fn post_signed_at(
            &self,
            uri: &str,
            body: &serde_json::Value,
            timestamp_ms: i64,
            shop: Option<&str>,
        ) -> Response {
            let raw = body.to_string();
            let signature = BrokerSignature::sign(SHARED_SECRET, &raw, timestamp_ms, shop);
            let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
            for (name, value) in signature.headers() {
                builder = builder.header(name, value);
            }
            self.send(builder.body(Body::from(raw)).unwrap()).await
        }

        pub fn session_cookie(response: &Response) -> String {
            response.headers()[header::SET_COOKIE]
                .to_str()
                .unwrap()
                .split(';')
                .next()
                .unwrap()
                .to_string()
        }

        pub async fn json(response: Response) -> serde_json::Value {
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            serde_json::from_slice(&bytes).unwrap()
        }
    }

    pub fn location(response: &Response) -> String {
        response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .to_string()
    }
}
