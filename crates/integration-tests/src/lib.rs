//! End-to-end tests for the storefront and broker.
//!
//! [`TestStack`] runs both routers on ephemeral local ports, wired to each
//! other the way production wires them, with a `wiremock` server standing in
//! for every Shopify host. Nothing external is needed:
//!
//! ```bash
//! cargo test -p artfulfam-integration-tests
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use artfulfam_broker::config::{AdminOAuthConfig, BrokerConfig};
use artfulfam_broker::store::{BrokerToken, MemoryTokenStore, TokenStore};
use artfulfam_core::ShopDomain;
use artfulfam_storefront::config::{
    BrokerClientConfig, CustomerAccountEnv, ShopifyStorefrontConfig, StoreGateConfig,
    StorefrontConfig,
};
use secrecy::SecretString;
use tower_sessions::MemoryStore;
use wiremock::MockServer;

pub const SHOP: &str = "artfulfam.myshopify.com";
pub const SHARED_SECRET: &str = "integration-shared-secret";
pub const SIGNUP_SECRET: &str = "integration-signup-secret";
pub const CLIENT_ID: &str = "integration-client-id";
pub const CLIENT_SECRET: &str = "integration-client-secret";
pub const ADMIN_GRAPHQL_PATH: &str = "/admin/api/2025-10/graphql.json";

const SESSION_SECRET: &str = "Zq8rT2mW5vB9xK3nP7cL1hF6jD4gS0yE";

/// Both services plus a fake Shopify.
pub struct TestStack {
    pub shopify: MockServer,
    pub storefront_url: String,
    pub broker_url: String,
    pub tokens: Arc<MemoryTokenStore>,
    /// Keeps cookies and never follows redirects.
    pub client: reqwest::Client,
}

async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    });
    format!("http://{addr}")
}

fn broker_config(shopify: &str) -> BrokerConfig {
    BrokerConfig {
        host: [127, 0, 0, 1].into(),
        port: 0,
        public_url: "http://127.0.0.1".to_string(),
        session_secret: SecretString::from(SESSION_SECRET),
        database_url: None,
        oauth: AdminOAuthConfig {
            enabled: true,
            shop: Some(ShopDomain::normalize(SHOP).expect("valid shop")),
            client_id: Some(CLIENT_ID.to_string()),
            client_secret: Some(SecretString::from(CLIENT_SECRET)),
            scopes: "read_customers,write_customers".to_string(),
            redirect_uri: "http://127.0.0.1/admin/broker/callback".to_string(),
        },
        shared_secret: Some(SecretString::from(SHARED_SECRET)),
        signup_token_secret: Some(SecretString::from(SIGNUP_SECRET)),
        signup_token_single_use: true,
        private_admin_token: None,
        admin_api_version: "2025-10".to_string(),
        admin_base_url: Some(shopify.to_string()),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

fn storefront_config(shopify: &str, broker_url: &str) -> StorefrontConfig {
    StorefrontConfig {
        host: [127, 0, 0, 1].into(),
        port: 0,
        base_url: "http://127.0.0.1".to_string(),
        session_secret: SecretString::from(SESSION_SECRET),
        database_url: None,
        environment: "test".to_string(),
        shopify: ShopifyStorefrontConfig {
            store_domain: ShopDomain::normalize(SHOP).expect("valid shop"),
            api_version: "2025-10".to_string(),
            storefront_token: SecretString::from("storefront-token"),
            api_url: Some(format!("{shopify}/api/2025-10/graphql.json")),
        },
        customer: None,
        customer_env: CustomerAccountEnv::default(),
        gate: StoreGateConfig::default(),
        broker: Some(BrokerClientConfig {
            base_url: broker_url.to_string(),
            shared_secret: SecretString::from(SHARED_SECRET),
        }),
        cart_debounce: Duration::from_millis(50),
        rate_limit_enabled: false,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

impl TestStack {
    /// Start everything. The broker has no shop connected yet.
    pub async fn start() -> Self {
        let shopify = MockServer::start().await;

        let tokens = Arc::new(MemoryTokenStore::new());
        let store: Arc<dyn TokenStore> = tokens.clone();
        let broker_state = artfulfam_broker::state::AppState::with_token_store(
            broker_config(&shopify.uri()),
            None,
            store,
        );
        let broker_url = serve(artfulfam_broker::app(broker_state, MemoryStore::default())).await;

        let storefront_state = artfulfam_storefront::state::AppState::new(
            storefront_config(&shopify.uri(), &broker_url),
            None,
        );
        let storefront_url =
            serve(artfulfam_storefront::app(storefront_state, MemoryStore::default())).await;

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            shopify,
            storefront_url,
            broker_url,
            tokens,
            client,
        }
    }

    /// Start everything with [`SHOP`] already connected.
    pub async fn connected(access_token: &str) -> Self {
        let stack = Self::start().await;
        stack
            .tokens
            .set(BrokerToken {
                shop: ShopDomain::normalize(SHOP).expect("valid shop"),
                access_token: SecretString::from(access_token),
                scope: None,
                created_at: chrono::Utc::now(),
            })
            .await
            .expect("Failed to store token");
        stack
    }

    pub fn storefront(&self, path: &str) -> String {
        format!("{}{path}", self.storefront_url)
    }

    pub fn broker(&self, path: &str) -> String {
        format!("{}{path}", self.broker_url)
    }
}
