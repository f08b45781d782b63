//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::broker::BrokerClient;
use crate::cart::CartService;
use crate::config::StorefrontConfig;
use crate::shopify::{CartApi, CustomerClient, StorefrontClient};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the configuration and the upstream clients built from it.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    storefront: StorefrontClient,
    customer: Option<CustomerClient>,
    cart: CartService,
    broker: Option<BrokerClient>,
}

impl AppState {
    /// Build state from configuration.
    ///
    /// The cart coordinator drives the same Storefront client the catalog
    /// routes use.
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: Option<PgPool>) -> Self {
        let storefront = StorefrontClient::new(&config.shopify);
        let cart = CartService::new(Arc::new(storefront.clone()), config.cart_debounce);
        Self::assemble(config, pool, storefront, cart)
    }

    /// Build state with a caller-supplied cart backend.
    #[must_use]
    pub fn with_cart_api(
        config: StorefrontConfig,
        pool: Option<PgPool>,
        cart_api: Arc<dyn CartApi>,
    ) -> Self {
        let storefront = StorefrontClient::new(&config.shopify);
        let cart = CartService::new(cart_api, config.cart_debounce);
        Self::assemble(config, pool, storefront, cart)
    }

    fn assemble(
        config: StorefrontConfig,
        pool: Option<PgPool>,
        storefront: StorefrontClient,
        cart: CartService,
    ) -> Self {
        let customer = config.customer.as_ref().map(|customer| {
            CustomerClient::new(
                customer,
                &config.shopify.api_version,
                config.customer_redirect_uri(),
            )
        });
        let broker = config
            .broker
            .as_ref()
            .map(|broker| BrokerClient::new(broker, config.shopify.store_domain.clone()));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                storefront,
                customer,
                cart,
                broker,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Database pool, present only when a database URL is configured.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    /// Get a reference to the Shopify Storefront API client.
    #[must_use]
    pub fn storefront(&self) -> &StorefrontClient {
        &self.inner.storefront
    }

    /// Customer Account API client, when customer login is configured.
    #[must_use]
    pub fn customer(&self) -> Option<&CustomerClient> {
        self.inner.customer.as_ref()
    }

    #[must_use]
    pub fn cart(&self) -> &CartService {
        &self.inner.cart
    }

    /// Broker client, when `BROKER_BASE_URL` and `BROKER_SHARED_SECRET` are set.
    #[must_use]
    pub fn broker(&self) -> Option<&BrokerClient> {
        self.inner.broker.as_ref()
    }
}
