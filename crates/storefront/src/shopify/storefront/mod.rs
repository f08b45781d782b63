//! Shopify Storefront API client implementation.
//!
//! Sends hand-written GraphQL documents with `reqwest` 0.13.
//! Caches products and collections using `moka` (5-minute TTL). Carts are
//! never cached.

mod conversions;
pub mod queries;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use crate::config::ShopifyStorefrontConfig;
use crate::shopify::types::{Cart, CartLineInput, CartLineUpdateInput, Collection, Product};
use crate::shopify::{GraphQLRequest, GraphQLResponse, ShopifyError, http_client, truncate_body};

use conversions::{CartMutationPayload, RawCart, RawCollection, RawProduct};

/// Products shown on a collection lookup.
const COLLECTION_PRODUCT_COUNT: i64 = 50;

/// Entries per catalog cache.
const CATALOG_CACHE_CAPACITY: u64 = 500;

const CATALOG_TTL: Duration = Duration::from_secs(300);

// =============================================================================
// CartApi
// =============================================================================

/// The cart operations the storefront needs from Shopify.
///
/// Implemented by [`StorefrontClient`]; tests substitute an in-memory cart.
#[async_trait]
pub trait CartApi: Send + Sync {
    /// `cartCreate`, optionally with initial lines.
    async fn create_cart(&self, lines: Vec<CartLineInput>) -> Result<Cart, ShopifyError>;

    /// `cart(id:)`. A missing cart is [`ShopifyError::NotFound`].
    async fn get_cart(&self, cart_id: &str) -> Result<Cart, ShopifyError>;

    /// `cartLinesAdd`.
    async fn add_lines(
        &self,
        cart_id: &str,
        lines: Vec<CartLineInput>,
    ) -> Result<Cart, ShopifyError>;

    /// `cartLinesUpdate`.
    async fn update_lines(
        &self,
        cart_id: &str,
        lines: Vec<CartLineUpdateInput>,
    ) -> Result<Cart, ShopifyError>;

    /// `cartLinesRemove`.
    async fn remove_lines(
        &self,
        cart_id: &str,
        line_ids: Vec<String>,
    ) -> Result<Cart, ShopifyError>;
}

// =============================================================================
// StorefrontClient
// =============================================================================

#[derive(Deserialize)]
struct ProductData {
    product: Option<RawProduct>,
}

#[derive(Deserialize)]
struct CollectionData {
    collection: Option<RawCollection>,
}

fn catalog_cache<V: Send + Sync + 'static>() -> Cache<String, Arc<V>> {
    Cache::builder()
        .max_capacity(CATALOG_CACHE_CAPACITY)
        .time_to_live(CATALOG_TTL)
        .build()
}

/// Client for the Shopify Storefront API.
///
/// Provides access to products, collections, and cart operations.
/// Products and collections are cached for 5 minutes.
#[derive(Clone)]
pub struct StorefrontClient {
    inner: Arc<StorefrontClientInner>,
}

struct StorefrontClientInner {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
    products: Cache<String, Arc<Product>>,
    collections: Cache<String, Arc<Collection>>,
}

impl StorefrontClient {
    /// Create a new Storefront API client.
    #[must_use]
    pub fn new(config: &ShopifyStorefrontConfig) -> Self {
        Self {
            inner: Arc::new(StorefrontClientInner {
                client: http_client(),
                endpoint: config.graphql_endpoint(),
                access_token: config.storefront_token.expose_secret().to_string(),
                products: catalog_cache(),
                collections: catalog_cache(),
            }),
        }
    }

    /// Execute a GraphQL document and return its `data`.
    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ShopifyError> {
        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .header("X-Shopify-Storefront-Access-Token", &self.inner.access_token)
            .json(&GraphQLRequest::new(query, Some(variables)))
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ShopifyError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %truncate_body(&response_text, 500),
                "Shopify API returned non-success status"
            );
            return Err(ShopifyError::GraphQL(vec![crate::shopify::GraphQLError {
                message: format!("HTTP {status}: {}", truncate_body(&response_text, 200)),
                locations: vec![],
                path: vec![],
            }]));
        }

        let response: GraphQLResponse<T> = match serde_json::from_str(&response_text) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %truncate_body(&response_text, 500),
                    "Failed to parse Shopify GraphQL response"
                );
                return Err(ShopifyError::Parse(e));
            }
        };

        response.into_result()
    }

    // =========================================================================
    // Product Methods
    // =========================================================================

    /// Get a product by its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found or the API request fails.
    #[instrument(skip(self), fields(handle = %handle))]
    pub async fn get_product_by_handle(&self, handle: &str) -> Result<Product, ShopifyError> {
        if let Some(product) = self.inner.products.get(handle).await {
            debug!("catalog cache hit");
            return Ok(Product::clone(&product));
        }

        let data: ProductData = self
            .execute(&queries::get_product_by_handle(), json!({ "handle": handle }))
            .await?;

        let product = data
            .product
            .ok_or_else(|| ShopifyError::NotFound(format!("Product not found: {handle}")))?
            .into_product();

        self.inner
            .products
            .insert(handle.to_string(), Arc::new(product.clone()))
            .await;

        Ok(product)
    }

    // =========================================================================
    // Collection Methods
    // =========================================================================

    /// Get a collection and its best-selling products by handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection is not found or the API request fails.
    #[instrument(skip(self), fields(handle = %handle))]
    pub async fn get_collection_by_handle(&self, handle: &str) -> Result<Collection, ShopifyError> {
        if let Some(collection) = self.inner.collections.get(handle).await {
            debug!("catalog cache hit");
            return Ok(Collection::clone(&collection));
        }

        let data: CollectionData = self
            .execute(
                &queries::get_collection_by_handle(),
                json!({ "handle": handle, "first": COLLECTION_PRODUCT_COUNT }),
            )
            .await?;

        let collection = data
            .collection
            .ok_or_else(|| ShopifyError::NotFound(format!("Collection not found: {handle}")))?
            .into_collection();

        self.inner
            .collections
            .insert(handle.to_string(), Arc::new(collection.clone()))
            .await;

        Ok(collection)
    }
}

// =============================================================================
// Cart Methods (not cached - mutable state)
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartCreateData {
    cart_create: Option<CartMutationPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartLinesAddData {
    cart_lines_add: Option<CartMutationPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartLinesUpdateData {
    cart_lines_update: Option<CartMutationPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartLinesRemoveData {
    cart_lines_remove: Option<CartMutationPayload>,
}

#[derive(Deserialize)]
struct GetCartData {
    cart: Option<RawCart>,
}

fn missing_payload(operation: &str) -> ShopifyError {
    ShopifyError::GraphQL(vec![crate::shopify::GraphQLError {
        message: format!("{operation} returned no payload"),
        locations: vec![],
        path: vec![],
    }])
}

#[async_trait]
impl CartApi for StorefrontClient {
    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    async fn create_cart(&self, lines: Vec<CartLineInput>) -> Result<Cart, ShopifyError> {
        let data: CartCreateData = self
            .execute(&queries::cart_create(), json!({ "input": { "lines": lines } }))
            .await?;

        data.cart_create
            .ok_or_else(|| missing_payload("cartCreate"))?
            .into_cart("cartCreate")
    }

    #[instrument(skip(self), fields(cart_id = %cart_id))]
    async fn get_cart(&self, cart_id: &str) -> Result<Cart, ShopifyError> {
        let data: GetCartData = self
            .execute(&queries::get_cart(), json!({ "cartId": cart_id }))
            .await?;

        data.cart
            .map(RawCart::into_cart)
            .ok_or_else(|| ShopifyError::NotFound(format!("Cart not found: {cart_id}")))
    }

    #[instrument(skip(self, lines), fields(cart_id = %cart_id))]
    async fn add_lines(
        &self,
        cart_id: &str,
        lines: Vec<CartLineInput>,
    ) -> Result<Cart, ShopifyError> {
        let data: CartLinesAddData = self
            .execute(
                &queries::cart_lines_add(),
                json!({ "cartId": cart_id, "lines": lines }),
            )
            .await?;

        data.cart_lines_add
            .ok_or_else(|| missing_payload("cartLinesAdd"))?
            .into_cart("cartLinesAdd")
    }

    #[instrument(skip(self, lines), fields(cart_id = %cart_id))]
    async fn update_lines(
        &self,
        cart_id: &str,
        lines: Vec<CartLineUpdateInput>,
    ) -> Result<Cart, ShopifyError> {
        let data: CartLinesUpdateData = self
            .execute(
                &queries::cart_lines_update(),
                json!({ "cartId": cart_id, "lines": lines }),
            )
            .await?;

        data.cart_lines_update
            .ok_or_else(|| missing_payload("cartLinesUpdate"))?
            .into_cart("cartLinesUpdate")
    }

    #[instrument(skip(self, line_ids), fields(cart_id = %cart_id))]
    async fn remove_lines(
        &self,
        cart_id: &str,
        line_ids: Vec<String>,
    ) -> Result<Cart, ShopifyError> {
        let data: CartLinesRemoveData = self
            .execute(
                &queries::cart_lines_remove(),
                json!({ "cartId": cart_id, "lineIds": line_ids }),
            )
            .await?;

        data.cart_lines_remove
            .ok_or_else(|| missing_payload("cartLinesRemove"))?
            .into_cart("cartLinesRemove")
    }
}
