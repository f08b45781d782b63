//! Read-only product and collection lookups for the UI.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::shopify::{Collection, Product, ShopifyError};
use crate::state::AppState;

fn not_found_as_404(what: &str, handle: &str) -> impl FnOnce(ShopifyError) -> AppError {
    let message = format!("{what} not found: {handle}");
    move |err| match err {
        ShopifyError::NotFound(_) => AppError::NotFound(message),
        other => other.into(),
    }
}

/// # Route
///
/// `GET /api/products/{handle}`
#[instrument(skip(state))]
pub async fn product(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<Product>> {
    let product = state
        .storefront()
        .get_product_by_handle(&handle)
        .await
        .map_err(not_found_as_404("Product", &handle))?;
    Ok(Json(product))
}

/// # Route
///
/// `GET /api/collections/{handle}`
#[instrument(skip(state))]
pub async fn collection(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<Collection>> {
    let collection = state
        .storefront()
        .get_collection_by_handle(&handle)
        .await
        .map_err(not_found_as_404("Collection", &handle))?;
    Ok(Json(collection))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::routes::test_support::TestApp;

    #[tokio::test]
    async fn test_unknown_product_is_404() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/2025-10/graphql.json"))
            .and(body_string_contains("getProduct"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"product": null}
            })))
            .mount(&server)
            .await;

        let app = TestApp::new(&server.uri()).await;
        let response = app.get("/api/products/missing-print").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            TestApp::json(response).await,
            json!({"error": "Product not found: missing-print"})
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_is_502() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let app = TestApp::new(&server.uri()).await;
        let response = app.get("/api/collections/frontpage").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
