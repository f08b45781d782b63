//! Cart JSON route handlers.
//!
//! Every cart endpoint answers with the envelope
//! `{success, cart?, pendingLines?, error?}`.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;
use tracing::instrument;

use super::JsonBody;
use crate::cart::PendingLine;
use crate::error::{AppError, add_breadcrumb};
use crate::models::session_keys;
use crate::shopify::{Cart, CartLineInput};
use crate::state::AppState;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart: Option<Cart>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending_lines: Vec<PendingLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CartEnvelope {
    fn ok(cart: Cart) -> Response {
        Json(Self {
            success: true,
            cart: Some(cart),
            ..Self::default()
        })
        .into_response()
    }

    fn fail(err: impl Into<AppError>) -> Response {
        let err = err.into();
        err.report();
        (
            err.status(),
            Json(Self {
                error: Some(err.client_message()),
                ..Self::default()
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateCartRequest {
    #[serde(default)]
    pub lines: Vec<CartLineInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLineRequest {
    pub merchandise_id: String,
    #[serde(default = "one")]
    pub quantity: i64,
}

const fn one() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLineRequest {
    pub line_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveLinesRequest {
    pub line_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutUrlRequest {
    pub cart_id: Option<String>,
}

fn bad_request(msg: &str) -> Response {
    CartEnvelope::fail(AppError::BadRequest(msg.to_string()))
}

/// Create a cart.
///
/// # Route
///
/// `POST /api/cart`
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    body: Option<Json<CreateCartRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    if request.lines.iter().any(|l| l.quantity < 1) {
        return bad_request("Quantity must be at least 1");
    }

    match state.cart().create(request.lines).await {
        Ok(cart) => {
            if let Err(e) = session.insert(session_keys::CART_ID, &cart.id).await {
                tracing::warn!(error = %e, "Failed to remember cart in session");
            }
            CartEnvelope::ok(cart)
        }
        Err(e) => CartEnvelope::fail(e),
    }
}

/// Fetch a cart with any optimistic lines.
///
/// # Route
///
/// `GET /api/cart/{cart_id}`
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(cart_id): Path<String>) -> Response {
    match state.cart().get(&cart_id).await {
        Ok(view) => Json(CartEnvelope {
            success: true,
            cart: Some(view.cart),
            pending_lines: view.pending_lines,
            error: None,
        })
        .into_response(),
        Err(e) => CartEnvelope::fail(e),
    }
}

/// Add an item.
///
/// # Route
///
/// `POST /api/cart/{cart_id}/lines`
#[instrument(skip(state, request))]
pub async fn add_line(
    State(state): State<AppState>,
    Path(cart_id): Path<String>,
    JsonBody(request): JsonBody<AddLineRequest>,
) -> Response {
    if request.merchandise_id.is_empty() {
        return bad_request("merchandiseId is required");
    }
    if request.quantity < 1 {
        return bad_request("Quantity must be at least 1");
    }

    add_breadcrumb(
        "cart",
        "Add to cart",
        Some(&[("merchandise_id", request.merchandise_id.as_str())]),
    );

    match state
        .cart()
        .add_item(&cart_id, &request.merchandise_id, request.quantity)
        .await
    {
        Ok(cart) => CartEnvelope::ok(cart),
        Err(e) => CartEnvelope::fail(e),
    }
}

/// Change a line's quantity. Debounced; `0` removes the line.
///
/// # Route
///
/// `PATCH /api/cart/{cart_id}/lines`
#[instrument(skip(state, request))]
pub async fn update_line(
    State(state): State<AppState>,
    Path(cart_id): Path<String>,
    JsonBody(request): JsonBody<UpdateLineRequest>,
) -> Response {
    if request.line_id.is_empty() {
        return bad_request("lineId is required");
    }
    if request.quantity < 0 {
        return bad_request("Quantity cannot be negative");
    }

    match state
        .cart()
        .update_quantity(&cart_id, &request.line_id, request.quantity)
        .await
    {
        Ok(cart) => CartEnvelope::ok(cart),
        Err(e) => CartEnvelope::fail(e),
    }
}

/// Remove lines.
///
/// # Route
///
/// `DELETE /api/cart/{cart_id}/lines`
#[instrument(skip(state, request))]
pub async fn remove_lines(
    State(state): State<AppState>,
    Path(cart_id): Path<String>,
    JsonBody(request): JsonBody<RemoveLinesRequest>,
) -> Response {
    if request.line_ids.is_empty() {
        return bad_request("lineIds is required");
    }

    match state.cart().remove_lines(&cart_id, request.line_ids).await {
        Ok(cart) => CartEnvelope::ok(cart),
        Err(e) => CartEnvelope::fail(e),
    }
}

/// Resolve the Shopify checkout URL for a cart.
///
/// # Route
///
/// `POST /api/checkout-url`
#[instrument(skip_all)]
pub async fn checkout_url(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CheckoutUrlRequest>,
) -> Response {
    let Some(cart_id) = request.cart_id.filter(|id| !id.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"checkoutUrl": null, "error": "Cart ID is required"})),
        )
            .into_response();
    };

    match state.cart().get(&cart_id).await {
        Ok(view) => Json(json!({"checkoutUrl": view.cart.checkout_url})).into_response(),
        Err(e) => {
            let err = AppError::from(e);
            err.report();
            (
                err.status(),
                Json(json!({"checkoutUrl": null, "error": err.client_message()})),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cart::tests::FakeCartApi;
    use crate::routes::test_support::TestApp;

    async fn app() -> TestApp {
        TestApp::with_cart_api(Arc::new(FakeCartApi::default())).await
    }

    fn encode(id: &str) -> String {
        urlencoding::encode(id).into_owned()
    }

    #[tokio::test]
    async fn test_create_add_update_remove() {
        let app = app().await;

        let body = TestApp::json(app.post_json("/api/cart", &json!({})).await).await;
        assert_eq!(body["success"], true);
        let cart_id = body["cart"]["id"].as_str().unwrap().to_string();
        let lines_path = format!("/api/cart/{}/lines", encode(&cart_id));

        let body = TestApp::json(
            app.post_json(&lines_path, &json!({"merchandiseId": "v1", "quantity": 2}))
                .await,
        )
        .await;
        assert_eq!(body["cart"]["lines"][0]["quantity"], 2);
        let line_id = body["cart"]["lines"][0]["id"].as_str().unwrap().to_string();

        let body = TestApp::json(
            app.send_json("PATCH", &lines_path, &json!({"lineId": line_id, "quantity": 5}))
                .await,
        )
        .await;
        assert_eq!(body["cart"]["lines"][0]["quantity"], 5);

        let body = TestApp::json(
            app.send_json("DELETE", &lines_path, &json!({"lineIds": [line_id]}))
                .await,
        )
        .await;
        assert_eq!(body["success"], true);
        assert_eq!(body["cart"]["lines"], json!([]));
        assert!(body.get("pendingLines").is_none());
    }

    #[tokio::test]
    async fn test_unknown_cart_is_404_envelope() {
        let app = app().await;
        let response = app.get("/api/cart/missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = TestApp::json(response).await;
        assert_eq!(body, json!({"success": false, "error": "Cart not found"}));
    }

    #[tokio::test]
    async fn test_add_rejects_zero_quantity() {
        let app = app().await;
        let response = app
            .post_json(
                "/api/cart/any/lines",
                &json!({"merchandiseId": "v1", "quantity": 0}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_checkout_url() {
        let app = app().await;
        let body = TestApp::json(app.post_json("/api/cart", &json!({})).await).await;
        let cart_id = body["cart"]["id"].as_str().unwrap();

        let body = TestApp::json(
            app.post_json("/api/checkout-url", &json!({"cartId": cart_id}))
                .await,
        )
        .await;
        assert!(
            body["checkoutUrl"]
                .as_str()
                .unwrap()
                .starts_with("https://artfulfam.myshopify.com/cart/c/")
        );
    }

    #[tokio::test]
    async fn test_checkout_url_requires_cart_id() {
        let app = app().await;
        let response = app.post_json("/api/checkout-url", &json!({})).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = TestApp::json(response).await;
        assert_eq!(
            body,
            json!({"checkoutUrl": null, "error": "Cart ID is required"})
        );
    }
}
