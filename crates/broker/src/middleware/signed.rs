//! Extractor for storefront-signed broker API requests.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. the broker is enabled (403)
//! 2. a shared secret is configured (500)
//! 3. the signature verifies within the allowed clock skew (401)
//! 4. the body is JSON of the expected shape (400)

use artfulfam_core::ShopDomain;
use artfulfam_core::crypto::{
    DEFAULT_MAX_SKEW_MS, ReceivedHeaders, SHOP_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER, broker,
};
use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::HeaderMap,
};
use chrono::Utc;
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::state::AppState;

/// Shop header Shopify-originated tooling sends; accepted as a fallback.
const SHOPIFY_SHOP_HEADER: &str = "x-shopify-shop";

/// A verified request body plus the shop named in its headers.
#[derive(Debug)]
pub struct Signed<T> {
    pub body: T,
    pub shop: Option<ShopDomain>,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
}

impl<T> FromRequest<AppState> for Signed<T>
where
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let config = state.config();
        if !config.oauth.enabled {
            return Err(AppError::Disabled);
        }
        let secret = config
            .shared_secret()
            .ok_or_else(|| AppError::Config("Missing BROKER_SHARED_SECRET on broker.".to_string()))?
            .to_string();

        let headers = req.headers();
        let shop = header(headers, SHOP_HEADER)
            .or_else(|| header(headers, SHOPIFY_SHOP_HEADER))
            .and_then(|raw| ShopDomain::normalize(raw).ok());
        let timestamp = header(headers, TIMESTAMP_HEADER).map(str::to_string);
        let signature = header(headers, SIGNATURE_HEADER).map(str::to_string);

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|_| AppError::BadRequest("Invalid JSON".to_string()))?;
        let raw_body = String::from_utf8_lossy(&bytes);

        broker::verify(
            &secret,
            &raw_body,
            ReceivedHeaders {
                timestamp: timestamp.as_deref(),
                signature: signature.as_deref(),
                shop: shop.as_ref().map(ShopDomain::as_str),
            },
            Utc::now().timestamp_millis(),
            DEFAULT_MAX_SKEW_MS,
        )?;

        let body = serde_json::from_slice(&bytes)
            .map_err(|_| AppError::BadRequest("Invalid JSON".to_string()))?;

        Ok(Self { body, shop })
    }
}
