//! Shopify Admin OAuth: connect a shop and keep its offline token.
//!
//! # Flow
//!
//! 1. `/admin/broker/start` stores a random `state` and the shop in the
//!    session (10 minutes) and redirects to Shopify.
//! 2. Shopify redirects back to `/admin/broker/callback` with `code`,
//!    `state`, `shop` and `hmac`.
//! 3. The callback consumes the stored values, checks state, shop and HMAC,
//!    exchanges the code and saves the token.
//!
//! Any failure ends the flow; the operator starts again from step 1.

use artfulfam_core::ShopDomain;
use artfulfam_core::crypto::{constant_time_eq, random_token, verify_query_hmac};
use axum::{
    Json,
    extract::{Query, RawQuery, State},
    response::Response,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use super::{found, resolve_shop};
use crate::config::BrokerConfig;
use crate::error::{AppError, Result};
use crate::middleware::Signed;
use crate::session::{OAUTH_VALUE_TTL, keys, put_expiring, take_valid};
use crate::shopify::oauth;
use crate::state::AppState;
use crate::store::BrokerToken;

/// Bytes of randomness in the OAuth `state`.
const STATE_BYTES: usize = 32;

fn require_enabled(config: &BrokerConfig) -> Result<()> {
    if config.oauth.enabled {
        Ok(())
    } else {
        Err(AppError::Disabled)
    }
}

fn credentials(config: &BrokerConfig) -> Result<(&str, &str)> {
    config.oauth.credentials().ok_or_else(|| {
        AppError::Config("Admin broker missing ADMIN_BROKER_CLIENT_ID/SECRET.".to_string())
    })
}

#[derive(Debug, Deserialize)]
pub struct ShopQuery {
    #[serde(default)]
    shop: Option<String>,
}

/// Begin the authorization-code flow.
///
/// # Route
///
/// `GET /admin/broker/start?shop=` (alias `GET /api/auth/shopify/install`)
#[instrument(skip(state, session))]
pub async fn start(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ShopQuery>,
) -> Result<Response> {
    let config = state.config();
    require_enabled(config)?;
    let (client_id, _) = credentials(config)?;

    let shop = resolve_shop(&[query.shop.as_deref()], config).map_err(|_| {
        AppError::BadRequest(
            "Missing shop. Provide ?shop=example.myshopify.com or ADMIN_BROKER_SHOP.".to_string(),
        )
    })?;

    let oauth_state = random_token(STATE_BYTES);
    put_expiring(&session, keys::ADMIN_BROKER_STATE, &oauth_state, OAUTH_VALUE_TTL).await?;
    put_expiring(&session, keys::ADMIN_BROKER_SHOP, &shop, OAUTH_VALUE_TTL).await?;

    let url = oauth::authorization_url(
        &shop,
        client_id,
        &config.oauth.scopes,
        &config.oauth.redirect_uri,
        &oauth_state,
    )
    .map_err(|e| AppError::Internal(format!("authorization url: {e}")))?;

    tracing::info!(shop = %shop, "Starting Admin OAuth");
    Ok(found(url))
}

/// Finish the flow and store the shop's token.
///
/// # Route
///
/// `GET /admin/broker/callback` (alias `GET /api/auth/shopify/callback`)
#[instrument(skip_all)]
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    RawQuery(query): RawQuery,
) -> Result<Response> {
    let config = state.config();
    require_enabled(config)?;
    let (client_id, client_secret) = credentials(config)?;

    let pairs: Vec<(String, String)> =
        url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
            .into_owned()
            .collect();
    let param = |name: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    };

    let expected_state: Option<String> = take_valid(&session, keys::ADMIN_BROKER_STATE).await?;
    let expected_shop: Option<ShopDomain> = take_valid(&session, keys::ADMIN_BROKER_SHOP).await?;

    let (Some(code), Some(returned_state), Some(expected_state)) =
        (param("code"), param("state"), expected_state)
    else {
        return Err(AppError::BadRequest("Invalid OAuth state".to_string()));
    };
    if !constant_time_eq(returned_state, &expected_state) {
        tracing::warn!("Admin OAuth state mismatch");
        return Err(AppError::BadRequest("Invalid OAuth state".to_string()));
    }

    let shop = match param("shop") {
        Some(raw) => ShopDomain::normalize(raw).ok(),
        None => expected_shop.clone(),
    };
    let shop = match (shop, expected_shop) {
        (Some(shop), Some(expected)) if shop == expected => shop,
        _ => return Err(AppError::BadRequest("OAuth shop mismatch".to_string())),
    };

    let signed_pairs = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()));
    if !verify_query_hmac(client_secret, signed_pairs) {
        tracing::warn!(shop = %shop, "Admin OAuth callback HMAC mismatch");
        return Err(AppError::BadRequest("Invalid OAuth HMAC".to_string()));
    }

    let token = oauth::exchange_code(
        state.http(),
        &config.shop_origin(&shop),
        client_id,
        client_secret,
        code,
    )
    .await
    .map_err(|e| {
        tracing::warn!(shop = %shop, error = %e, "Admin OAuth token exchange failed");
        AppError::Upstream("OAuth token exchange failed".to_string())
    })?;

    state
        .tokens()
        .set(BrokerToken {
            shop: shop.clone(),
            access_token: token.access_token,
            scope: token.scope,
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!(shop = %shop, "Admin broker connected");
    Ok(found(format!("/admin/broker?connected={shop}")))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStatus {
    enabled: bool,
    shop: Option<ShopDomain>,
    has_client_id: bool,
    has_client_secret: bool,
    redirect_uri: String,
    scopes: String,
    connected_shops: Vec<ShopDomain>,
}

/// Configuration summary and connected shops. Never includes secrets.
///
/// # Route
///
/// `GET /admin/broker`
pub async fn status(State(state): State<AppState>) -> Result<Json<BrokerStatus>> {
    let oauth = &state.config().oauth;
    Ok(Json(BrokerStatus {
        enabled: oauth.enabled,
        shop: oauth.shop.clone(),
        has_client_id: oauth.client_id.is_some(),
        has_client_secret: oauth.client_secret.is_some(),
        redirect_uri: oauth.redirect_uri.clone(),
        scopes: oauth.scopes.clone(),
        connected_shops: state.tokens().list().await?,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct DisconnectBody {
    #[serde(default)]
    shop: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    success: bool,
    shop: ShopDomain,
    removed: bool,
}

/// Forget a shop's token. Signed like the customer API.
///
/// The shop comes from signed input only: the `X-Broker-Shop` header, then
/// the body, then `ADMIN_BROKER_SHOP`. A `?shop=` that names a different shop
/// is rejected.
///
/// # Route
///
/// `POST /admin/broker/disconnect?shop=`
#[instrument(skip_all)]
pub async fn disconnect(
    State(state): State<AppState>,
    Query(query): Query<ShopQuery>,
    request: Signed<DisconnectBody>,
) -> Result<Json<DisconnectResponse>> {
    let shop = resolve_shop(
        &[
            request.shop.as_ref().map(ShopDomain::as_str),
            request.body.shop.as_deref(),
        ],
        state.config(),
    )?;

    let retargeted = query
        .shop
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .is_some_and(|raw| ShopDomain::normalize(raw).ok().as_ref() != Some(&shop));
    if retargeted {
        tracing::warn!(shop = %shop, "Disconnect query shop differs from signed shop");
        return Err(AppError::BadRequest(
            "Shop does not match signed request".to_string(),
        ));
    }

    let removed = state.tokens().delete(&shop).await?;
    tracing::info!(shop = %shop, removed, "Admin broker disconnected");

    Ok(Json(DisconnectResponse {
        success: true,
        shop,
        removed,
    }))
}
