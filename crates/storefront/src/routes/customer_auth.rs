//! Shopify Customer Account OAuth route handlers.
//!
//! Authorization-code flow with PKCE:
//! - Login: store verifier, state and nonce (10 minutes), redirect to Shopify
//! - Callback: consume the stored values, check state, exchange the code
//! - Logout: clear tokens, end the Shopify session when an id token exists
//! - Customer: current customer, refreshing an expired token once

use artfulfam_core::crypto::{PkcePair, constant_time_eq, random_token};
use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::{
    OptionalShopifyCustomer, clear_shopify_customer_token, set_shopify_customer_token,
    shopify_refresh_token,
};
use crate::models::session::{OAUTH_VALUE_TTL, put_expiring, take_valid};
use crate::models::session_keys;
use crate::shopify::{Customer, CustomerAccessToken, CustomerClient, ShopifyError};
use crate::state::AppState;

/// Random bytes in the OAuth `state` and OpenID `nonce`.
const STATE_BYTES: usize = 16;

/// Query parameters from Shopify OAuth callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerResponse {
    pub customer: Option<Customer>,
    pub is_logged_in: bool,
}

impl CustomerResponse {
    const fn logged_out() -> Self {
        Self {
            customer: None,
            is_logged_in: false,
        }
    }
}

/// 302 to `location`.
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Back to the site with an `auth_error` code.
fn auth_error(state: &AppState, code: &str) -> Response {
    found(&format!(
        "{}/?auth_error={}",
        state.config().base_url,
        urlencoding::encode(code)
    ))
}

fn customer_client(state: &AppState) -> Result<&CustomerClient> {
    state
        .customer()
        .ok_or_else(|| AppError::Internal("Customer account login is not configured".to_string()))
}

/// Start the Customer Account login.
///
/// # Route
///
/// `GET /api/auth/login`
#[instrument(skip_all)]
pub async fn login(State(state): State<AppState>, session: Session) -> Result<Response> {
    let client = customer_client(&state)?;

    let pkce = PkcePair::generate();
    let oauth_state = random_token(STATE_BYTES);
    let nonce = random_token(STATE_BYTES);

    put_expiring(
        &session,
        session_keys::SHOPIFY_CODE_VERIFIER,
        &pkce.verifier,
        OAUTH_VALUE_TTL,
    )
    .await?;
    put_expiring(
        &session,
        session_keys::SHOPIFY_AUTH_STATE,
        &oauth_state,
        OAUTH_VALUE_TTL,
    )
    .await?;
    put_expiring(&session, session_keys::SHOPIFY_AUTH_NONCE, &nonce, OAUTH_VALUE_TTL).await?;

    Ok(found(&client.authorization_url(
        &oauth_state,
        &nonce,
        &pkce.challenge,
    )))
}

/// Handle the Shopify OAuth callback.
///
/// # Route
///
/// `GET /api/auth/callback`
#[instrument(skip_all)]
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Response {
    // One-time values are consumed whatever the outcome.
    let stored_state: Option<String> = take_valid(&session, session_keys::SHOPIFY_AUTH_STATE)
        .await
        .ok()
        .flatten();
    let verifier: Option<String> = take_valid(&session, session_keys::SHOPIFY_CODE_VERIFIER)
        .await
        .ok()
        .flatten();
    let _: Option<String> = take_valid(&session, session_keys::SHOPIFY_AUTH_NONCE)
        .await
        .ok()
        .flatten();

    if let Some(error) = query.error {
        tracing::warn!(
            error = %error,
            description = %query.error_description.unwrap_or_default(),
            "Shopify OAuth error"
        );
        return auth_error(&state, &error);
    }

    let Some(client) = state.customer() else {
        return auth_error(&state, "not_configured");
    };

    let (Some(code), Some(returned_state), Some(stored_state), Some(verifier)) =
        (query.code, query.state, stored_state, verifier)
    else {
        tracing::warn!("Shopify OAuth callback missing code, state or stored values");
        return auth_error(&state, "missing_params");
    };

    if !constant_time_eq(&returned_state, &stored_state) {
        tracing::warn!("Shopify OAuth state mismatch");
        return auth_error(&state, "invalid_state");
    }

    let token = match client.exchange_code(&code, &verifier).await {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(error = %e, "Failed to exchange Shopify OAuth code");
            return auth_error(&state, "token_exchange_failed");
        }
    };

    if let Err(e) = set_shopify_customer_token(&session, &token).await {
        tracing::error!(error = %e, "Failed to store Shopify customer token");
        return auth_error(&state, "session_error");
    }

    tracing::info!("Shopify customer authenticated");
    found(&format!("{}/?auth_success=true", state.config().base_url))
}

/// Log out locally and end the Shopify session.
///
/// # Route
///
/// `GET|POST /api/auth/logout`
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    OptionalShopifyCustomer(token): OptionalShopifyCustomer,
) -> Result<Response> {
    clear_shopify_customer_token(&session).await?;

    let site = &state.config().base_url;
    if let Some(client) = state.customer()
        && let Some(id_token) = token.and_then(|t| t.id_token)
    {
        return Ok(found(&client.logout_url(&id_token, site)));
    }

    Ok(found(site))
}

/// Swap the refresh token for a new access token.
///
/// Any failure clears the stored tokens and yields `None`.
async fn refresh_token(
    client: &CustomerClient,
    session: &Session,
    current: &CustomerAccessToken,
) -> Result<Option<CustomerAccessToken>> {
    let Some(refresh) = shopify_refresh_token(session, Some(current)).await? else {
        clear_shopify_customer_token(session).await?;
        return Ok(None);
    };

    match client.refresh(&refresh).await {
        Ok(mut token) => {
            if token.id_token.is_none() {
                token.id_token.clone_from(&current.id_token);
            }
            set_shopify_customer_token(session, &token).await?;
            Ok(Some(token))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Customer token refresh failed");
            clear_shopify_customer_token(session).await?;
            Ok(None)
        }
    }
}

/// The logged-in customer.
///
/// # Route
///
/// `GET /api/auth/customer`
#[instrument(skip_all)]
pub async fn customer(
    State(state): State<AppState>,
    session: Session,
    OptionalShopifyCustomer(token): OptionalShopifyCustomer,
) -> Result<Json<CustomerResponse>> {
    let (Some(client), Some(mut token)) = (state.customer(), token) else {
        return Ok(Json(CustomerResponse::logged_out()));
    };

    let mut refreshed = false;
    if token.is_expired() {
        match refresh_token(client, &session, &token).await? {
            Some(fresh) => token = fresh,
            None => return Ok(Json(CustomerResponse::logged_out())),
        }
        refreshed = true;
    }

    let customer = match client.get_customer(&token.access_token).await {
        Err(ShopifyError::Unauthorized) if !refreshed => {
            let Some(fresh) = refresh_token(client, &session, &token).await? else {
                return Ok(Json(CustomerResponse::logged_out()));
            };
            client.get_customer(&fresh.access_token).await
        }
        other => other,
    };

    match customer {
        Ok(customer) => Ok(Json(CustomerResponse {
            customer: Some(customer),
            is_logged_in: true,
        })),
        Err(ShopifyError::Unauthorized) => {
            clear_shopify_customer_token(&session).await?;
            Ok(Json(CustomerResponse::logged_out()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Configuration diagnostics without secret values.
///
/// # Route
///
/// `GET /api/auth/debug`
pub async fn debug(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.config();
    let client = state.customer();
    let env = &config.customer_env;

    Json(json!({
        "loginReady": env.login_ready(),
        "hasClientId": env.client_id.is_some(),
        "hasClientSecret": env.has_client_secret,
        "hasShopId": env.shop_id.is_some(),
        "shopIdValid": env.shop_id_valid(),
        "hasStorefrontToken": true,
        "storeDomain": config.shopify.store_domain.as_str(),
        "redirectUri": config.customer_redirect_uri(),
        "environment": config.environment,
        "authorizeEndpoint": client.map(CustomerClient::authorize_endpoint),
    }))
}
