//! Shopify Admin OAuth (authorization-code grant).
//!
//! The broker sends the merchant to `https://{shop}/admin/oauth/authorize`,
//! Shopify calls back with `code`, `state`, `shop` and an `hmac` over the
//! query, and the code is exchanged for an offline token at
//! `{origin}/admin/oauth/access_token`.

use artfulfam_core::ShopDomain;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use super::{AdminShopifyError, truncate_body};

/// An offline Admin API token returned by the exchange.
#[derive(Clone)]
pub struct OAuthToken {
    pub access_token: SecretString,
    pub scope: Option<String>,
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
}

#[derive(Deserialize)]
struct ExchangeResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Build the merchant-facing authorization URL.
///
/// # Errors
///
/// Returns an error if the shop does not form a valid URL.
pub fn authorization_url(
    shop: &ShopDomain,
    client_id: &str,
    scopes: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<String, url::ParseError> {
    let mut url = Url::parse(&format!("https://{shop}/admin/oauth/authorize"))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("scope", scopes)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("state", state);
    Ok(url.into())
}

/// Exchange an authorization code for an offline access token.
///
/// `origin` is the scheme and host to call, normally `https://{shop}`.
///
/// # Errors
///
/// Returns [`AdminShopifyError::OAuth`] on a non-2xx answer or a response
/// without `access_token`, or an HTTP error if the request fails.
#[instrument(skip(client, client_secret, code))]
pub async fn exchange_code(
    client: &reqwest::Client,
    origin: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
) -> Result<OAuthToken, AdminShopifyError> {
    let response = client
        .post(format!("{origin}/admin/oauth/access_token"))
        .json(&ExchangeRequest {
            client_id,
            client_secret,
            code,
        })
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    let parsed: Option<ExchangeResponse> = serde_json::from_str(&body).ok();

    if !status.is_success() {
        let detail = parsed
            .and_then(|p| p.error)
            .unwrap_or_else(|| truncate_body(&body, 200));
        return Err(AdminShopifyError::OAuth(format!(
            "token exchange returned {status}: {detail}"
        )));
    }

    match parsed {
        Some(ExchangeResponse {
            access_token: Some(access_token),
            scope,
            ..
        }) if !access_token.is_empty() => Ok(OAuthToken {
            access_token: SecretString::from(access_token),
            scope,
        }),
        _ => Err(AdminShopifyError::OAuth(
            "token exchange response had no access_token".to_string(),
        )),
    }
}
