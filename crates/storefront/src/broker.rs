//! Signed forwarding to the private Admin broker.
//!
//! The storefront never holds an Admin API token. Signup and SMS writes are
//! relayed to the broker with an HMAC over the exact body bytes sent.

use artfulfam_core::ShopDomain;
use artfulfam_core::crypto::BrokerSignature;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::instrument;

use crate::config::BrokerClientConfig;

/// Broker path for newsletter signup.
pub const CUSTOMER_SIGNUP_PATH: &str = "/admin/broker/api/customer-signup";

/// Broker path for phone and SMS consent capture.
pub const UPDATE_CUSTOMER_SMS_PATH: &str = "/admin/broker/api/update-customer-sms";

#[derive(Debug, Error)]
pub enum BrokerClientError {
    /// `BROKER_BASE_URL` or `BROKER_SHARED_SECRET` is unset.
    #[error("Broker is not configured")]
    NotConfigured,

    #[error("Broker request failed: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("Failed to encode broker request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What the broker answered, relayed to the caller as-is.
#[derive(Debug, Clone)]
pub struct BrokerResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Clone)]
pub struct BrokerClient {
    client: reqwest::Client,
    base_url: String,
    shared_secret: SecretString,
    shop: ShopDomain,
}

impl BrokerClient {
    /// Create a client that signs requests for `shop`.
    #[must_use]
    pub fn new(config: &BrokerClientConfig, shop: ShopDomain) -> Self {
        Self {
            client: crate::shopify::http_client(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            shared_secret: config.shared_secret.clone(),
            shop,
        }
    }

    /// Sign `body` and POST it to `path` on the broker.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerClientError::Unreachable`] if the broker cannot be
    /// reached. Non-2xx answers are not errors; they are relayed.
    #[instrument(skip(self, body), fields(shop = %self.shop.as_str()))]
    pub async fn forward(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<BrokerResponse, BrokerClientError> {
        let payload = serde_json::to_string(body)?;
        let signature = BrokerSignature::sign(
            self.shared_secret.expose_secret(),
            &payload,
            chrono::Utc::now().timestamp_millis(),
            Some(self.shop.as_str()),
        );

        let mut request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (name, value) in signature.headers() {
            request = request.header(name, value);
        }

        let response = request.body(payload).send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        tracing::debug!(path, status, "Broker responded");

        Ok(BrokerResponse {
            status,
            content_type,
            body,
        })
    }
}
