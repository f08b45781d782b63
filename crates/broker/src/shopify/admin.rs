//! Admin GraphQL client scoped to one shop.

use artfulfam_core::{Email, PhoneNumber};
use chrono::{DateTime, SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use tracing::instrument;

use super::queries::{
    CUSTOMER_BY_EMAIL, CUSTOMER_CREATE, CUSTOMER_SMS_CONSENT_UPDATE, CUSTOMER_UPDATE,
};
use super::{
    AdminShopifyError, GraphQLError, GraphQLRequest, GraphQLResponse, UserError,
    check_user_errors, truncate_body,
};

/// The identifying fields of a Shopify customer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CustomerRef {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Shopify Admin API client for a single shop and access token.
///
/// The access token is redacted from `Debug` output.
#[derive(Clone)]
pub struct AdminClient {
    client: reqwest::Client,
    endpoint: String,
    access_token: SecretString,
}

impl std::fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminClient")
            .field("endpoint", &self.endpoint)
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

// Response shapes

#[derive(Deserialize)]
struct CustomersData {
    customers: Nodes<CustomerRef>,
}

#[derive(Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationPayload {
    customer: Option<CustomerRef>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerCreateData {
    customer_create: MutationPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerUpdateData {
    customer_update: MutationPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SmsConsentData {
    customer_sms_marketing_consent_update: MutationPayload,
}

fn subscribed(consent_updated_at: Option<DateTime<Utc>>) -> serde_json::Value {
    let mut consent = json!({
        "marketingState": "SUBSCRIBED",
        "marketingOptInLevel": "SINGLE_OPT_IN",
    });
    if let (Some(at), Some(map)) = (consent_updated_at, consent.as_object_mut()) {
        map.insert(
            "consentUpdatedAt".to_string(),
            at.to_rfc3339_opts(SecondsFormat::Millis, true).into(),
        );
    }
    consent
}

impl AdminClient {
    /// Create a client for `endpoint` (the shop's Admin GraphQL URL).
    #[must_use]
    pub const fn new(client: reqwest::Client, endpoint: String, access_token: SecretString) -> Self {
        Self {
            client,
            endpoint,
            access_token,
        }
    }

    /// Execute a GraphQL document.
    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, AdminShopifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Shopify-Access-Token", self.access_token.expose_secret())
            .json(&GraphQLRequest { query, variables })
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(AdminShopifyError::RateLimited(retry_after));
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AdminShopifyError::Unauthorized(
                "Invalid or expired access token".to_string(),
            ));
        }

        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %truncate_body(&body, 500),
                "Admin API returned non-success status"
            );
            let message = serde_json::from_str::<GraphQLResponse<serde_json::Value>>(&body)
                .ok()
                .and_then(|r| r.errors)
                .and_then(|errors| errors.into_iter().next())
                .map_or_else(|| format!("Admin API HTTP {status}"), |e| e.message);
            return Err(AdminShopifyError::GraphQL(vec![GraphQLError { message }]));
        }

        serde_json::from_str::<GraphQLResponse<T>>(&body)?.into_result()
    }

    /// Look up a customer by exact email.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, email))]
    pub async fn find_customer_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<CustomerRef>, AdminShopifyError> {
        let data: CustomersData = self
            .execute(CUSTOMER_BY_EMAIL, json!({ "query": email.search_query() }))
            .await?;
        Ok(data.customers.nodes.into_iter().next())
    }

    /// Create a customer subscribed to email marketing.
    ///
    /// Returns `None` when Shopify reports success without a customer.
    ///
    /// # Errors
    ///
    /// Returns [`AdminShopifyError::UserError`] if Shopify rejects the input,
    /// or another error if the API request fails.
    #[instrument(skip(self, email))]
    pub async fn create_customer(
        &self,
        email: &Email,
        tags: &[String],
    ) -> Result<Option<CustomerRef>, AdminShopifyError> {
        let variables = json!({
            "input": {
                "email": email.as_str(),
                "emailMarketingConsent": subscribed(None),
                "tags": tags,
            }
        });
        let data: CustomerCreateData = self.execute(CUSTOMER_CREATE, variables).await?;
        check_user_errors(&data.customer_create.user_errors)?;
        Ok(data.customer_create.customer)
    }

    /// Set a customer's phone number.
    ///
    /// # Errors
    ///
    /// Returns [`AdminShopifyError::UserError`] if Shopify rejects the phone,
    /// or another error if the API request fails.
    #[instrument(skip(self, phone))]
    pub async fn update_customer_phone(
        &self,
        customer_id: &str,
        phone: &PhoneNumber,
    ) -> Result<(), AdminShopifyError> {
        let variables = json!({
            "input": { "id": customer_id, "phone": phone.as_str() }
        });
        let data: CustomerUpdateData = self.execute(CUSTOMER_UPDATE, variables).await?;
        check_user_errors(&data.customer_update.user_errors)
    }

    /// Set a customer's phone and SMS consent in one update.
    ///
    /// # Errors
    ///
    /// Returns [`AdminShopifyError::UserError`] if Shopify rejects the input,
    /// or another error if the API request fails.
    #[instrument(skip(self, phone))]
    pub async fn update_customer_phone_and_sms(
        &self,
        customer_id: &str,
        phone: &PhoneNumber,
    ) -> Result<(), AdminShopifyError> {
        let variables = json!({
            "input": {
                "id": customer_id,
                "phone": phone.as_str(),
                "smsMarketingConsent": subscribed(None),
            }
        });
        let data: CustomerUpdateData = self.execute(CUSTOMER_UPDATE, variables).await?;
        check_user_errors(&data.customer_update.user_errors)
    }

    /// Subscribe a customer to SMS marketing, recording when consent was given.
    ///
    /// # Errors
    ///
    /// Returns [`AdminShopifyError::UserError`] if Shopify rejects the update,
    /// or another error if the API request fails.
    #[instrument(skip(self))]
    pub async fn subscribe_sms(
        &self,
        customer_id: &str,
        consent_updated_at: DateTime<Utc>,
    ) -> Result<(), AdminShopifyError> {
        let variables = json!({
            "input": {
                "customerId": customer_id,
                "smsMarketingConsent": subscribed(Some(consent_updated_at)),
            }
        });
        let data: SmsConsentData = self.execute(CUSTOMER_SMS_CONSENT_UPDATE, variables).await?;
        check_user_errors(&data.customer_sms_marketing_consent_update.user_errors)
    }
}
