//! Shopify Customer Account API client.
//!
//! The Customer Account API provides access to customer authentication and
//! the logged-in customer's profile. Uses OAuth 2.0 with PKCE.
//!
//! # OAuth Flow
//!
//! 1. Generate authorization URL with `authorization_url()`
//! 2. Redirect customer to Shopify's login page
//! 3. Shopify redirects back with authorization code
//! 4. Exchange code and PKCE verifier for tokens with `exchange_code()`
//! 5. Use access token for customer-scoped API calls, `refresh()` when it expires

mod types;

pub use types::*;

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::config::CustomerAccountConfig;
use crate::shopify::{GraphQLRequest, GraphQLResponse, ShopifyError, http_client, truncate_body};

/// Scopes requested from the Customer Account API.
pub const CUSTOMER_SCOPES: &str = "openid email customer-account-api:full";

const CUSTOMER_QUERY: &str = r"
    query getCustomer {
        customer {
            id
            firstName
            lastName
            emailAddress { emailAddress }
            phoneNumber { phoneNumber }
            defaultAddress {
                address1
                address2
                city
                province
                country
                zip
            }
        }
    }
";

// ─────────────────────────────────────────────────────────────────────────────
// Customer Account Client
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the Shopify Customer Account API.
#[derive(Clone)]
pub struct CustomerClient {
    inner: Arc<CustomerClientInner>,
}

struct CustomerClientInner {
    client: reqwest::Client,
    client_id: String,
    client_secret: Option<SecretString>,
    redirect_uri: String,
    authorize_endpoint: String,
    token_endpoint: String,
    logout_endpoint: String,
    graphql_endpoint: String,
}

impl CustomerClient {
    /// Create a new Customer Account API client.
    #[must_use]
    pub fn new(config: &CustomerAccountConfig, api_version: &str, redirect_uri: String) -> Self {
        Self {
            inner: Arc::new(CustomerClientInner {
                client: http_client(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                redirect_uri,
                authorize_endpoint: config.authorize_endpoint(),
                token_endpoint: config.token_endpoint(),
                logout_endpoint: config.logout_endpoint(),
                graphql_endpoint: config.graphql_endpoint(api_version),
            }),
        }
    }

    /// Get the OAuth client ID (safe to expose in frontend).
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// The callback URL registered with Shopify.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.inner.redirect_uri
    }

    /// The bare authorization endpoint, for diagnostics.
    #[must_use]
    pub fn authorize_endpoint(&self) -> &str {
        &self.inner.authorize_endpoint
    }

    // ─────────────────────────────────────────────────────────────────────────
    // OAuth Flow
    // ─────────────────────────────────────────────────────────────────────────

    /// Generate the authorization URL for customer login.
    ///
    /// # Arguments
    ///
    /// * `state` - A random string stored in the session to prevent CSRF attacks
    /// * `nonce` - A random string for `OpenID` Connect replay protection
    /// * `code_challenge` - S256 challenge of the stored PKCE verifier
    #[must_use]
    pub fn authorization_url(&self, state: &str, nonce: &str, code_challenge: &str) -> String {
        format!(
            "{}?\
            client_id={}&\
            response_type=code&\
            redirect_uri={}&\
            scope={}&\
            state={}&\
            nonce={}&\
            code_challenge={}&\
            code_challenge_method=S256",
            self.inner.authorize_endpoint,
            urlencoding::encode(&self.inner.client_id),
            urlencoding::encode(&self.inner.redirect_uri),
            urlencoding::encode(CUSTOMER_SCOPES),
            urlencoding::encode(state),
            urlencoding::encode(nonce),
            urlencoding::encode(code_challenge),
        )
    }

    /// Generate the end-session URL.
    #[must_use]
    pub fn logout_url(&self, id_token: &str, post_logout_redirect_uri: &str) -> String {
        format!(
            "{}?id_token_hint={}&post_logout_redirect_uri={}",
            self.inner.logout_endpoint,
            urlencoding::encode(id_token),
            urlencoding::encode(post_logout_redirect_uri)
        )
    }

    /// Exchange an authorization code and PKCE verifier for tokens.
    ///
    /// `client_id` always travels in the form body; the client secret, when
    /// configured, is sent as HTTP Basic auth.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::OAuth`] on a non-2xx response or a response
    /// without an `access_token`.
    #[instrument(skip_all)]
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<CustomerAccessToken, ShopifyError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.inner.client_id.as_str()),
            ("redirect_uri", self.inner.redirect_uri.as_str()),
            ("code", code),
            ("code_verifier", code_verifier),
        ];

        self.token_request(&params, "Token exchange").await
    }

    /// Refresh an access token.
    ///
    /// Public clients send `client_id` in the body; confidential clients use
    /// Basic auth instead.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::OAuth`] if the refresh is rejected.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<CustomerAccessToken, ShopifyError> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        if self.inner.client_secret.is_none() {
            params.push(("client_id", self.inner.client_id.as_str()));
        }

        let mut token = self.token_request(&params, "Token refresh").await?;
        // Shopify may omit the refresh token on refresh; keep using the old one.
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> Result<CustomerAccessToken, ShopifyError> {
        let mut request = self.inner.client.post(&self.inner.token_endpoint).form(params);
        if let Some(secret) = &self.inner.client_secret {
            request = request.basic_auth(&self.inner.client_id, Some(secret.expose_secret()));
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = %status,
                body = %truncate_body(&text, 200),
                "{what} failed"
            );
            return Err(ShopifyError::OAuth(format!("{what} failed ({status})")));
        }

        let token_response: TokenResponse = response.json().await?;
        let access_token = token_response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ShopifyError::OAuth(format!("{what} returned no access_token")))?;

        Ok(CustomerAccessToken {
            access_token,
            id_token: token_response.id_token,
            refresh_token: token_response.refresh_token,
            expires_in: token_response.expires_in,
            obtained_at: chrono::Utc::now().timestamp(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // GraphQL Execution
    // ─────────────────────────────────────────────────────────────────────────

    /// Execute a GraphQL query against the Customer Account API.
    async fn query<T: DeserializeOwned>(
        &self,
        access_token: &str,
        query: &str,
    ) -> Result<T, ShopifyError> {
        let response = self
            .inner
            .client
            .post(&self.inner.graphql_endpoint)
            .bearer_auth(access_token)
            .json(&GraphQLRequest::new(query, None))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ShopifyError::Unauthorized);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = %status,
                body = %truncate_body(&text, 200),
                "Customer API request failed"
            );
            return Err(ShopifyError::OAuth(format!(
                "Customer API request failed ({status})"
            )));
        }

        let gql_response: GraphQLResponse<T> = response.json().await?;
        gql_response.into_result()
    }

    /// Get the current customer's profile.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::Unauthorized`] when the token is rejected and
    /// [`ShopifyError::NotFound`] when the API returns no customer.
    #[instrument(skip_all)]
    pub async fn get_customer(&self, access_token: &str) -> Result<Customer, ShopifyError> {
        #[derive(Deserialize)]
        struct Response {
            customer: Option<RawCustomer>,
        }

        let response: Response = self.query(access_token, CUSTOMER_QUERY).await?;
        response
            .customer
            .map(Customer::from)
            .ok_or_else(|| ShopifyError::NotFound("Customer not found".to_string()))
    }
}
