//! Shopify Storefront and Customer Account API clients.
//!
//! # Architecture
//!
//! - Hand-written GraphQL documents sent as `{query, variables}` JSON
//! - Shopify is source of truth - NO local sync, direct API calls
//! - In-memory caching via `moka` for product and collection lookups (5 minute TTL)
//!
//! # APIs
//!
//! ## Storefront API
//! - Products, collections, cart operations
//! - `X-Shopify-Storefront-Access-Token` header
//!
//! ## Customer Account API
//! - OAuth 2.0 + PKCE authentication flow
//! - Customer profile for the logged-in customer

pub mod customer;
pub mod storefront;
pub mod types;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use customer::{Customer, CustomerAccessToken, CustomerClient};
pub use storefront::{CartApi, StorefrontClient};
pub use types::*;

/// Errors that can occur when interacting with Shopify APIs.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// GraphQL query returned errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by Shopify.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// User error from mutation (e.g., invalid input).
    #[error("User error: {0}")]
    UserError(String),

    /// OAuth token exchange or refresh failed.
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// The access token was rejected (HTTP 401).
    #[error("Unauthorized")]
    Unauthorized,
}

/// A GraphQL error returned by the Shopify API.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLError {
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Source locations in the query.
    #[serde(default)]
    pub locations: Vec<GraphQLErrorLocation>,
    /// Path to the error in the response.
    #[serde(default)]
    pub path: Vec<serde_json::Value>,
}

impl GraphQLError {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
        }
    }
}

/// Location in a GraphQL query where an error occurred.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLErrorLocation {
    /// Line number (1-indexed).
    pub line: i64,
    /// Column number (1-indexed).
    pub column: i64,
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    if errors.is_empty() {
        return "(no error details provided)".to_string();
    }

    errors
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let mut parts = Vec::new();

            if !e.message.is_empty() {
                parts.push(e.message.clone());
            }

            if !e.path.is_empty() {
                let path_str = e
                    .path
                    .iter()
                    .map(|p| match p {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(".");
                parts.push(format!("path: {path_str}"));
            }

            if let Some(loc) = e.locations.first() {
                parts.push(format!("at line {}:{}", loc.line, loc.column));
            }

            if parts.is_empty() {
                format!("[error {}]: (no details)", i + 1)
            } else {
                parts.join(" ")
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// GraphQL wire types
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct GraphQLRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<serde_json::Value>,
}

impl<'a> GraphQLRequest<'a> {
    pub(crate) const fn new(query: &'a str, variables: Option<serde_json::Value>) -> Self {
        Self { query, variables }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLError>>,
}

impl<T> GraphQLResponse<T> {
    pub(crate) fn into_result(self) -> Result<T, ShopifyError> {
        if let Some(errors) = self.errors
            && !errors.is_empty()
        {
            tracing::debug!(errors = ?errors, "GraphQL errors in response");
            return Err(ShopifyError::GraphQL(errors));
        }

        self.data
            .ok_or_else(|| ShopifyError::GraphQL(vec![GraphQLError::message("No data in response")]))
    }
}

/// First `n` characters of an upstream body, for logs.
pub(crate) fn truncate_body(body: &str, n: usize) -> String {
    body.chars().take(n).collect()
}

/// Shared outbound HTTP client with explicit timeouts.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_round_trips_through_module_root() {
        let token = CustomerAccessToken {
            access_token: "at".to_string(),
            id_token: Some("idt".to_string()),
            refresh_token: None,
            expires_in: Some(3600),
            obtained_at: 1_000,
        };
        let stored = serde_json::to_value(&token).unwrap();
        assert_eq!(stored["accessToken"], "at");
        assert_eq!(stored["obtainedAt"], 1_000);

        let restored: CustomerAccessToken = serde_json::from_value(stored).unwrap();
        assert!(!restored.is_expired_at(1_000));
        assert!(restored.is_expired_at(1_000 + 3600 - 60));

        let customer: Customer = serde_json::from_value(serde_json::json!({
            "id": "gid://shopify/Customer/1",
            "email": "parent@example.com"
        }))
        .unwrap();
        assert_eq!(customer.email.as_deref(), Some("parent@example.com"));
    }

    #[test]
    fn test_shopify_error_display() {
        let err = ShopifyError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");
    }

    #[test]
    fn test_graphql_error_formatting() {
        let err = ShopifyError::GraphQL(vec![
            GraphQLError::message("Field not found"),
            GraphQLError::message("Invalid ID"),
        ]);
        assert_eq!(
            err.to_string(),
            "GraphQL errors: Field not found; Invalid ID"
        );
    }

    #[test]
    fn test_graphql_error_with_path_and_location() {
        let errors = vec![GraphQLError {
            message: String::new(),
            locations: vec![GraphQLErrorLocation { line: 5, column: 10 }],
            path: vec![
                serde_json::Value::String("cart".to_string()),
                serde_json::Value::Number(0.into()),
            ],
        }];
        let err = ShopifyError::GraphQL(errors);
        assert_eq!(err.to_string(), "GraphQL errors: path: cart.0 at line 5:10");
    }

    #[test]
    fn test_graphql_error_empty() {
        assert_eq!(
            ShopifyError::GraphQL(vec![]).to_string(),
            "GraphQL errors: (no error details provided)"
        );
        assert_eq!(
            ShopifyError::GraphQL(vec![GraphQLError::message("")]).to_string(),
            "GraphQL errors: [error 1]: (no details)"
        );
    }

    #[test]
    fn test_response_into_result() {
        let ok: GraphQLResponse<serde_json::Value> =
            serde_json::from_str(r#"{"data":{"cart":null}}"#).unwrap();
        assert!(ok.into_result().is_ok());

        let failed: GraphQLResponse<serde_json::Value> = serde_json::from_str(
            r#"{"errors":[{"message":"Throttled","locations":[{"line":1,"column":2}]}]}"#,
        )
        .unwrap();
        let err = failed.into_result().unwrap_err();
        assert_eq!(err.to_string(), "GraphQL errors: Throttled at line 1:2");

        let empty: GraphQLResponse<serde_json::Value> = serde_json::from_str("{}").unwrap();
        assert!(matches!(empty.into_result(), Err(ShopifyError::GraphQL(_))));
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("abcdef", 3), "abc");
        assert_eq!(truncate_body("ab", 10), "ab");
    }
}
