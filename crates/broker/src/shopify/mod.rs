//! Shopify Admin API access (HIGH PRIVILEGE).
//!
//! # Security
//!
//! **This module handles Admin API tokens.** It only runs inside the broker,
//! and the only operations it exposes are customer lookup, creation, phone
//! updates and SMS consent.
//!
//! # Architecture
//!
//! - Hand-written GraphQL documents sent as `{query, variables}` JSON
//! - One [`AdminClient`] per request, bound to a shop and token
//! - The OAuth authorization-code exchange lives in [`oauth`]

mod admin;
pub mod oauth;
mod queries;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use admin::{AdminClient, CustomerRef};

/// Errors that can occur when interacting with the Shopify Admin API.
#[derive(Debug, Error)]
pub enum AdminShopifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// GraphQL query returned errors, or the endpoint answered non-2xx.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by Shopify.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication/authorization failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User error from mutation (e.g., invalid input). Holds the first
    /// message Shopify returned.
    #[error("{0}")]
    UserError(String),

    /// Authorization-code exchange failed.
    #[error("OAuth error: {0}")]
    OAuth(String),
}

/// A GraphQL error returned by the Shopify Admin API.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLError {
    /// Error message.
    #[serde(default)]
    pub message: String,
}

impl GraphQLError {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.clone())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A mutation `userErrors` entry.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UserError {
    #[serde(default)]
    pub field: Option<Vec<String>>,
    pub message: String,
}

/// Turn a non-empty `userErrors` list into [`AdminShopifyError::UserError`].
pub(crate) fn check_user_errors(errors: &[UserError]) -> Result<(), AdminShopifyError> {
    match errors.first() {
        None => Ok(()),
        Some(first) => {
            tracing::debug!(
                field = ?first.field,
                message = %first.message,
                count = errors.len(),
                "Shopify mutation returned user errors"
            );
            Err(AdminShopifyError::UserError(first.message.clone()))
        }
    }
}

// =============================================================================
// GraphQL wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLError>>,
}

impl<T> GraphQLResponse<T> {
    fn into_result(self) -> Result<T, AdminShopifyError> {
        if let Some(errors) = self.errors
            && !errors.is_empty()
        {
            return Err(AdminShopifyError::GraphQL(errors));
        }

        self.data.ok_or_else(|| {
            AdminShopifyError::GraphQL(vec![GraphQLError::message("Admin API returned no data")])
        })
    }
}

/// First `n` characters of an upstream body, for logs.
fn truncate_body(body: &str, n: usize) -> String {
    body.chars().take(n).collect()
}

/// Shared outbound HTTP client with explicit timeouts.
#[must_use]
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}
