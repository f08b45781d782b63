//! Customer Account token extractor and session helpers.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::models::session::{REFRESH_TOKEN_TTL, get_valid, put_expiring};
use crate::models::session_keys;
use crate::shopify::CustomerAccessToken;

/// Extractor that optionally gets the Shopify customer token.
///
/// Never rejects. A request without a session layer, a missing token or an
/// unreadable session all yield `None`.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(
///     OptionalShopifyCustomer(token): OptionalShopifyCustomer,
/// ) -> impl IntoResponse {
///     match token {
///         Some(t) => format!("Customer authenticated!"),
///         None => "Guest visitor".to_string(),
///     }
/// }
/// ```
pub struct OptionalShopifyCustomer(pub Option<CustomerAccessToken>);

impl<S> FromRequestParts<S> for OptionalShopifyCustomer
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = match parts.extensions.get::<Session>() {
            Some(session) => session
                .get::<CustomerAccessToken>(session_keys::SHOPIFY_CUSTOMER_TOKEN)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        Ok(Self(token))
    }
}

/// Store the customer token, and its refresh token for 30 days.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_shopify_customer_token(
    session: &Session,
    token: &CustomerAccessToken,
) -> Result<(), tower_sessions::session::Error> {
    session
        .insert(session_keys::SHOPIFY_CUSTOMER_TOKEN, token)
        .await?;
    if let Some(refresh_token) = &token.refresh_token {
        put_expiring(
            session,
            session_keys::SHOPIFY_REFRESH_TOKEN,
            refresh_token,
            REFRESH_TOKEN_TTL,
        )
        .await?;
    }
    Ok(())
}

/// The stored refresh token, if it has not expired.
///
/// Falls back to the one embedded in the access token record.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn shopify_refresh_token(
    session: &Session,
    token: Option<&CustomerAccessToken>,
) -> Result<Option<String>, tower_sessions::session::Error> {
    let stored: Option<String> = get_valid(session, session_keys::SHOPIFY_REFRESH_TOKEN).await?;
    Ok(stored.or_else(|| token.and_then(|t| t.refresh_token.clone())))
}

/// Remove every customer token value from the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_shopify_customer_token(
    session: &Session,
) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<serde_json::Value>(session_keys::SHOPIFY_CUSTOMER_TOKEN)
        .await?;
    session
        .remove::<serde_json::Value>(session_keys::SHOPIFY_REFRESH_TOKEN)
        .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use tower_sessions::MemoryStore;

    use super::*;

    fn token(refresh: Option<&str>) -> CustomerAccessToken {
        CustomerAccessToken {
            access_token: "shcat_access".to_string(),
            id_token: Some("id-token".to_string()),
            refresh_token: refresh.map(str::to_string),
            expires_in: Some(3600),
            obtained_at: Utc::now().timestamp(),
        }
    }

    #[tokio::test]
    async fn test_set_and_clear_token() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        set_shopify_customer_token(&session, &token(Some("shcrt_refresh")))
            .await
            .unwrap();

        let stored: Option<CustomerAccessToken> = session
            .get(session_keys::SHOPIFY_CUSTOMER_TOKEN)
            .await
            .unwrap();
        assert_eq!(stored.unwrap().access_token, "shcat_access");
        assert_eq!(
            shopify_refresh_token(&session, None).await.unwrap().as_deref(),
            Some("shcrt_refresh")
        );

        clear_shopify_customer_token(&session).await.unwrap();
        let stored: Option<CustomerAccessToken> = session
            .get(session_keys::SHOPIFY_CUSTOMER_TOKEN)
            .await
            .unwrap();
        assert!(stored.is_none());
        assert!(shopify_refresh_token(&session, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_token_falls_back_to_token_record() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        let token = token(Some("embedded"));
        assert_eq!(
            shopify_refresh_token(&session, Some(&token))
                .await
                .unwrap()
                .as_deref(),
            Some("embedded")
        );
    }
}
