//! Session-related types.
//!
//! One-time OAuth values and the store access grant carry their own expiry
//! so a stale value reads as missing even while the session itself lives on.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tower_sessions::Session;

/// Lifetime of PKCE verifier, state and nonce values.
pub const OAUTH_VALUE_TTL: Duration = Duration::minutes(10);

/// Lifetime of the coming-soon access grant.
pub const STORE_ACCESS_TTL: Duration = Duration::hours(24);

/// Lifetime of the stored refresh token.
pub const REFRESH_TOKEN_TTL: Duration = Duration::days(30);

/// Value written under [`keys::STORE_ACCESS`] once the password matched.
pub const STORE_ACCESS_GRANTED: &str = "granted";

/// Session keys.
pub mod keys {
    /// Key for Shopify customer access token.
    pub const SHOPIFY_CUSTOMER_TOKEN: &str = "shopify_customer_token";

    /// Key for the customer refresh token (30 days).
    pub const SHOPIFY_REFRESH_TOKEN: &str = "shopify_refresh_token";

    /// Key for the PKCE code verifier.
    pub const SHOPIFY_CODE_VERIFIER: &str = "shopify_code_verifier";

    /// Key for Shopify OAuth state (CSRF protection).
    pub const SHOPIFY_AUTH_STATE: &str = "shopify_auth_state";

    /// Key for Shopify OAuth nonce (`OpenID` Connect replay protection).
    pub const SHOPIFY_AUTH_NONCE: &str = "shopify_auth_nonce";

    /// Key for the coming-soon access grant.
    pub const STORE_ACCESS: &str = "store_access";

    /// Key for storing the Shopify cart ID.
    pub const CART_ID: &str = "cart_id";
}

/// A session value with its own expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiring<T> {
    pub value: T,
    pub expires_at: DateTime<Utc>,
}

impl<T> Expiring<T> {
    #[must_use]
    pub fn new(value: T, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            value,
            expires_at: now + ttl,
        }
    }

    /// The value, if it has not expired at `now`.
    #[must_use]
    pub fn valid_at(self, now: DateTime<Utc>) -> Option<T> {
        (now < self.expires_at).then_some(self.value)
    }
}

/// Store `value` under `key`, expiring after `ttl`.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn put_expiring<T: Serialize + Send + Sync>(
    session: &Session,
    key: &str,
    value: T,
    ttl: Duration,
) -> Result<(), tower_sessions::session::Error> {
    session
        .insert(key, Expiring::new(value, ttl, Utc::now()))
        .await
}

/// Read `key` if present and unexpired.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn get_valid<T: DeserializeOwned>(
    session: &Session,
    key: &str,
) -> Result<Option<T>, tower_sessions::session::Error> {
    let entry: Option<Expiring<T>> = session.get(key).await?;
    Ok(entry.and_then(|e| e.valid_at(Utc::now())))
}

/// Remove `key` and return it if it was still valid.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn take_valid<T: DeserializeOwned>(
    session: &Session,
    key: &str,
) -> Result<Option<T>, tower_sessions::session::Error> {
    let entry: Option<Expiring<T>> = session.remove(key).await?;
    Ok(entry.and_then(|e| e.valid_at(Utc::now())))
}
