//! Broker session cookie and the one-time OAuth values kept in it.
//!
//! The Admin OAuth flow stores its `state` and target shop in the session
//! between `/admin/broker/start` and the callback. Each value carries its own
//! expiry so a stale one reads as missing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tower_sessions::{Expiry, Session, SessionManagerLayer, SessionStore};

use crate::config::BrokerConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "artfulfam_broker_session";

/// Lifetime of the OAuth state and shop values.
pub const OAUTH_VALUE_TTL: Duration = Duration::minutes(10);

/// Session keys.
pub mod keys {
    /// CSRF state sent to Shopify.
    pub const ADMIN_BROKER_STATE: &str = "admin_broker_state";

    /// Shop the flow was started for.
    pub const ADMIN_BROKER_SHOP: &str = "admin_broker_shop";
}

/// Create the session layer for `store`.
///
/// The session only needs to outlive one OAuth round trip.
#[must_use]
pub fn create_session_layer<S: SessionStore + Clone>(
    store: S,
    config: &BrokerConfig,
) -> SessionManagerLayer<S> {
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::minutes(30),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

#[derive(Debug, Serialize, Deserialize)]
struct Expiring<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

/// Store `value` under `key` for `ttl`.
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
        .insert(
            key,
            Expiring {
                value,
                expires_at: Utc::now() + ttl,
            },
        )
        .await
}

/// Remove `key` and return it if it had not expired.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn take_valid<T: DeserializeOwned>(
    session: &Session,
    key: &str,
) -> Result<Option<T>, tower_sessions::session::Error> {
    let entry: Option<Expiring<T>> = session.remove(key).await?;
    Ok(entry
        .filter(|e| Utc::now() < e.expires_at)
        .map(|e| e.value))
}
