//! Admin token storage.
//!
//! Offline Admin API tokens are keyed by normalized shop domain. A shop has
//! at most one token; re-authenticating overwrites it and only an explicit
//! delete removes it.

mod memory;
mod postgres;

use artfulfam_core::ShopDomain;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use thiserror::Error;

pub use memory::MemoryTokenStore;
pub use postgres::PostgresTokenStore;

/// Embedded migrations for the token table.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Errors from a [`TokenStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be turned back into a token.
    #[error("Corrupt token row: {0}")]
    Corrupt(String),
}

/// An Admin API token connected through OAuth.
#[derive(Clone)]
pub struct BrokerToken {
    pub shop: ShopDomain,
    pub access_token: SecretString,
    pub scope: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for BrokerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerToken")
            .field("shop", &self.shop)
            .field("access_token", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Persistence for connected shops.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// The token for `shop`, if connected.
    async fn get(&self, shop: &ShopDomain) -> Result<Option<BrokerToken>, StoreError>;

    /// Insert or replace the token for `token.shop`.
    async fn set(&self, token: BrokerToken) -> Result<(), StoreError>;

    /// Remove the token for `shop`. Returns whether one existed.
    async fn delete(&self, shop: &ShopDomain) -> Result<bool, StoreError>;

    /// Connected shops, sorted.
    async fn list(&self) -> Result<Vec<ShopDomain>, StoreError>;
}
