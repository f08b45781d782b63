//! Application state shared across handlers.

use std::sync::Arc;

use artfulfam_core::ShopDomain;
use secrecy::SecretString;
use sqlx::PgPool;

use crate::config::BrokerConfig;
use crate::error::{AppError, Result};
use crate::replay::ConsumedTokens;
use crate::shopify::{AdminClient, http_client};
use crate::store::{MemoryTokenStore, PostgresTokenStore, TokenStore};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: BrokerConfig,
    pool: Option<PgPool>,
    tokens: Arc<dyn TokenStore>,
    http: reqwest::Client,
    consumed: Option<ConsumedTokens>,
}

impl AppState {
    /// Build state around `pool`: tokens go to Postgres when a pool is given
    /// and stay in memory otherwise.
    #[must_use]
    pub fn new(config: BrokerConfig, pool: Option<PgPool>) -> Self {
        let tokens: Arc<dyn TokenStore> = match &pool {
            Some(pool) => Arc::new(PostgresTokenStore::new(pool.clone())),
            None => Arc::new(MemoryTokenStore::new()),
        };
        Self::with_token_store(config, pool, tokens)
    }

    /// Build state with an explicit token store.
    #[must_use]
    pub fn with_token_store(
        config: BrokerConfig,
        pool: Option<PgPool>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        let consumed = config
            .signup_token_single_use
            .then(ConsumedTokens::new);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                tokens,
                http: http_client(),
                consumed,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn tokens(&self) -> &dyn TokenStore {
        self.inner.tokens.as_ref()
    }

    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// The replay ledger, absent when signup tokens are reusable.
    #[must_use]
    pub fn consumed_tokens(&self) -> Option<&ConsumedTokens> {
        self.inner.consumed.as_ref()
    }

    /// An Admin client for `shop`.
    ///
    /// The static private token wins over anything connected through OAuth.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotConnected`] when neither exists, or a store
    /// error if the lookup fails.
    pub async fn admin_client(&self, shop: &ShopDomain) -> Result<AdminClient> {
        let access_token: SecretString = match &self.inner.config.private_admin_token {
            Some(token) => token.clone(),
            None => {
                self.tokens()
                    .get(shop)
                    .await?
                    .ok_or(AppError::NotConnected)?
                    .access_token
            }
        };

        Ok(AdminClient::new(
            self.inner.http.clone(),
            self.inner.config.admin_graphql_url(shop),
            access_token,
        ))
    }
}
