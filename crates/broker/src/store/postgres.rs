//! `PostgreSQL` token store.
//!
//! Queries are checked at runtime so the crate builds without a database.

use artfulfam_core::ShopDomain;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;

use super::{BrokerToken, StoreError, TokenStore};

/// Internal row type for `PostgreSQL` queries.
#[derive(Debug, sqlx::FromRow)]
struct TokenRow {
    shop: String,
    access_token: String,
    scope: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TokenRow> for BrokerToken {
    type Error = StoreError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        let shop = ShopDomain::normalize(&row.shop)
            .map_err(|e| StoreError::Corrupt(format!("shop '{}': {e}", row.shop)))?;
        Ok(Self {
            shop,
            access_token: SecretString::from(row.access_token),
            scope: row.scope,
            created_at: row.created_at,
        })
    }
}

/// Token store backed by the `broker_tokens` table.
#[derive(Debug, Clone)]
pub struct PostgresTokenStore {
    pool: PgPool,
}

impl PostgresTokenStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PostgresTokenStore {
    async fn get(&self, shop: &ShopDomain) -> Result<Option<BrokerToken>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r"
            SELECT shop, access_token, scope, created_at
            FROM broker_tokens
            WHERE shop = $1
            ",
        )
        .bind(shop.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(BrokerToken::try_from).transpose()
    }

    async fn set(&self, token: BrokerToken) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO broker_tokens (shop, access_token, scope, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (shop) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                scope = EXCLUDED.scope,
                created_at = EXCLUDED.created_at,
                updated_at = NOW()
            ",
        )
        .bind(token.shop.as_str())
        .bind(token.access_token.expose_secret())
        .bind(token.scope.as_deref())
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, shop: &ShopDomain) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM broker_tokens WHERE shop = $1")
            .bind(shop.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<ShopDomain>, StoreError> {
        let shops: Vec<String> =
            sqlx::query_scalar("SELECT shop FROM broker_tokens ORDER BY shop")
                .fetch_all(&self.pool)
                .await?;

        shops
            .iter()
            .map(|shop| {
                ShopDomain::normalize(shop)
                    .map_err(|e| StoreError::Corrupt(format!("shop '{shop}': {e}")))
            })
            .collect()
    }
}
