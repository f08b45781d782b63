//! In-process token store. Tokens are lost on restart.

use std::collections::HashMap;

use artfulfam_core::ShopDomain;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BrokerToken, StoreError, TokenStore};

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<ShopDomain, BrokerToken>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, shop: &ShopDomain) -> Result<Option<BrokerToken>, StoreError> {
        Ok(self.tokens.read().await.get(shop).cloned())
    }

    async fn set(&self, token: BrokerToken) -> Result<(), StoreError> {
        self.tokens.write().await.insert(token.shop.clone(), token);
        Ok(())
    }

    async fn delete(&self, shop: &ShopDomain) -> Result<bool, StoreError> {
        Ok(self.tokens.write().await.remove(shop).is_some())
    }

    async fn list(&self) -> Result<Vec<ShopDomain>, StoreError> {
        let mut shops: Vec<ShopDomain> = self.tokens.read().await.keys().cloned().collect();
        shops.sort();
        Ok(shops)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use secrecy::{ExposeSecret, SecretString};

    use super::*;

    fn token(shop: &str, access_token: &str) -> BrokerToken {
        BrokerToken {
            shop: ShopDomain::normalize(shop).unwrap(),
            access_token: SecretString::from(access_token),
            scope: Some("read_customers,write_customers".to_string()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_set_overwrites_per_shop() {
        let store = MemoryTokenStore::new();
        store.set(token("artfulfam.myshopify.com", "shpat_one")).await.unwrap();
        store.set(token("artfulfam.myshopify.com", "shpat_two")).await.unwrap();

        let shop = ShopDomain::normalize("https://Artfulfam.myshopify.com/admin").unwrap();
        let stored = store.get(&shop).await.unwrap().unwrap();
        assert_eq!(stored.access_token.expose_secret(), "shpat_two");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_sorted_and_delete() {
        let store = MemoryTokenStore::new();
        store.set(token("zebra.myshopify.com", "a")).await.unwrap();
        store.set(token("artfulfam.myshopify.com", "b")).await.unwrap();

        let shops: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(shops, ["artfulfam.myshopify.com", "zebra.myshopify.com"]);

        let zebra = ShopDomain::normalize("zebra.myshopify.com").unwrap();
        assert!(store.delete(&zebra).await.unwrap());
        assert!(!store.delete(&zebra).await.unwrap());
        assert!(store.get(&zebra).await.unwrap().is_none());
    }

    #[test]
    fn test_debug_redacts_access_token() {
        let debug_output = format!("{:?}", token("artfulfam.myshopify.com", "shpat_secret"));
        assert!(!debug_output.contains("shpat_secret"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
