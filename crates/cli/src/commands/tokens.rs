//! Stored Admin token maintenance.
//!
//! Reads `BROKER_DATABASE_URL`. Access tokens are never printed.

use artfulfam_broker::store::{PostgresTokenStore, TokenStore};
use artfulfam_core::ShopDomain;

use super::connect;

async fn store() -> Result<PostgresTokenStore, Box<dyn std::error::Error>> {
    Ok(PostgresTokenStore::new(connect(&["BROKER_DATABASE_URL"]).await?))
}

/// Print every connected shop, one per line.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let shops = store().await?.list().await?;
    if shops.is_empty() {
        tracing::info!("No shops connected");
    }

    #[allow(clippy::print_stdout)]
    for shop in shops {
        println!("{shop}");
    }
    Ok(())
}

/// Remove the token for `shop`.
///
/// # Errors
///
/// Returns an error if the shop is empty or the database is unreachable.
pub async fn delete(shop: &str) -> Result<(), Box<dyn std::error::Error>> {
    let shop = ShopDomain::normalize(shop)?;
    if store().await?.delete(&shop).await? {
        tracing::info!("Removed Admin token for {shop}");
    } else {
        tracing::warn!("No Admin token stored for {shop}");
    }
    Ok(())
}
