//! Database migration commands.
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` (or `DATABASE_URL`) - storefront sessions
//! - `BROKER_DATABASE_URL` - broker tokens and sessions
//!
//! Both servers also migrate on startup; these commands exist so a deploy can
//! migrate before traffic moves.

use tower_sessions_sqlx_store::PostgresStore;

use super::connect;

/// Create the storefront session table.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn storefront() -> Result<(), Box<dyn std::error::Error>> {
    let pool = connect(&["STOREFRONT_DATABASE_URL", "DATABASE_URL"]).await?;

    tracing::info!("Running storefront session migrations...");
    PostgresStore::new(pool).migrate().await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}

/// Create the broker token table and its session table.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn broker() -> Result<(), Box<dyn std::error::Error>> {
    let pool = connect(&["BROKER_DATABASE_URL"]).await?;

    tracing::info!("Running broker token migrations...");
    artfulfam_broker::store::MIGRATOR.run(&pool).await?;

    tracing::info!("Running broker session migrations...");
    PostgresStore::new(pool).migrate().await?;

    tracing::info!("Broker migrations complete!");
    Ok(())
}
