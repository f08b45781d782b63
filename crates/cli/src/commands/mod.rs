//! Subcommand implementations.

pub mod migrate;
pub mod sign;
pub mod tokens;

/// Missing or unusable environment.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
}

/// The first set, non-empty variable among `keys`.
pub fn first_env(keys: &[&'static str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

/// Connect to the database named by the first set variable in `keys`.
pub async fn connect(keys: &[&'static str]) -> Result<sqlx::PgPool, Box<dyn std::error::Error>> {
    let url = first_env(keys).ok_or(EnvError::Missing(keys.first().copied().unwrap_or("DATABASE_URL")))?;
    tracing::info!("Connecting to {}...", keys.first().copied().unwrap_or("database"));
    Ok(sqlx::PgPool::connect(&url).await?)
}
